// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Event Bridge: single-slot, back-pressured hand-off of one received
//! [`Packet`] from the SPI thread to the event loop.
//!
//! Three primitives, split across the two ends: a notification pipe, a
//! `Packet` slot, and a binary semaphore. See §4.5 of the design notes for
//! the protocol; the short version is producer writes the slot, signals the
//! pipe, then blocks on the semaphore until the consumer has drained the
//! slot and released it.

use std::io;
use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex};

use brickd_semaphore::Semaphore;
use drv_spi_frame::Packet;

struct Shared {
    slot: Mutex<Option<Packet>>,
    semaphore: Semaphore,
}

/// The SPI-thread side of the bridge: hands a decoded packet to the event
/// loop and blocks until it has been consumed.
pub struct BridgeProducer {
    write_fd: OwnedFd,
    shared: Arc<Shared>,
}

/// The event-loop side of the bridge: owns the pipe's read end, which the
/// caller registers as a readable event source.
pub struct BridgeConsumer {
    read_fd: OwnedFd,
    shared: Arc<Shared>,
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Creates a connected producer/consumer pair backed by a fresh pipe.
pub fn event_bridge() -> io::Result<(BridgeProducer, BridgeConsumer)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    // SAFETY: `fds` is a valid pointer to two ints, as `pipe(2)` requires.
    check(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    // SAFETY: both descriptors were just returned by a successful `pipe(2)`
    // and are owned exclusively by the values constructed here.
    let (read_fd, write_fd) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        semaphore: Semaphore::new(),
    });
    Ok((
        BridgeProducer {
            write_fd,
            shared: shared.clone(),
        },
        BridgeConsumer { read_fd, shared },
    ))
}

impl BridgeProducer {
    /// Writes `packet` into the slot, signals the pipe, then blocks until
    /// the event loop has consumed it and released the semaphore.
    ///
    /// The pipe write is on a one-byte-deep pipe that is never written to
    /// again before the matching read, so it never blocks here.
    pub fn hand_off(&self, packet: Packet) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        *self.shared.slot.lock().unwrap() = Some(packet);
        let byte = [1u8];
        // SAFETY: `write_fd` is a valid, open file descriptor for the
        // lifetime of this call; `byte` is one readable byte.
        let written =
            unsafe { libc::write(self.write_fd.as_raw_fd(), byte.as_ptr() as *const _, 1) };
        check(written as libc::c_int)?;
        self.shared.semaphore.acquire();
        Ok(())
    }
}

impl BridgeConsumer {
    /// The pipe's read end, for registration with the event loop's source
    /// set (`event_add_source` in the interface consumed from §6).
    pub fn read_fd(&self) -> RawFd {
        use std::os::unix::io::AsRawFd;
        self.read_fd.as_raw_fd()
    }

    /// Called when `read_fd` is readable: drains the notification byte,
    /// hands the slot's packet to `deliver`, then releases the producer.
    ///
    /// `deliver` is expected to return quickly (it forwards to the router's
    /// `network_dispatch_response`), matching the inbound routing contract.
    pub fn consume<F: FnOnce(Packet)>(&self, deliver: F) -> io::Result<()> {
        let mut byte = [0u8; 1];
        // SAFETY: `read_fd` is valid and `byte` has room for one byte.
        let read = unsafe {
            libc::read(self.read_fd(), byte.as_mut_ptr() as *mut _, 1)
        };
        check(read as libc::c_int)?;

        let packet = self
            .shared
            .slot
            .lock()
            .unwrap()
            .take()
            .expect("pipe readable implies the slot was populated first");
        deliver(packet);
        self.shared.semaphore.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_spi_frame::Packet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn hand_off_blocks_until_consumer_releases() {
        let (producer, consumer) = event_bridge().unwrap();
        let delivered = Arc::new(AtomicBool::new(false));
        let delivered2 = delivered.clone();

        let handle = thread::spawn(move || {
            let packet = Packet::new(1, 0, 0, false, 0, &[9, 8, 7]).unwrap();
            producer.hand_off(packet).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        consumer
            .consume(|packet| {
                assert_eq!(packet.payload(), &[9, 8, 7]);
                delivered2.store(true, Ordering::SeqCst);
            })
            .unwrap();

        handle.join().unwrap();
        assert!(delivered.load(Ordering::SeqCst));
    }
}
