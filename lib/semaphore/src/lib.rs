// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A binary semaphore, i.e. a semaphore with at most one outstanding permit.
//!
//! This is the back-pressure primitive behind the SPI engine's single-slot
//! hand-off to the event loop (see `drv-spi-engine::bridge`): the producer
//! blocks in [`Semaphore::acquire`] until the consumer calls
//! [`Semaphore::release`], giving the producer a hard guarantee that nothing
//! it handed off has been silently dropped or overwritten.

use std::sync::{Condvar, Mutex};

/// A semaphore that only ever holds zero or one permits.
///
/// Unlike a counting semaphore, releasing twice without an intervening
/// acquire does not accumulate permits; the second release is a no-op. This
/// matches the one-packet-in-flight invariant of the event bridge: the
/// producer never hands off a second packet before the first is acquired.
pub struct Semaphore {
    permit: Mutex<bool>,
    condvar: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with no permit available.
    pub fn new() -> Self {
        Semaphore {
            permit: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Blocks the calling thread until a permit is available, then consumes
    /// it.
    pub fn acquire(&self) {
        let mut permit = self.permit.lock().unwrap();
        while !*permit {
            permit = self.condvar.wait(permit).unwrap();
        }
        *permit = false;
    }

    /// Makes a permit available and wakes one waiter, if any.
    ///
    /// If a permit is already available this is a no-op: the semaphore never
    /// holds more than one.
    pub fn release(&self) {
        let mut permit = self.permit.lock().unwrap();
        if !*permit {
            *permit = true;
            self.condvar.notify_one();
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Semaphore;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new());
        let sem2 = sem.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sem2.release();
        });

        // Would hang forever if acquire() didn't block correctly.
        sem.acquire();
        handle.join().unwrap();
    }

    #[test]
    fn double_release_does_not_accumulate_permits() {
        let sem = Semaphore::new();
        sem.release();
        sem.release();
        sem.acquire();

        // A second acquire must block: only one permit should have existed.
        let sem = Arc::new(sem);
        let sem2 = sem.clone();
        let acquired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let acquired2 = acquired.clone();
        let handle = thread::spawn(move || {
            sem2.acquire();
            acquired2.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(std::sync::atomic::Ordering::SeqCst));

        sem.release();
        handle.join().unwrap();
        assert!(acquired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
