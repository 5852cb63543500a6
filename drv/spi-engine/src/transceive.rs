// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The duplex SPI transaction abstraction, and the spidev ioctl backend.
//!
//! One call to [`Transceiver::transceive`] is one 84-byte `SPI_IOC_MESSAGE(1)`
//! transfer: whatever is in `tx` goes out on MOSI while whatever comes back
//! on MISO lands in `rx`, simultaneously. The engine never issues more than
//! one in-flight transfer at a time, so there is no segment list here, just
//! a single fixed-size duplex exchange.

use std::fs::{File, OpenOptions};
use std::io;
use std::mem::size_of;
use std::os::unix::io::AsRawFd;

use drv_spi_frame::{SpiFrame, FRAME_SIZE};

use crate::config::SpiEngineConfig;
use crate::error::EngineError;

/// Anything that can perform one duplex SPI transaction.
///
/// Implemented by [`SpidevTransceiver`] for the real device and by a fake in
/// `#[cfg(test)]` modules elsewhere in this crate for the engine's own tests.
pub trait Transceiver: Send {
    fn transceive(&mut self, tx: &SpiFrame, rx: &mut SpiFrame) -> io::Result<()>;
}

// Mirrors <linux/spi/spidev.h>. Kept local rather than pulled from a crate:
// the ioctl encoding is small, fixed, and part of the wire contract this
// crate already owns.
const SPI_IOC_MAGIC: u8 = b'k';
const SPI_IOC_NR_MODE: u8 = 1;
const SPI_IOC_NR_BITS_PER_WORD: u8 = 3;
const SPI_IOC_NR_MAX_SPEED_HZ: u8 = 4;

const SPI_MODE_CPOL: u8 = 0x02;

#[repr(C)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    pad: u16,
}

fn ioc_write<T>(nr: u8) -> libc::c_ulong {
    const TYPESHIFT: u32 = 8;
    const SIZESHIFT: u32 = 16;
    const DIRSHIFT: u32 = 30;
    const DIR_WRITE: libc::c_ulong = 1 << DIRSHIFT;

    DIR_WRITE
        | ((SPI_IOC_MAGIC as libc::c_ulong) << TYPESHIFT)
        | ((nr as libc::c_ulong) << 0)
        | ((size_of::<T>() as libc::c_ulong) << SIZESHIFT)
}

fn checked_ioctl(fd: i32, request: libc::c_ulong, arg: *const libc::c_void) -> io::Result<()> {
    // SAFETY: `request` is one of the fixed spidev ioctl codes computed above
    // and `arg` always points at an object of the size that code encodes.
    let ret = unsafe { libc::ioctl(fd, request, arg) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Owns the spidev file descriptor and issues the fixed-size duplex
/// transaction against it.
pub struct SpidevTransceiver {
    file: File,
}

impl SpidevTransceiver {
    /// Opens `config.device_path` and applies CPOL mode, MSB-first, 8
    /// bits/word, and the configured clock, per §6.
    pub fn open(config: &SpiEngineConfig) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device_path)
            .map_err(|source| EngineError::OpenDevice {
                path: config.device_path.clone(),
                source,
            })?;
        let fd = file.as_raw_fd();

        let to_configure_err = |source: io::Error| EngineError::Configure {
            path: config.device_path.clone(),
            source,
        };

        let mode = SPI_MODE_CPOL;
        checked_ioctl(
            fd,
            ioc_write::<u8>(SPI_IOC_NR_MODE),
            &mode as *const u8 as *const libc::c_void,
        )
        .map_err(to_configure_err)?;

        let bits_per_word: u8 = 8;
        checked_ioctl(
            fd,
            ioc_write::<u8>(SPI_IOC_NR_BITS_PER_WORD),
            &bits_per_word as *const u8 as *const libc::c_void,
        )
        .map_err(to_configure_err)?;

        checked_ioctl(
            fd,
            ioc_write::<u32>(SPI_IOC_NR_MAX_SPEED_HZ),
            &config.clock_hz as *const u32 as *const libc::c_void,
        )
        .map_err(to_configure_err)?;

        Ok(SpidevTransceiver { file })
    }
}

impl Transceiver for SpidevTransceiver {
    fn transceive(&mut self, tx: &SpiFrame, rx: &mut SpiFrame) -> io::Result<()> {
        let transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: FRAME_SIZE as u32,
            speed_hz: 0,
            delay_usecs: 0,
            bits_per_word: 0,
            cs_change: 0,
            tx_nbits: 0,
            rx_nbits: 0,
            pad: 0,
        };

        let request = ioc_write::<SpiIocTransfer>(0); // SPI_IOC_MESSAGE(1)
        checked_ioctl(
            self.file.as_raw_fd(),
            request,
            &transfer as *const SpiIocTransfer as *const libc::c_void,
        )
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;

    /// Records every frame sent to it and hands back pre-programmed
    /// responses, for engine and enumeration tests.
    pub struct FakeTransceiver {
        pub sent: Vec<SpiFrame>,
        pub responses: VecDeque<SpiFrame>,
        pub fail_next: bool,
    }

    impl FakeTransceiver {
        pub fn new() -> Self {
            FakeTransceiver {
                sent: Vec::new(),
                responses: VecDeque::new(),
                fail_next: false,
            }
        }

        pub fn push_response(&mut self, frame: SpiFrame) {
            self.responses.push_back(frame);
        }
    }

    impl Transceiver for FakeTransceiver {
        fn transceive(&mut self, tx: &SpiFrame, rx: &mut SpiFrame) -> io::Result<()> {
            if self.fail_next {
                self.fail_next = false;
                return Err(io::Error::from_raw_os_error(libc::EIO));
            }
            self.sent.push(*tx);
            // Only an empty (polling) outbound frame can surface a queued
            // response: a slave answers the request it already has buffered
            // on the *next* transaction, never on the one carrying the send.
            let is_poll = tx[1] == drv_spi_frame::EMPTY_FRAME_LEN;
            if is_poll {
                if let Some(response) = self.responses.pop_front() {
                    *rx = response;
                } else {
                    *rx = [0u8; FRAME_SIZE];
                }
            } else {
                *rx = [0u8; FRAME_SIZE];
            }
            Ok(())
        }
    }
}
