// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine tunables. Defaults match the wire contract in §6; only the device
//! path and the select-line assignment are meant to change between boards.

use std::time::Duration;

/// Function code of the synthetic enumerate request/response.
pub const STACK_ENUMERATE: u8 = 0xFE;

#[derive(Debug, Clone)]
pub struct SpiEngineConfig {
    /// Path to the spidev character device, e.g. `/dev/spidev0.0`.
    pub device_path: String,
    /// SPI clock rate in Hz. The wire contract caps this at 8 MHz.
    pub clock_hz: u32,
    /// Steady-state polling cadence. The wire contract fixes this at 500 µs;
    /// configurable only so tests can run the loop body without sleeping.
    pub poll_period: Duration,
    /// Attempts per enumeration step before giving up on a stack address.
    pub enumerate_attempts: u32,
    /// Pause between enumeration attempts.
    pub enumerate_pause: Duration,
}

impl Default for SpiEngineConfig {
    fn default() -> Self {
        SpiEngineConfig {
            device_path: "/dev/spidev0.0".to_string(),
            clock_hz: 8_000_000,
            poll_period: Duration::from_micros(500),
            enumerate_attempts: 10,
            enumerate_pause: Duration::from_millis(50),
        }
    }
}
