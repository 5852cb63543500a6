// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line surface. Deliberately small: the daemon's own config-file
//! parsing is out of scope (§1), so everything that matters for bringing up
//! just the SPI core is here instead.

use std::time::Duration;

use clap::Parser;

use drv_spi_engine::SpiEngineConfig;

#[derive(Debug, Parser)]
#[command(name = "brickd", about = "Bridges brick control modules to network clients")]
pub struct Cli {
    /// spidev character device to open.
    #[arg(long, default_value = "/dev/spidev0.0")]
    pub spi_device: String,

    /// SPI clock rate in Hz.
    #[arg(long, default_value_t = 8_000_000)]
    pub spi_clock_hz: u32,

    /// This extension's own stack address. Only 0 (master) is supported;
    /// see the open question in the design notes.
    #[arg(long, default_value_t = 0)]
    pub address: u8,

    /// Base Linux GPIO line number for slave-select; line `base + i` selects
    /// stack address `i`. Omit to drive no GPIOs (useful off-hardware).
    #[arg(long)]
    pub gpio_base: Option<u32>,
}

impl Cli {
    pub fn engine_config(&self) -> SpiEngineConfig {
        SpiEngineConfig {
            device_path: self.spi_device.clone(),
            clock_hz: self.spi_clock_hz,
            poll_period: Duration::from_micros(500),
            enumerate_attempts: 10,
            enumerate_pause: Duration::from_millis(50),
        }
    }
}
