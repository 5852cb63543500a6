// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Slave-select (chip-select) GPIO lines.
//!
//! The SPI bus only exposes one or two hardware chip-selects per bus, but
//! up to [`super::MAX_SLAVES`] slaves share it, so each stack address gets
//! its own ordinary GPIO line that the engine drives low/high around a
//! transaction instead of relying on the controller's built-in CS.

use std::fs::OpenOptions;
use std::io::{self, Write};

/// A GPIO line used to select one slave on the bus.
///
/// Implementations must be safe to call from the SPI thread only; the table
/// never calls these concurrently.
pub trait SelectLine: Send {
    /// Drives the line active (selects the slave).
    fn assert(&self);
    /// Drives the line inactive (deselects the slave).
    fn deassert(&self);
}

/// A line backed by the Linux sysfs GPIO interface
/// (`/sys/class/gpio/gpio<N>/value`), active-low per the wire convention
/// used elsewhere on this bus (CS asserted == line driven low).
pub struct SysfsSelectLine {
    line: u32,
}

impl SysfsSelectLine {
    /// Exports `line` (if not already exported) and configures it as an
    /// output, initially deselected.
    pub fn export(line: u32) -> io::Result<Self> {
        let export_path = "/sys/class/gpio/export";
        // Exporting an already-exported line returns EBUSY; that's fine.
        if let Ok(mut f) = OpenOptions::new().write(true).open(export_path) {
            let _ = write!(f, "{line}");
        }
        let direction_path = format!("/sys/class/gpio/gpio{line}/direction");
        let mut direction = OpenOptions::new().write(true).open(&direction_path)?;
        write!(direction, "out")?;

        let select_line = SysfsSelectLine { line };
        select_line.deassert();
        Ok(select_line)
    }

    fn write_value(&self, value: &str) {
        let value_path = format!("/sys/class/gpio/gpio{}/value", self.line);
        if let Ok(mut f) = OpenOptions::new().write(true).open(&value_path) {
            let _ = write!(f, "{value}");
        } else {
            log::error!("select line {}: failed to open {value_path}", self.line);
        }
    }
}

impl SelectLine for SysfsSelectLine {
    fn assert(&self) {
        self.write_value("0");
    }

    fn deassert(&self) {
        self.write_value("1");
    }
}

/// A select line that does nothing, for tests and for boards where CS is
/// handled entirely by the SPI controller's own hardware chip-select.
pub struct NullSelectLine;

impl SelectLine for NullSelectLine {
    fn assert(&self) {}
    fn deassert(&self) {}
}
