// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level daemon errors. Every variant here is fatal: by the time one of
//! these surfaces, `main` unwinds whatever init phases already ran (in
//! reverse, via ordinary `Drop`) and exits with failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrickdError {
    /// §9's open question, preserved literally: a non-zero configured stack
    /// address means this extension is a slave, and the source aborts
    /// outright rather than running in that role.
    #[error("only master mode supported (configured stack address was non-zero)")]
    OnlyMasterModeSupported,

    #[error("bringing up the SPI engine: {0}")]
    Engine(#[from] drv_spi_engine::EngineError),

    #[error("exporting GPIO select line: {0}")]
    SelectLine(#[source] std::io::Error),

    #[error("spawning the SPI engine thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("installing Ctrl-C / SIGTERM handler: {0}")]
    SignalHandler(#[source] ctrlc::Error),

    #[error("event loop: polling the bridge notification pipe: {0}")]
    EventLoopPoll(#[source] std::io::Error),

    #[error("event loop: draining the bridge notification pipe: {0}")]
    Bridge(#[source] std::io::Error),
}
