// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fatal errors raised while bringing the engine up.
//!
//! Nothing in here is raised once the steady-state loop is running: per-tick
//! failures (`SEND_ERROR`, `READ_ERROR`, ...) are logged and contained, never
//! propagated as a `Result` (see the frame-level failure semantics in the
//! design notes).

use thiserror::Error;

/// A failure during one of the init phases in [`crate::SpiEngine::init`].
///
/// Each variant corresponds to one phase; `task-brickd` uses this to decide
/// how far the init unwind needs to reach.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("opening SPI device {path}: {source}")]
    OpenDevice {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuring SPI mode on {path}: {source}")]
    Configure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("creating event bridge notification pipe: {source}")]
    BridgePipe {
        #[source]
        source: std::io::Error,
    },
}
