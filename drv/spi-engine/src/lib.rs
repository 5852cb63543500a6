// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Owns the SPI device: enumeration, the 500 µs steady-state polling loop,
//! the outbound queue, and the event bridge handoff to the rest of the
//! daemon. This is the component the router's SPI `Stack` implementation
//! sits directly on top of.

mod bridge;
mod config;
mod enumerate;
mod engine;
mod error;
mod outbound;
mod transceive;

pub use bridge::BridgeConsumer;
pub use config::{SpiEngineConfig, STACK_ENUMERATE};
pub use engine::{EngineHandle, SpiEngine};
pub use error::EngineError;
pub use outbound::{OutboundQueue, QueuedPacket};
pub use transceive::{SpidevTransceiver, Transceiver};
