// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `Stack` abstraction: one transport plus the set of UIDs it owns.
//!
//! The source represents this as a base struct with a function pointer for
//! `dispatch_request`; here it's a plain trait object, one per transport
//! (USB, SPI, RS485, ...), held by the [`crate::Router`] through a stable
//! `Arc`.

use drv_spi_frame::Packet;

/// A transport's handle into the router.
///
/// `create`/`add_uid`/`destroy` from the interface in §6 map onto ordinary
/// construction, [`Stack::owns_uid`]'s backing set being populated at
/// construction time, and `Drop`, respectively; there is no separate
/// lifecycle API here because Rust's ownership already gives the router
/// those guarantees.
pub trait Stack: Send + Sync {
    /// Name used in log lines, e.g. `"spi"`, `"usb"`, `"rs485"`.
    fn name(&self) -> &str;

    /// Whether this stack owns `uid`. Never true for UID 0; broadcast is
    /// handled by the router itself, not by any one stack.
    fn owns_uid(&self, uid: u32) -> bool;

    /// Hands `packet` to this transport for delivery to its device. Must
    /// return quickly: for the SPI stack this means "acquire the queue
    /// mutex, push, release" — never blocking on the bus itself.
    fn dispatch_request(&self, packet: Packet);
}
