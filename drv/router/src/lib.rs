// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The system-wide router: the only entry point the rest of the daemon
//! needs. Dispatches outbound client packets to the right transport by UID
//! and exposes one inbound callback per transport (consumed directly by
//! each transport, not re-exported here — see `drv-spi-engine::bridge`).

mod spi_stack;
mod stack;

pub use spi_stack::SpiStack;
pub use stack::Stack;

use std::sync::Arc;

use drv_spi_frame::Packet;

/// Ordered list of registered transports, built once during the init
/// sequence and never mutated after startup.
pub struct Router {
    stacks: Vec<Arc<dyn Stack>>,
}

impl Router {
    pub fn new() -> Self {
        Router { stacks: Vec::new() }
    }

    /// Registers a transport. Order matters only for broadcast fan-out,
    /// which dispatches to every stack regardless of order; registration
    /// itself happens once, during init (`hardware_add_stack` in §6).
    pub fn register(&mut self, stack: Arc<dyn Stack>) {
        self.stacks.push(stack);
    }

    /// Outbound routing for a client request packet, per §4.4.
    ///
    /// UID 0 fans the packet out to every registered stack, each of which
    /// fans it further to every device it owns. Any other UID goes to the
    /// one stack that claims it; if none does, this logs and drops — there
    /// is no negative acknowledgement to the client.
    pub fn dispatch_outbound(&self, packet: Packet) {
        if packet.is_broadcast() {
            for stack in &self.stacks {
                stack.dispatch_request(packet);
            }
            return;
        }

        match self.stacks.iter().find(|stack| stack.owns_uid(packet.uid())) {
            Some(stack) => stack.dispatch_request(packet),
            None => {
                log::error!(
                    "no stack owns UID 0x{:08x}; dropping outbound packet",
                    packet.uid()
                );
            }
        }
    }

    /// Inbound routing (§4.4): the single callback every transport funnels
    /// received packets through. The client/network layer that would
    /// actually serialize these to a socket is an external collaborator
    /// (the TCP listener is out of scope here), so this just logs; a real
    /// deployment replaces this call site with the network layer's hook.
    pub fn network_dispatch_response(&self, packet: Packet) {
        log::debug!(
            "inbound packet for UID 0x{:08x}, {} byte payload, ready for client delivery",
            packet.uid(),
            packet.payload().len()
        );
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingStack {
        name: &'static str,
        owned: Vec<u32>,
        received: Mutex<Vec<Packet>>,
    }

    impl Stack for RecordingStack {
        fn name(&self) -> &str {
            self.name
        }

        fn owns_uid(&self, uid: u32) -> bool {
            self.owned.contains(&uid)
        }

        fn dispatch_request(&self, packet: Packet) {
            self.received.lock().unwrap().push(packet);
        }
    }

    fn packet_for(uid: u32) -> Packet {
        Packet::new(uid, 0, 0, false, 0, &[]).unwrap()
    }

    #[test]
    fn routes_to_the_stack_that_owns_the_uid() {
        let mut router = Router::new();
        let spi = Arc::new(RecordingStack {
            name: "spi",
            owned: vec![0x1000],
            received: Mutex::new(Vec::new()),
        });
        let usb = Arc::new(RecordingStack {
            name: "usb",
            owned: vec![0x2000],
            received: Mutex::new(Vec::new()),
        });
        router.register(spi.clone());
        router.register(usb.clone());

        router.dispatch_outbound(packet_for(0x2000));

        assert_eq!(spi.received.lock().unwrap().len(), 0);
        assert_eq!(usb.received.lock().unwrap().len(), 1);
    }

    #[test]
    fn broadcast_reaches_every_stack_exactly_once() {
        let mut router = Router::new();
        let spi = Arc::new(RecordingStack {
            name: "spi",
            owned: vec![0x1000],
            received: Mutex::new(Vec::new()),
        });
        let usb = Arc::new(RecordingStack {
            name: "usb",
            owned: vec![0x2000],
            received: Mutex::new(Vec::new()),
        });
        router.register(spi.clone());
        router.register(usb.clone());

        router.dispatch_outbound(packet_for(0));

        assert_eq!(spi.received.lock().unwrap().len(), 1);
        assert_eq!(usb.received.lock().unwrap().len(), 1);
    }

    #[test]
    fn unknown_uid_is_dropped_without_touching_any_stack() {
        let mut router = Router::new();
        let spi = Arc::new(RecordingStack {
            name: "spi",
            owned: vec![0x1000],
            received: Mutex::new(Vec::new()),
        });
        router.register(spi.clone());

        router.dispatch_outbound(packet_for(0xDEAD_BEEF));

        assert_eq!(spi.received.lock().unwrap().len(), 0);
    }
}
