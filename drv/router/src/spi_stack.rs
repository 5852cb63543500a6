// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SPI transport's [`Stack`] implementation: resolves a UID against the
//! slave table and pushes onto the engine's outbound queue.

use std::sync::{Arc, Mutex};

use drv_slave_table::SlaveTable;
use drv_spi_engine::{EngineHandle, OutboundQueue, QueuedPacket};
use drv_spi_frame::Packet;

use crate::stack::Stack;

/// The SPI bus as a `Stack`. Built directly from an [`EngineHandle`], so the
/// router never has to know about the engine's queue or slave table types.
pub struct SpiStack {
    slaves: Arc<Mutex<SlaveTable>>,
    outbound: Arc<OutboundQueue>,
}

impl SpiStack {
    pub fn new(handle: &EngineHandle) -> Self {
        SpiStack {
            slaves: handle.slaves.clone(),
            outbound: handle.outbound.clone(),
        }
    }
}

impl Stack for SpiStack {
    fn name(&self) -> &str {
        "spi"
    }

    fn owns_uid(&self, uid: u32) -> bool {
        if uid == 0 {
            return false;
        }
        self.slaves.lock().unwrap().find_by_uid(uid).is_some()
    }

    /// Resolves `packet`'s UID to a slave index and pushes it onto the
    /// outbound queue, all under one lock of the slave table, matching the
    /// "router reads the slave table only inside the queue-mutex critical
    /// section" rule in §5.
    ///
    /// `Router::dispatch_outbound` hands every registered stack the raw
    /// broadcast packet (UID 0) and expects each stack to fan it out to
    /// every device it owns (§4.4); for this stack that means one queue
    /// entry per present slave, in stack-address order (§8 scenario 3).
    fn dispatch_request(&self, packet: Packet) {
        let slaves = self.slaves.lock().unwrap();

        if packet.is_broadcast() {
            for (slave_index, _slave) in slaves.present() {
                self.outbound.push(QueuedPacket {
                    slave_index,
                    packet,
                });
            }
            return;
        }

        match slaves.find_by_uid(packet.uid()) {
            Some((slave_index, _slave)) => {
                self.outbound.push(QueuedPacket {
                    slave_index,
                    packet,
                });
            }
            None => {
                log::error!(
                    "dropping outbound packet: UID 0x{:08x} is not owned by any SPI slave",
                    packet.uid()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_slave_table::{NullSelectLine, Slave, SlaveTable};

    fn stack_with_present_slaves(count: usize) -> SpiStack {
        let slaves = (0..drv_slave_table::MAX_SLAVES as u8)
            .map(|addr| Slave::new(addr, Box::new(NullSelectLine)))
            .collect();
        let mut table = SlaveTable::new(slaves);
        for i in 0..count {
            table.mark_present(i, &[0x1000 + i as u32]);
        }
        SpiStack {
            slaves: Arc::new(Mutex::new(table)),
            outbound: Arc::new(OutboundQueue::new()),
        }
    }

    #[test]
    fn owns_uid_is_false_for_broadcast() {
        let stack = stack_with_present_slaves(1);
        assert!(!stack.owns_uid(0));
        assert!(stack.owns_uid(0x1000));
    }

    #[test]
    fn broadcast_enqueues_one_copy_per_present_slave_in_order() {
        let stack = stack_with_present_slaves(3);
        let packet = Packet::new(0, 0, 0, false, 0, &[]).unwrap();

        stack.dispatch_request(packet);

        assert_eq!(stack.outbound.len(), 3);
        for expected_index in 0..3 {
            assert_eq!(stack.outbound.peek().unwrap().slave_index, expected_index);
            stack.outbound.pop();
        }
    }

    #[test]
    fn unicast_enqueues_exactly_one_entry_for_the_owning_slave() {
        let stack = stack_with_present_slaves(2);
        let packet = Packet::new(0x1001, 0, 0, false, 0, &[]).unwrap();

        stack.dispatch_request(packet);

        assert_eq!(stack.outbound.len(), 1);
        assert_eq!(stack.outbound.peek().unwrap().slave_index, 1);
    }

    #[test]
    fn unknown_uid_enqueues_nothing() {
        let stack = stack_with_present_slaves(1);
        let packet = Packet::new(0xDEAD_BEEF, 0, 0, false, 0, &[]).unwrap();

        stack.dispatch_request(packet);

        assert!(stack.outbound.is_empty());
    }
}
