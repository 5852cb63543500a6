// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The outbound queue shared between the router (producer) and the SPI
//! engine (consumer). See §5: guarded by one mutex held only for
//! push/peek/pop, never across I/O.

use std::collections::VecDeque;
use std::sync::Mutex;

use drv_spi_frame::Packet;

/// One packet queued for a specific slave, identified by its stack-address
/// index rather than its UID: the router resolves the UID once, at enqueue
/// time, so the engine's steady-state loop never has to scan the table.
#[derive(Debug, Clone, Copy)]
pub struct QueuedPacket {
    pub slave_index: usize,
    pub packet: Packet,
}

/// FIFO of queued outbound packets. Bounded only by memory; pushers never
/// block.
#[derive(Default)]
pub struct OutboundQueue {
    queue: Mutex<VecDeque<QueuedPacket>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        OutboundQueue {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, entry: QueuedPacket) {
        self.queue.lock().unwrap().push_back(entry);
    }

    /// Returns a copy of the head entry without removing it.
    pub fn peek(&self) -> Option<QueuedPacket> {
        self.queue.lock().unwrap().front().copied()
    }

    /// Removes the head entry. Called only after it has actually been sent.
    pub fn pop(&self) {
        self.queue.lock().unwrap().pop_front();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
