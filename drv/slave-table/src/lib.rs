// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed-capacity table of slaves discovered on the SPI bus.
//!
//! Slaves are created once, at their stack-address index, during
//! enumeration; nothing after enumeration ever grows the table or moves a
//! slave between indices. See `drv-spi-engine::enumerate` for the discovery
//! handshake that populates this table.

mod select_line;

pub use select_line::{NullSelectLine, SelectLine, SysfsSelectLine};

/// Number of stack addresses on the bus (`0..MAX_SLAVES`).
pub const MAX_SLAVES: usize = 8;

/// Largest number of UIDs a single slave can report during enumeration.
///
/// The enumeration response payload is at most 72 bytes (the packet
/// maximum minus the 8-byte header); each UID is 4 bytes and the list is
/// zero-terminated, so 17 is the hard ceiling. We keep a round number below
/// that.
pub const MAX_UIDS_PER_SLAVE: usize = 16;

/// Lifecycle state of one stack-address slot.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SlaveStatus {
    /// No slave answered enumeration at this address; the table ends here.
    Absent,
    /// A slave answered and its last reply did not set the busy bit.
    Available,
    /// A slave answered and its last reply set the busy bit.
    AvailableBusy,
}

/// One physical device position on the bus.
pub struct Slave {
    stack_address: u8,
    status: SlaveStatus,
    select_line: Box<dyn SelectLine>,
    uids: [u32; MAX_UIDS_PER_SLAVE],
    uids_count: usize,
}

impl Slave {
    /// Creates a slave in the `Absent` state at `stack_address`, deselected.
    pub fn new(stack_address: u8, select_line: Box<dyn SelectLine>) -> Self {
        select_line.deassert();
        Slave {
            stack_address,
            status: SlaveStatus::Absent,
            select_line,
            uids: [0; MAX_UIDS_PER_SLAVE],
            uids_count: 0,
        }
    }

    pub fn stack_address(&self) -> u8 {
        self.stack_address
    }

    pub fn status(&self) -> SlaveStatus {
        self.status
    }

    pub fn select_line(&self) -> &dyn SelectLine {
        self.select_line.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.status != SlaveStatus::Absent
    }

    pub fn is_busy(&self) -> bool {
        self.status == SlaveStatus::AvailableBusy
    }

    /// The UIDs this slave reported owning during enumeration.
    pub fn uids(&self) -> &[u32] {
        &self.uids[..self.uids_count]
    }

    fn set_status(&mut self, status: SlaveStatus) {
        self.status = status;
    }

    fn set_uids(&mut self, uids: &[u32]) {
        let count = uids.len().min(MAX_UIDS_PER_SLAVE);
        self.uids[..count].copy_from_slice(&uids[..count]);
        self.uids_count = count;
    }
}

/// Fixed-capacity table of up to [`MAX_SLAVES`] slaves, with a `slave_num`
/// prefix counting the contiguous present ones.
///
/// The invariant enforced by every mutating method here: indices
/// `[0, slave_num)` are `Available` or `AvailableBusy`, and indices
/// `[slave_num, MAX_SLAVES)` are `Absent`. There are no holes, because
/// discovery (`drv-spi-engine::enumerate`) stops at the first absent index.
pub struct SlaveTable {
    slaves: Vec<Slave>,
    slave_num: usize,
}

impl SlaveTable {
    /// Builds an empty table backed by `slaves`, one per stack address.
    ///
    /// `slaves` must have exactly [`MAX_SLAVES`] entries, indexed by stack
    /// address, all starting `Absent`.
    pub fn new(slaves: Vec<Slave>) -> Self {
        assert_eq!(slaves.len(), MAX_SLAVES, "one slot per stack address");
        SlaveTable {
            slaves,
            slave_num: 0,
        }
    }

    /// Number of contiguously present slaves, i.e. the enumerated stack size.
    pub fn slave_num(&self) -> usize {
        self.slave_num
    }

    pub fn get(&self, index: usize) -> Option<&Slave> {
        self.slaves.get(index)
    }

    /// Marks `index` present and records its reported UIDs. Only ever called
    /// by enumeration, and only in stack-address order, which is what keeps
    /// the no-holes invariant intact.
    pub fn mark_present(&mut self, index: usize, uids: &[u32]) {
        assert_eq!(index, self.slave_num, "enumeration must proceed in order");
        self.slaves[index].set_status(SlaveStatus::Available);
        self.slaves[index].set_uids(uids);
        self.slave_num += 1;
    }

    /// Updates the busy bit for a present slave from its most recent reply.
    pub fn mark_busy(&mut self, index: usize, busy: bool) {
        debug_assert!(index < self.slave_num);
        let status = if busy {
            SlaveStatus::AvailableBusy
        } else {
            SlaveStatus::Available
        };
        self.slaves[index].set_status(status);
    }

    /// Finds the present slave that owns `uid`, if any.
    ///
    /// Linear over `slave_num * MAX_UIDS_PER_SLAVE` entries at worst; callers
    /// are expected to cache the result for the duration of one dispatch
    /// rather than re-scanning per byte of a transfer.
    pub fn find_by_uid(&self, uid: u32) -> Option<(usize, &Slave)> {
        self.slaves[..self.slave_num]
            .iter()
            .enumerate()
            .find(|(_, slave)| slave.uids().contains(&uid))
    }

    /// Iterates the present slaves in stack-address order, for broadcast
    /// fan-out.
    pub fn present(&self) -> impl Iterator<Item = (usize, &Slave)> {
        self.slaves[..self.slave_num].iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(present: usize) -> SlaveTable {
        let slaves = (0..MAX_SLAVES as u8)
            .map(|addr| Slave::new(addr, Box::new(NullSelectLine)))
            .collect();
        let mut table = SlaveTable::new(slaves);
        for i in 0..present {
            table.mark_present(i, &[0x1000 + i as u32]);
        }
        table
    }

    #[test]
    fn no_holes_invariant_holds_after_partial_enumeration() {
        let table = table_with(3);
        assert_eq!(table.slave_num(), 3);
        for i in 0..3 {
            assert!(table.get(i).unwrap().is_present());
        }
        for i in 3..MAX_SLAVES {
            assert_eq!(table.get(i).unwrap().status(), SlaveStatus::Absent);
        }
    }

    #[test]
    fn find_by_uid_only_considers_present_slaves() {
        let table = table_with(2);
        assert!(table.find_by_uid(0x1000).is_some());
        assert!(table.find_by_uid(0x1001).is_some());
        // Slave 2 was never marked present even though a real device might
        // be sitting at that address electrically.
        assert!(table.find_by_uid(0x1002).is_none());
    }

    #[test]
    fn busy_bit_does_not_affect_presence() {
        let mut table = table_with(1);
        table.mark_busy(0, true);
        assert_eq!(table.get(0).unwrap().status(), SlaveStatus::AvailableBusy);
        assert!(table.get(0).unwrap().is_present());
    }

    #[test]
    fn broadcast_zero_uid_is_never_owned_by_a_slave() {
        let table = table_with(MAX_SLAVES);
        assert!(table.find_by_uid(0).is_none());
    }
}
