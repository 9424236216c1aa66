//! Order Index: the ranked permutation of device numbers.
//!
//! `order[cursor..]` is the live, sorted part of the permutation and
//! `order[cursor]` is the head. Everything before the cursor is a device
//! that was parked and skipped; it stays parked and untouched until the
//! next full rebuild, because touching it disables the fast path.

use crate::device::DeviceId;
use crate::entry::DeviceEventEntry;
use crate::error::{QueueError, QueueResult};
use crate::rank::{compare, ranks_before};

/// Outcome of settling a mutated head without a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settle {
    /// The head still ranks first.
    Stayed,
    /// The head was parked; the cursor moved to the next device.
    Advanced,
    /// The head was moved into its place in the sorted tail.
    Reinserted,
    /// No cheap answer; the caller must rebuild.
    Rebuild,
}

#[derive(Debug, Clone)]
pub(crate) struct OrderIndex {
    order: Vec<DeviceId>,
    cursor: usize,
}

impl OrderIndex {
    /// Identity permutation of `[0, n_devices)`.
    pub(crate) fn new(n_devices: usize) -> QueueResult<Self> {
        let mut order = Vec::new();
        order
            .try_reserve_exact(n_devices)
            .map_err(|_| QueueError::Allocation { devices: n_devices })?;
        order.extend((0..n_devices as u32).map(DeviceId::new));
        Ok(OrderIndex { order, cursor: 0 })
    }

    #[inline]
    pub(crate) fn head(&self) -> DeviceId {
        self.order[self.cursor]
    }

    /// The sorted, not yet skipped part of the permutation.
    #[inline]
    pub(crate) fn live(&self) -> &[DeviceId] {
        &self.order[self.cursor..]
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    /// Re-sort every device and reset the cursor. O(n log n).
    pub(crate) fn rebuild(&mut self, entries: &[DeviceEventEntry]) {
        self.order.sort_unstable_by(|&a, &b| compare(entries, a, b));
        self.cursor = 0;
    }

    /// Restore the order after only the head's entry changed.
    ///
    /// The tail `order[cursor + 1..]` is still sorted, so the head either
    /// stays, is skipped (parked, O(1)), or is moved to its rank in the
    /// tail found by binary search.
    pub(crate) fn settle_head(&mut self, entries: &[DeviceEventEntry]) -> Settle {
        let cursor = self.cursor;
        let head = self.order[cursor];
        let head_parked = entries[head.index()].is_parked();

        let next = self.order.get(cursor + 1).copied();
        if head_parked {
            match next {
                Some(n) if !entries[n.index()].is_parked() => {
                    self.cursor += 1;
                    return Settle::Advanced;
                }
                // Skipped devices are parked too; among parked entries the
                // device number decides, and only a rebuild sees both sides.
                _ if cursor > 0 => return Settle::Rebuild,
                _ => {}
            }
        }

        let Some(next) = next else {
            return Settle::Stayed;
        };
        if ranks_before(entries, head, next) {
            return Settle::Stayed;
        }

        let pos = self.order[cursor + 1..]
            .partition_point(|&d| ranks_before(entries, d, head));
        self.order[cursor..=cursor + pos].rotate_left(1);
        Settle::Reinserted
    }

    /// Number of adjacent pairs of the live part that are out of order.
    #[cfg(test)]
    pub(crate) fn inversions(&self, entries: &[DeviceEventEntry]) -> usize {
        self.live()
            .windows(2)
            .filter(|w| !ranks_before(entries, w[0], w[1]))
            .count()
    }
}
