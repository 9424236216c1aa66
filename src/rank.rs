//! Ranking Function: the strict total order over device entries.
//!
//! Evaluated left to right:
//!
//! 1. scheduled time, ascending;
//! 2. action kind, descending (a higher kind wins a time tie);
//! 3. device number, ascending.
//!
//! Device numbers are unique, so two different devices never compare
//! equal.

use std::cmp::{Ordering, Reverse};

use crate::device::{ActionKind, DeviceId};
use crate::entry::DeviceEventEntry;
use crate::time::VirtualTime;

/// Sort key of one device. Smaller ranks first.
///
/// Plain lexicographic tuple comparison; no packing of fields into a
/// single integer, so widening any field cannot overflow into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey(VirtualTime, Reverse<Option<ActionKind>>, DeviceId);

impl RankKey {
    #[inline]
    pub fn new(entry: &DeviceEventEntry, device: DeviceId) -> Self {
        RankKey(
            entry.scheduled_time,
            Reverse(entry.action_kind),
            device,
        )
    }

    #[inline]
    pub fn time(&self) -> VirtualTime {
        self.0
    }

    #[inline]
    pub fn device(&self) -> DeviceId {
        self.2
    }
}

/// Compare two devices of a slot table.
#[inline]
pub fn compare(entries: &[DeviceEventEntry], a: DeviceId, b: DeviceId) -> Ordering {
    let ka = RankKey::new(&entries[a.index()], a);
    let kb = RankKey::new(&entries[b.index()], b);
    ka.cmp(&kb)
}

/// `true` if `a` is dispatched before `b`.
#[inline]
pub fn ranks_before(entries: &[DeviceEventEntry], a: DeviceId, b: DeviceId) -> bool {
    compare(entries, a, b) == Ordering::Less
}
