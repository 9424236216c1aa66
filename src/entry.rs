//! Device Slot Table: one event entry per device.
//!
//! Entries are created parked when the queue is built and are only ever
//! overwritten or reset to the parked state, never deleted. A device with
//! nothing to do simply holds `NEVER`, which loses against every real time.

use crate::device::{ActionKind, DeviceId};
use crate::error::{QueueError, QueueResult};
use crate::time::VirtualTime;

// ── DeviceEventEntry ──────────────────────────────────────────────────

/// The single outstanding event of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEventEntry {
    pub(crate) scheduled_time: VirtualTime,
    pub(crate) action_kind: Option<ActionKind>,
    pub(crate) pending: bool,
    /// Time the entry held when it was deferred. Only meaningful while
    /// `pending` is set.
    pub(crate) deferral_ref: VirtualTime,
}

impl DeviceEventEntry {
    /// A parked entry: no deadline, no action.
    pub const PARKED: DeviceEventEntry = DeviceEventEntry {
        scheduled_time: VirtualTime::NEVER,
        action_kind: None,
        pending: false,
        deferral_ref: VirtualTime::NEVER,
    };

    #[inline]
    pub fn scheduled_time(&self) -> VirtualTime {
        self.scheduled_time
    }

    #[inline]
    pub fn action_kind(&self) -> Option<ActionKind> {
        self.action_kind
    }

    /// `true` while the scheduled time is provisional.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    #[inline]
    pub fn is_parked(&self) -> bool {
        self.scheduled_time.is_never()
    }
}

// ── Touch tracking ────────────────────────────────────────────────────

/// Which devices were mutated since the order index was last made valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Touched {
    Nothing,
    Only(DeviceId),
    Many,
}

impl Touched {
    fn mark(&mut self, device: DeviceId) {
        *self = match *self {
            Touched::Nothing => Touched::Only(device),
            Touched::Only(d) if d == device => Touched::Only(d),
            _ => Touched::Many,
        };
    }
}

// ── SlotTable ─────────────────────────────────────────────────────────

/// Fixed-size table of per-device entries plus the flags that tell the
/// order index whether its cached permutation can still be trusted.
#[derive(Debug, Clone)]
pub(crate) struct SlotTable {
    entries: Vec<DeviceEventEntry>,
    force_resort: bool,
    pending_count: usize,
    touched: Touched,
}

impl SlotTable {
    /// Allocate `n_devices` parked entries.
    pub(crate) fn new(n_devices: usize) -> QueueResult<Self> {
        if n_devices == 0 {
            return Err(QueueError::ZeroDevices);
        }
        if u32::try_from(n_devices).is_err() {
            return Err(QueueError::Allocation { devices: n_devices });
        }
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(n_devices)
            .map_err(|_| QueueError::Allocation { devices: n_devices })?;
        entries.resize(n_devices, DeviceEventEntry::PARKED);

        Ok(SlotTable {
            entries,
            force_resort: false,
            pending_count: 0,
            touched: Touched::Nothing,
        })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn entries(&self) -> &[DeviceEventEntry] {
        &self.entries
    }

    /// Bounds-check a device number.
    #[inline]
    pub(crate) fn check(&self, device: DeviceId) -> QueueResult<usize> {
        let idx = device.index();
        if idx < self.entries.len() {
            Ok(idx)
        } else {
            Err(QueueError::DeviceOutOfRange {
                device,
                n_devices: self.entries.len(),
            })
        }
    }

    pub(crate) fn get(&self, device: DeviceId) -> QueueResult<&DeviceEventEntry> {
        let idx = self.check(device)?;
        Ok(&self.entries[idx])
    }

    /// Overwrite `device`'s entry with a committed event.
    ///
    /// Re-adding at the exact time the entry already held sets
    /// `force_resort`: the same-time tie-break order may have changed.
    pub(crate) fn add(
        &mut self,
        time: VirtualTime,
        kind: ActionKind,
        device: DeviceId,
    ) -> QueueResult<()> {
        let idx = self.check(device)?;
        if time.is_never() {
            return Err(QueueError::ReservedTime(device));
        }
        let entry = &mut self.entries[idx];
        if entry.scheduled_time == time {
            self.force_resort = true;
        }
        if entry.pending {
            self.pending_count -= 1;
        }
        *entry = DeviceEventEntry {
            scheduled_time: time,
            action_kind: Some(kind),
            pending: false,
            deferral_ref: VirtualTime::NEVER,
        };
        self.touched.mark(device);
        Ok(())
    }

    /// Overwrite `device`'s entry with a provisional deadline.
    pub(crate) fn add_deferred(
        &mut self,
        time: VirtualTime,
        kind: ActionKind,
        device: DeviceId,
    ) -> QueueResult<()> {
        let idx = self.check(device)?;
        if time.is_never() {
            return Err(QueueError::ReservedTime(device));
        }
        let entry = &mut self.entries[idx];
        if !entry.pending {
            self.pending_count += 1;
        }
        *entry = DeviceEventEntry {
            scheduled_time: time,
            action_kind: Some(kind),
            pending: true,
            deferral_ref: entry.scheduled_time,
        };
        self.touched.mark(device);
        Ok(())
    }

    /// Park `device`.
    pub(crate) fn remove(&mut self, device: DeviceId) -> QueueResult<()> {
        let idx = self.check(device)?;
        if self.entries[idx].pending {
            self.pending_count -= 1;
        }
        self.entries[idx] = DeviceEventEntry::PARKED;
        self.touched.mark(device);
        Ok(())
    }

    /// Commit `device`'s provisional time as-is. Does not count as a touch:
    /// the time and kind are unchanged.
    pub(crate) fn clear_pending(&mut self, device: DeviceId) {
        let entry = &mut self.entries[device.index()];
        if entry.pending {
            entry.pending = false;
            self.pending_count -= 1;
        }
    }

    #[inline]
    pub(crate) fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    #[inline]
    pub(crate) fn force_resort(&self) -> bool {
        self.force_resort
    }

    #[inline]
    pub(crate) fn touched(&self) -> Touched {
        self.touched
    }

    /// Forget all mutations; called once the order index is valid again.
    pub(crate) fn mark_clean(&mut self) {
        self.force_resort = false;
        self.touched = Touched::Nothing;
    }

    /// Earliest time over every entry, pending deadlines included.
    /// `NEVER` when every device is parked.
    pub(crate) fn min_time(&self) -> VirtualTime {
        self.entries
            .iter()
            .map(|e| e.scheduled_time)
            .min()
            .unwrap_or(VirtualTime::NEVER)
    }

    /// Resolve deferrals against `now`, the resolved head time.
    ///
    /// Nothing happens while every pending entry was deferred at `now`.
    /// Otherwise every pending entry is moved to `now` and committed.
    ///
    /// Returns the number of entries resolved.
    pub(crate) fn flush_pending(&mut self, now: VirtualTime) -> usize {
        let due = self
            .entries
            .iter()
            .any(|e| e.pending && e.deferral_ref != now);
        if !due {
            return 0;
        }
        let mut flushed = 0;
        for entry in self.entries.iter_mut().filter(|e| e.pending) {
            entry.scheduled_time = now;
            entry.pending = false;
            entry.deferral_ref = VirtualTime::NEVER;
            flushed += 1;
        }
        self.pending_count = 0;
        self.touched = Touched::Many;
        flushed
    }
}
