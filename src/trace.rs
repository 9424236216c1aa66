//! Dispatch trace for reproducibility checks.
//!
//! Records every dispatch made by a [`Runner`](crate::runner::Runner) into
//! an append-only log and folds it into a single hash, so two runs can be
//! compared bit-for-bit without keeping both logs around.

use crate::device::{ActionKind, DeviceId};
use crate::time::VirtualTime;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

// ── DispatchRecord ────────────────────────────────────────────────────

/// One dispatched handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatchRecord {
    /// Position in the dispatch sequence, starting at 0.
    pub index: u64,
    pub time: VirtualTime,
    pub device: DeviceId,
    pub kind: ActionKind,
}

impl DispatchRecord {
    fn hash(&self) -> u64 {
        let mut h = hash_combine(0, self.index);
        h = hash_combine(h, self.time.ticks());
        h = hash_combine(h, u64::from(self.device.raw()));
        hash_combine(h, u64::from(self.kind.raw()))
    }
}

impl std::fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} {} {}", self.index, self.time, self.device, self.kind)
    }
}

// ── DispatchTrace ─────────────────────────────────────────────────────

/// Append-only log of dispatches with a running hash.
#[derive(Debug, Clone, Default)]
pub struct DispatchTrace {
    records: Vec<DispatchRecord>,
    hash: u64,
}

impl DispatchTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        DispatchTrace {
            records: Vec::with_capacity(capacity),
            hash: 0,
        }
    }

    pub fn record(&mut self, record: DispatchRecord) {
        self.hash = hash_combine(self.hash, record.hash());
        self.records.push(record);
    }

    pub fn records(&self) -> &[DispatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deterministic hash of the whole dispatch sequence.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Index of the first record where two traces diverge, if any.
    pub fn first_divergence(&self, other: &DispatchTrace) -> Option<usize> {
        let common = self
            .records
            .iter()
            .zip(other.records.iter())
            .position(|(a, b)| a != b);
        match common {
            Some(i) => Some(i),
            None if self.len() != other.len() => Some(self.len().min(other.len())),
            None => None,
        }
    }
}
