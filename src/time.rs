//! Simulated time for the function queue.
//!
//! A logical timestamp with no dependency on `std::time`. Time only moves
//! when the driving loop advances to the next scheduled entry, never from
//! wall-clock observation.

/// A logical tick in simulation time.
///
/// The maximum representable value is reserved as [`VirtualTime::NEVER`]:
/// a parked entry with no deadline. A real device must never schedule
/// itself at `NEVER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// Sentinel meaning "parked, no pending event". Loses against every
    /// real time.
    pub const NEVER: VirtualTime = VirtualTime(u64::MAX);

    /// Create a new `VirtualTime` from a raw tick value.
    #[inline]
    pub const fn new(ticks: u64) -> Self {
        VirtualTime(ticks)
    }

    /// Return the raw tick value.
    #[inline]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Returns `true` for the parked sentinel.
    #[inline]
    pub const fn is_never(self) -> bool {
        self.0 == u64::MAX
    }

    /// Advance time by `delta` ticks.
    ///
    /// Returns `None` on overflow or when the result would land on the
    /// `NEVER` sentinel.
    #[inline]
    pub fn advance(self, delta: u64) -> Option<VirtualTime> {
        match self.0.checked_add(delta) {
            Some(t) if t != u64::MAX => Some(VirtualTime(t)),
            _ => None,
        }
    }

    /// Returns the duration (in ticks) between two points in time.
    /// Returns `None` if `other` is after `self`.
    #[inline]
    pub fn duration_since(self, other: VirtualTime) -> Option<u64> {
        self.0.checked_sub(other.0)
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_never() {
            write!(f, "T=NEVER")
        } else {
            write!(f, "T={}", self.0)
        }
    }
}
