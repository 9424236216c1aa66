//! Device and action-kind identifiers.

/// A simulated device interface, indexed in `[0, n_devices)`.
///
/// A newtype rather than a bare integer so it cannot be confused with
/// times or action kinds at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(u32);

impl DeviceId {
    /// Create a device ID from its table index.
    #[inline]
    pub const fn new(id: u32) -> Self {
        DeviceId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Position of this device in the slot table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Identifier of the action a device runs next.
///
/// On a time tie a numerically higher kind is dispatched first, so
/// callers number their kinds by priority. The "no action" state of a
/// parked entry is `Option::<ActionKind>::None`, which ranks below every
/// real kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionKind(u16);

impl ActionKind {
    #[inline]
    pub const fn new(kind: u16) -> Self {
        ActionKind(kind)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "K{}", self.0)
    }
}
