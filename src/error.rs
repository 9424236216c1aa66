//! Structured error types for the function queue.
//!
//! Every condition here is a programming defect in the caller. The public
//! queue operations fail fast by panicking with the error's text; the
//! `try_*` variants hand the same value back to a harness that wants to
//! inspect it.

use thiserror::Error;

use crate::device::{ActionKind, DeviceId};

/// Broad class of a [`QueueError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Registry or lifecycle misuse.
    Configuration,
    /// Allocation failure while building the queue.
    Resource,
    /// A caller broke an invariant of the slot table.
    Invariant,
}

/// The error type of the function queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    // ── Configuration ─────────────────────────────────────

    #[error("cannot register a handler for {0} after the queue has started")]
    RegisterAfterStart(ActionKind),

    #[error("a handler for {0} is already registered")]
    DuplicateRegistration(ActionKind),

    #[error("no handler registered for {kind} (dispatching {device})")]
    UnregisteredKind { kind: ActionKind, device: DeviceId },

    #[error("the queue has not been started")]
    NotStarted,

    #[error("the queue has already been started")]
    AlreadyStarted,

    // ── Resource ──────────────────────────────────────────

    #[error("failed to allocate the slot table for {devices} devices")]
    Allocation { devices: usize },

    #[error("a function queue needs at least one device")]
    ZeroDevices,

    // ── Invariant ─────────────────────────────────────────

    #[error("device {device} is out of range (queue has {n_devices} devices)")]
    DeviceOutOfRange { device: DeviceId, n_devices: usize },

    #[error("cannot dispatch {0}: its entry is parked")]
    DispatchParked(DeviceId),

    #[error("{0} tried to schedule itself at the reserved NEVER time")]
    ReservedTime(DeviceId),
}

impl QueueError {
    /// The category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::RegisterAfterStart(_)
            | QueueError::DuplicateRegistration(_)
            | QueueError::UnregisteredKind { .. }
            | QueueError::NotStarted
            | QueueError::AlreadyStarted => ErrorCategory::Configuration,
            QueueError::Allocation { .. } | QueueError::ZeroDevices => ErrorCategory::Resource,
            QueueError::DeviceOutOfRange { .. }
            | QueueError::DispatchParked(_)
            | QueueError::ReservedTime(_) => ErrorCategory::Invariant,
        }
    }
}

/// Convenience alias for `Result<T, QueueError>`.
pub type QueueResult<T> = Result<T, QueueError>;

/// Abort the current operation on a caller defect.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: QueueError) -> ! {
    tracing::error!(category = ?err.category(), "{}", err);
    panic!("fnqueue: {}", err)
}

/// Unwrap a queue result or fail fast.
pub(crate) trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for QueueResult<T> {
    #[inline]
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => fatal(e),
        }
    }
}
