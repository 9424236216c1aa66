//! Queue configuration and its fluent builder.

/// How `step` keeps the order index consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RebuildPolicy {
    /// Advance the cursor or re-insert the consumed head when only the
    /// head was touched; full rebuild otherwise.
    #[default]
    Amortized,
    /// Full rebuild on every step. Reference behavior for equivalence
    /// checks; identical head sequence, O(n log n) per tick.
    Always,
}

/// Configuration of one simulation session.
///
/// # Example
/// ```rust
/// use fnqueue::config::{QueueConfig, RebuildPolicy};
///
/// let config = QueueConfig::new(16).always_rebuild().with_trace(1024);
/// assert_eq!(config.n_devices, 16);
/// assert_eq!(config.rebuild_policy, RebuildPolicy::Always);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueConfig {
    /// Fixed number of device interfaces for the session.
    pub n_devices: usize,
    pub rebuild_policy: RebuildPolicy,
    /// Initial capacity of the runner's dispatch trace. `0` disables it.
    pub trace_capacity: usize,
}

impl QueueConfig {
    /// Amortized stepping, no dispatch trace.
    pub fn new(n_devices: usize) -> Self {
        QueueConfig {
            n_devices,
            rebuild_policy: RebuildPolicy::Amortized,
            trace_capacity: 0,
        }
    }

    /// Rebuild the order index on every step.
    pub fn always_rebuild(mut self) -> Self {
        self.rebuild_policy = RebuildPolicy::Always;
        self
    }

    pub fn with_policy(mut self, policy: RebuildPolicy) -> Self {
        self.rebuild_policy = policy;
        self
    }

    /// Record every dispatch made by a `Runner`, pre-allocating
    /// `capacity` records. A capacity of `0` turns recording off.
    pub fn with_trace(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }

    #[inline]
    pub fn tracing_enabled(&self) -> bool {
        self.trace_capacity > 0
    }
}
