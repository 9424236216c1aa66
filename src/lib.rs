//! # fnqueue: Deterministic Device Function Queue
//!
//! The timing backbone of a physical-layer network simulation: a fixed set
//! of simulated device interfaces each propose their next wake time and an
//! action kind, and the queue picks, tick after tick, the globally
//! earliest candidate with a strict, reproducible tie-break. No async, no
//! threads, no wall-clock time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │         Runner           │ ← driving loop, dispatch trace
//! │  ┌────────────────────┐  │
//! │  │      FnQueue       │  │ ← add / defer / remove, step, call_next
//! │  │  ┌──────────────┐  │  │
//! │  │  │  SlotTable   │  │  │ ← one entry per device
//! │  │  └──────────────┘  │  │
//! │  │  ┌──────────────┐  │  │
//! │  │  │  OrderIndex  │  │  │ ← ranked permutation + cursor
//! │  │  └──────────────┘  │  │
//! │  │  ┌──────────────┐  │  │
//! │  │  │   Registry   │  │  │ ← action kind → handler
//! │  │  └──────────────┘  │  │
//! │  └────────────────────┘  │
//! └──────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Entries rank by time (earlier first), then action kind (higher first),
//! then device number (lower first). Because device numbers are unique the
//! order is total, and identical call sequences always dispatch
//! identically.
//!
//! ## Deferred commit
//!
//! A device may register a provisional deadline with
//! [`FnQueue::add_deferred`]. As soon as the earliest committed time moves
//! away from the instant the deferral was made, every pending entry is
//! pulled in to that time and committed, in one deterministic pass.

pub mod config;
pub mod device;
pub mod entry;
pub mod error;
pub mod queue;
pub mod rank;
pub mod registry;
pub mod runner;
pub mod time;
pub mod trace;

mod order;

// Re-exports for convenience.
pub use config::{QueueConfig, RebuildPolicy};
pub use device::{ActionKind, DeviceId};
pub use entry::DeviceEventEntry;
pub use error::{ErrorCategory, QueueError, QueueResult};
pub use queue::{FnQueue, QueueContext, QueueStats};
pub use rank::RankKey;
pub use registry::ActionHandler;
pub use runner::Runner;
pub use time::VirtualTime;
pub use trace::{DispatchRecord, DispatchTrace};
