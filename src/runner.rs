//! Driving loop.
//!
//! Repeatedly reads the head's time, advances the simulated clock to it,
//! dispatches the head and brings the queue up to date. Purely
//! synchronous and single-threaded.

use tracing::{debug, trace};

use crate::error::{fatal, OrFatal, QueueError};
use crate::queue::FnQueue;
use crate::time::VirtualTime;
use crate::trace::{DispatchRecord, DispatchTrace};

/// Owns a started-or-not [`FnQueue`] and the device model its handlers
/// operate on.
pub struct Runner<M> {
    queue: FnQueue<M>,
    model: M,
    current_time: VirtualTime,
    dispatches: u64,
    trace: Option<DispatchTrace>,
}

impl<M> Runner<M> {
    /// Wrap a queue whose handlers and first entries are set up.
    ///
    /// A dispatch trace is kept if the queue's config enables it.
    pub fn new(queue: FnQueue<M>, model: M) -> Self {
        let trace = queue
            .config()
            .tracing_enabled()
            .then(|| DispatchTrace::with_capacity(queue.config().trace_capacity));
        Runner {
            queue,
            model,
            current_time: VirtualTime::ZERO,
            dispatches: 0,
            trace,
        }
    }

    /// Start the queue unless already started.
    pub fn start(&mut self) {
        if !self.queue.is_started() {
            self.queue.start();
        }
    }

    /// Simulated time of the last dispatch.
    pub fn current_time(&self) -> VirtualTime {
        self.current_time
    }

    /// Total dispatches so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Time of the next dispatch, `NEVER` when every device is parked.
    pub fn next_time(&self) -> VirtualTime {
        self.queue.get_next_time()
    }

    /// Dispatch exactly one entry.
    ///
    /// Returns `None` once every device is parked.
    ///
    /// # Panics
    /// Panics if the queue is not started or on any queue error.
    pub fn step_once(&mut self) -> Option<DispatchRecord> {
        if !self.queue.is_started() {
            fatal(QueueError::NotStarted);
        }
        let next = self.queue.get_next_time();
        if next.is_never() {
            return None;
        }
        self.current_time = next;

        let (device, kind) = self.queue.dispatch_head(&mut self.model).or_fatal();
        self.queue.step(next);

        let record = DispatchRecord {
            index: self.dispatches,
            time: next,
            device,
            kind,
        };
        self.dispatches += 1;
        trace!(%record, "dispatched");
        if let Some(trace) = self.trace.as_mut() {
            trace.record(record);
        }
        Some(record)
    }

    /// Run while the next dispatch is at or before `end`.
    ///
    /// Returns the number of dispatches made by this call.
    pub fn run_until(&mut self, end: VirtualTime) -> u64 {
        self.start();
        let start = self.dispatches;
        while self.queue.get_next_time() <= end {
            if self.step_once().is_none() {
                break;
            }
        }
        debug!(
            end = %end,
            dispatched = self.dispatches - start,
            now = %self.current_time,
            "run finished"
        );
        self.dispatches - start
    }

    /// Run until every device is parked or `max` dispatches were made.
    pub fn run_for(&mut self, max: u64) -> u64 {
        self.start();
        let start = self.dispatches;
        while self.dispatches - start < max {
            if self.step_once().is_none() {
                break;
            }
        }
        self.dispatches - start
    }

    /// `true` once every device is parked.
    pub fn is_finished(&self) -> bool {
        self.queue.is_started() && self.queue.get_next_time().is_never()
    }

    pub fn queue(&self) -> &FnQueue<M> {
        &self.queue
    }

    /// Mutable access, e.g. to seed entries before `start()`.
    pub fn queue_mut(&mut self) -> &mut FnQueue<M> {
        &mut self.queue
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn trace(&self) -> Option<&DispatchTrace> {
        self.trace.as_ref()
    }

    pub fn into_parts(self) -> (FnQueue<M>, M, Option<DispatchTrace>) {
        (self.queue, self.model, self.trace)
    }
}

impl<M: std::fmt::Debug> std::fmt::Debug for Runner<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("queue", &self.queue)
            .field("model", &self.model)
            .field("current_time", &self.current_time)
            .field("dispatches", &self.dispatches)
            .finish_non_exhaustive()
    }
}
