//! Scheduler Driver: the function queue itself.
//!
//! Every device owns exactly one entry. On each tick the queue picks the
//! entry ranked first (earliest time, then highest action kind, then
//! lowest device number) and dispatches the handler registered for its
//! action kind. The handler re-schedules its own device through the
//! [`QueueContext`] before control returns to the driving loop.
//!
//! ```text
//!  driving loop                         FnQueue
//!  ────────────                         ───────
//!  t = get_next_time()  ──────────────► head entry time
//!  advance clock to t
//!  call_next(model)     ──────────────► handler(model, ctx, head)
//!                                          └─ ctx.add / add_deferred / remove
//!  step(t)              ──────────────► fast path or full rebuild,
//!                                       then deferred flush
//! ```
//!
//! The same sequence of calls always yields the same dispatch order.

use tracing::{debug, trace};

use crate::config::{QueueConfig, RebuildPolicy};
use crate::device::{ActionKind, DeviceId};
use crate::entry::{DeviceEventEntry, SlotTable, Touched};
use crate::error::{fatal, OrFatal, QueueError, QueueResult};
use crate::order::{OrderIndex, Settle};
use crate::registry::{ActionHandler, CallbackRegistry};
use crate::time::VirtualTime;

// ── Statistics ────────────────────────────────────────────────────────

/// Counters describing how the order index was maintained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Calls to `step`.
    pub steps: u64,
    /// Full O(n log n) re-sorts, including the one done by `start`.
    pub full_rebuilds: u64,
    /// Steps resolved in O(1): head kept or parked head skipped.
    pub fast_advances: u64,
    /// Steps resolved by moving the consumed head into the sorted tail.
    pub reinsertions: u64,
    /// Deferred-commit passes that resolved at least one entry.
    pub flushes: u64,
    /// Handlers invoked by `call_next`.
    pub dispatches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RebuildReason {
    Start,
    Policy,
    ForceResort,
    Pending,
    Touched,
    ParkedHead,
    Flush,
}

// ── QueueContext ──────────────────────────────────────────────────────

/// Handle given to a dispatched handler.
///
/// Borrows the slot table mutably, so a handler can only influence
/// scheduling through add / defer / remove.
pub struct QueueContext<'a> {
    pub(crate) slots: &'a mut SlotTable,
    pub(crate) now: VirtualTime,
    pub(crate) device: DeviceId,
}

impl QueueContext<'_> {
    /// Scheduled time of the entry being dispatched.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// The device being dispatched.
    #[inline]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn n_devices(&self) -> usize {
        self.slots.len()
    }

    /// Read any device's entry.
    ///
    /// # Panics
    /// Panics if `device` is out of range.
    pub fn entry(&self, device: DeviceId) -> DeviceEventEntry {
        *self.slots.get(device).or_fatal()
    }

    /// Schedule `device` at `time` running `kind`.
    ///
    /// # Panics
    /// Panics if `device` is out of range or `time` is `NEVER`.
    pub fn add(&mut self, time: VirtualTime, kind: ActionKind, device: DeviceId) {
        self.slots.add(time, kind, device).or_fatal()
    }

    /// Schedule `device` provisionally; see [`FnQueue::add_deferred`].
    ///
    /// # Panics
    /// Panics if `device` is out of range or `time` is `NEVER`.
    pub fn add_deferred(&mut self, time: VirtualTime, kind: ActionKind, device: DeviceId) {
        self.slots.add_deferred(time, kind, device).or_fatal()
    }

    /// Park `device`.
    ///
    /// # Panics
    /// Panics if `device` is out of range.
    pub fn remove(&mut self, device: DeviceId) {
        self.slots.remove(device).or_fatal()
    }

    /// Re-schedule the dispatched device `delay` ticks after now.
    ///
    /// # Panics
    /// Panics if the resulting time overflows into `NEVER`.
    pub fn schedule_after(&mut self, delay: u64, kind: ActionKind) {
        let at = self
            .now
            .advance(delay)
            .unwrap_or_else(|| fatal(QueueError::ReservedTime(self.device)));
        self.add(at, kind, self.device);
    }

    /// Defer the dispatched device until at most `deadline`.
    pub fn defer_until(&mut self, deadline: VirtualTime, kind: ActionKind) {
        self.add_deferred(deadline, kind, self.device);
    }

    /// Park the dispatched device.
    pub fn park(&mut self) {
        self.remove(self.device);
    }
}

// ── FnQueue ───────────────────────────────────────────────────────────

/// The function queue for one simulation session.
///
/// `M` is the device model handed to every handler on dispatch.
///
/// # Example
/// ```rust
/// use fnqueue::{ActionKind, DeviceId, FnQueue, QueueContext, VirtualTime};
///
/// const TX: ActionKind = ActionKind::new(1);
///
/// let mut q: FnQueue<Vec<u32>> = FnQueue::new(2);
/// q.register(TX, |log: &mut Vec<u32>, ctx: &mut QueueContext<'_>, dev: DeviceId| {
///     log.push(dev.raw());
///     ctx.park();
/// });
/// q.add(VirtualTime::new(4), TX, DeviceId::new(1));
/// q.add(VirtualTime::new(2), TX, DeviceId::new(0));
/// q.start();
///
/// let mut log = Vec::new();
/// while !q.get_next_time().is_never() {
///     let t = q.get_next_time();
///     q.call_next(&mut log);
///     q.step(t);
/// }
/// assert_eq!(log, vec![0, 1]);
/// ```
pub struct FnQueue<M = ()> {
    config: QueueConfig,
    slots: SlotTable,
    order: OrderIndex,
    registry: CallbackRegistry<M>,
    started: bool,
    stats: QueueStats,
}

impl<M> FnQueue<M> {
    /// Create a queue of `n_devices` parked entries.
    ///
    /// # Panics
    /// Panics if `n_devices` is zero or the table cannot be allocated.
    pub fn new(n_devices: usize) -> Self {
        Self::try_new(n_devices).or_fatal()
    }

    pub fn try_new(n_devices: usize) -> QueueResult<Self> {
        Self::try_with_config(QueueConfig::new(n_devices))
    }

    /// # Panics
    /// Panics if the configured device count is zero or the table cannot
    /// be allocated.
    pub fn with_config(config: QueueConfig) -> Self {
        Self::try_with_config(config).or_fatal()
    }

    pub fn try_with_config(config: QueueConfig) -> QueueResult<Self> {
        let slots = SlotTable::new(config.n_devices)?;
        let order = OrderIndex::new(config.n_devices)?;
        debug!(
            n_devices = config.n_devices,
            policy = ?config.rebuild_policy,
            "function queue created"
        );
        Ok(FnQueue {
            config,
            slots,
            order,
            registry: CallbackRegistry::new(),
            started: false,
            stats: QueueStats::default(),
        })
    }

    // ── Registration ──────────────────────────────────────────

    /// Bind a closure to `kind`.
    ///
    /// # Panics
    /// Panics after `start()` or if `kind` is already bound.
    pub fn register<F>(&mut self, kind: ActionKind, handler: F)
    where
        F: FnMut(&mut M, &mut QueueContext<'_>, DeviceId) + 'static,
    {
        self.try_register_handler(kind, handler).or_fatal()
    }

    /// Bind any [`ActionHandler`] to `kind`.
    ///
    /// # Panics
    /// Panics after `start()` or if `kind` is already bound.
    pub fn register_handler<H>(&mut self, kind: ActionKind, handler: H)
    where
        H: ActionHandler<M> + 'static,
    {
        self.try_register_handler(kind, handler).or_fatal()
    }

    pub fn try_register_handler<H>(&mut self, kind: ActionKind, handler: H) -> QueueResult<()>
    where
        H: ActionHandler<M> + 'static,
    {
        self.registry.insert(kind, Box::new(handler))?;
        trace!(%kind, "handler registered");
        Ok(())
    }

    /// `true` if a handler is bound to `kind`.
    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.registry.contains(kind)
    }

    // ── Entry mutation ────────────────────────────────────────

    /// Schedule `device` at `time` running `kind`, replacing its entry.
    ///
    /// Re-adding at the time the entry already held forces a full
    /// rebuild on the next step.
    ///
    /// # Panics
    /// Panics if `device` is out of range or `time` is `NEVER`.
    pub fn add(&mut self, time: VirtualTime, kind: ActionKind, device: DeviceId) {
        self.try_add(time, kind, device).or_fatal()
    }

    pub fn try_add(
        &mut self,
        time: VirtualTime,
        kind: ActionKind,
        device: DeviceId,
    ) -> QueueResult<()> {
        self.slots.add(time, kind, device)
    }

    /// Schedule `device` provisionally: it acts at `time` unless the rest
    /// of the simulation moves on first.
    ///
    /// Once the head time differs from the time the entry held when
    /// deferred, every pending entry is set to that time and
    /// committed. Resolution invokes no handler.
    ///
    /// # Panics
    /// Panics if `device` is out of range or `time` is `NEVER`.
    pub fn add_deferred(&mut self, time: VirtualTime, kind: ActionKind, device: DeviceId) {
        self.try_add_deferred(time, kind, device).or_fatal()
    }

    pub fn try_add_deferred(
        &mut self,
        time: VirtualTime,
        kind: ActionKind,
        device: DeviceId,
    ) -> QueueResult<()> {
        self.slots.add_deferred(time, kind, device)
    }

    /// Park `device`: no further events until it is added again.
    ///
    /// # Panics
    /// Panics if `device` is out of range.
    pub fn remove(&mut self, device: DeviceId) {
        self.try_remove(device).or_fatal()
    }

    pub fn try_remove(&mut self, device: DeviceId) -> QueueResult<()> {
        self.slots.remove(device)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Freeze the registry and perform the initial full sort.
    ///
    /// # Panics
    /// Panics if called twice.
    pub fn start(&mut self) {
        self.try_start().or_fatal()
    }

    pub fn try_start(&mut self) -> QueueResult<()> {
        if self.started {
            return Err(QueueError::AlreadyStarted);
        }
        self.registry.freeze();
        self.started = true;
        self.rebuild(RebuildReason::Start);
        if self.slots.has_pending() {
            self.flush_pending();
        }
        debug!(
            head = %self.order.head(),
            time = %self.get_next_time(),
            kinds = self.registry.kinds().count(),
            "function queue started"
        );
        Ok(())
    }

    /// Bring the order index up to date after a dispatch.
    ///
    /// `current_time` is the value `get_next_time()` returned for the
    /// entry just consumed.
    ///
    /// A handler may schedule a device earlier than the time just
    /// consumed, so `current_time` is not required to be monotonic.
    ///
    /// # Panics
    /// Panics before `start()`.
    pub fn step(&mut self, current_time: VirtualTime) {
        self.try_step(current_time).or_fatal()
    }

    pub fn try_step(&mut self, current_time: VirtualTime) -> QueueResult<()> {
        if !self.started {
            return Err(QueueError::NotStarted);
        }
        self.stats.steps += 1;

        if let Some(reason) = self.slow_path_reason() {
            self.rebuild(reason);
        } else {
            match self.slots.touched() {
                Touched::Nothing => self.stats.fast_advances += 1,
                Touched::Only(device) if device == self.order.head() => {
                    match self.order.settle_head(self.slots.entries()) {
                        Settle::Stayed | Settle::Advanced => self.stats.fast_advances += 1,
                        Settle::Reinserted => self.stats.reinsertions += 1,
                        Settle::Rebuild => self.rebuild(RebuildReason::ParkedHead),
                    }
                    self.slots.mark_clean();
                }
                Touched::Only(_) | Touched::Many => self.rebuild(RebuildReason::Touched),
            }
        }

        if self.slots.has_pending() {
            self.flush_pending();
        }
        trace!(%current_time, next = %self.get_next_time(), "stepped");
        Ok(())
    }

    fn slow_path_reason(&self) -> Option<RebuildReason> {
        if self.config.rebuild_policy == RebuildPolicy::Always {
            Some(RebuildReason::Policy)
        } else if self.slots.force_resort() {
            Some(RebuildReason::ForceResort)
        } else if self.slots.has_pending() {
            Some(RebuildReason::Pending)
        } else {
            None
        }
    }

    fn rebuild(&mut self, reason: RebuildReason) {
        self.order.rebuild(self.slots.entries());
        self.slots.mark_clean();
        self.stats.full_rebuilds += 1;
        trace!(?reason, head = %self.order.head(), "order index rebuilt");
    }

    /// Resolve deferred entries against the head time.
    fn flush_pending(&mut self) {
        let now = self.slots.min_time();
        let flushed = self.slots.flush_pending(now);
        if flushed > 0 {
            self.stats.flushes += 1;
            debug!(%now, flushed, "deferred entries resolved");
            self.rebuild(RebuildReason::Flush);
        }
    }

    /// Dispatch the head's handler and return the dispatched device.
    ///
    /// The head entry keeps its time and kind; the handler must replace
    /// them (see [`ActionHandler`]).
    ///
    /// # Panics
    /// Panics before `start()`, if the head is parked, or if no handler is
    /// registered for the head's action kind.
    pub fn call_next(&mut self, model: &mut M) -> DeviceId {
        self.try_call_next(model).or_fatal()
    }

    pub fn try_call_next(&mut self, model: &mut M) -> QueueResult<DeviceId> {
        self.dispatch_head(model).map(|(device, _)| device)
    }

    /// Dispatch the head and report which device ran which action.
    pub(crate) fn dispatch_head(
        &mut self,
        model: &mut M,
    ) -> QueueResult<(DeviceId, ActionKind)> {
        if !self.started {
            return Err(QueueError::NotStarted);
        }
        let device = self.order.head();
        let entry = *self.slots.get(device)?;
        let kind = entry
            .action_kind
            .ok_or(QueueError::DispatchParked(device))?;
        let handler = self.registry.get_mut(kind, device)?;

        self.slots.clear_pending(device);
        trace!(%device, %kind, time = %entry.scheduled_time, "dispatch");

        let mut ctx = QueueContext {
            slots: &mut self.slots,
            now: entry.scheduled_time,
            device,
        };
        handler.call(model, &mut ctx, device);
        self.stats.dispatches += 1;
        Ok((device, kind))
    }

    // ── Introspection ─────────────────────────────────────────

    /// Scheduled time of the head; `NEVER` before `start()` or when
    /// every device is parked.
    pub fn get_next_time(&self) -> VirtualTime {
        if !self.started {
            return VirtualTime::NEVER;
        }
        self.slots.entries()[self.order.head().index()].scheduled_time
    }

    /// The device ranked first, once started.
    pub fn head(&self) -> Option<DeviceId> {
        self.started.then(|| self.order.head())
    }

    /// # Panics
    /// Panics if `device` is out of range.
    pub fn entry(&self, device: DeviceId) -> DeviceEventEntry {
        *self.slots.get(device).or_fatal()
    }

    pub fn entries(&self) -> &[DeviceEventEntry] {
        self.slots.entries()
    }

    /// Devices in dispatch order, head first. Only meaningful right after
    /// `start()` or `step()`.
    pub fn order(&self) -> &[DeviceId] {
        self.order.live()
    }

    pub fn n_devices(&self) -> usize {
        self.slots.len()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// `true` while at least one entry awaits deferred resolution.
    pub fn has_pending(&self) -> bool {
        self.slots.has_pending()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Release the queue, returning its final statistics.
    pub fn teardown(self) -> QueueStats {
        debug!(stats = ?self.stats, "function queue torn down");
        self.stats
    }
}

impl<M> std::fmt::Debug for FnQueue<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnQueue")
            .field("config", &self.config)
            .field("started", &self.started)
            .field("order", &self.order)
            .field("registry", &self.registry)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use tracing_test::traced_test;

    const K1: ActionKind = ActionKind::new(1);
    const K2: ActionKind = ActionKind::new(2);

    fn d(n: u32) -> DeviceId {
        DeviceId::new(n)
    }

    fn t(n: u64) -> VirtualTime {
        VirtualTime::new(n)
    }

    /// Log of dispatched devices; handlers park their device.
    fn parking_queue(n: usize) -> FnQueue<Vec<u32>> {
        let mut q = FnQueue::new(n);
        for kind in [K1, K2] {
            q.register(kind, |log: &mut Vec<u32>, ctx: &mut QueueContext<'_>, dev: DeviceId| {
                log.push(dev.raw());
                ctx.park();
            });
        }
        q
    }

    /// Handlers record the device and leave re-scheduling to the test.
    fn manual_queue(n: usize, config: QueueConfig) -> FnQueue<Vec<u32>> {
        let mut q = FnQueue::with_config(QueueConfig { n_devices: n, ..config });
        for kind in [K1, K2] {
            q.register(kind, |log: &mut Vec<u32>, _: &mut QueueContext<'_>, dev: DeviceId| {
                log.push(dev.raw());
            });
        }
        q
    }

    #[test]
    fn test_init_parks_every_device() {
        for n in 1..10 {
            let q: FnQueue = FnQueue::new(n);
            assert_eq!(q.n_devices(), n);
            for e in q.entries() {
                assert_eq!(e.scheduled_time(), VirtualTime::NEVER);
                assert_eq!(e.action_kind(), None);
            }
        }
    }

    #[test]
    fn test_get_next_time_before_start_is_never() {
        let mut q: FnQueue = FnQueue::new(2);
        q.add(t(3), K1, d(0));
        assert!(q.get_next_time().is_never());
        assert_eq!(q.head(), None);
    }

    #[test]
    fn test_scenario_reinsert_beats_later_devices() {
        let mut q = manual_queue(3, QueueConfig::new(3));
        q.add(t(10), K1, d(0));
        q.add(t(5), K2, d(1));
        q.add(t(10), K1, d(2));
        q.start();

        assert_eq!(q.get_next_time(), t(5));
        assert_eq!(q.head(), Some(d(1)));

        q.step(t(5));
        let mut log = Vec::new();
        assert_eq!(q.call_next(&mut log), d(1));
        assert_eq!(log, vec![1]);

        q.add(t(7), K1, d(1));
        q.step(t(5));
        assert_eq!(q.head(), Some(d(1)));
        assert_eq!(q.get_next_time(), t(7));
        assert_eq!(q.order(), &[d(1), d(0), d(2)]);
        assert_eq!(q.stats().full_rebuilds, 1);
    }

    #[test]
    fn test_equal_time_readd_forces_rebuild() {
        let mut q = manual_queue(2, QueueConfig::new(2));
        q.add(t(5), K1, d(0));
        q.add(t(5), K1, d(1));
        q.start();
        let rebuilds = q.stats().full_rebuilds;

        let mut log = Vec::new();
        q.call_next(&mut log);
        // Re-added at the time it already held: tie-break order may have
        // changed, so the cached order must not be trusted.
        q.add(t(5), K2, d(0));
        q.add(t(5), K1, d(0));
        q.step(t(5));

        assert_eq!(q.stats().full_rebuilds, rebuilds + 1);
        assert_eq!(q.stats().fast_advances, 0);
        assert_eq!(q.order(), &[d(0), d(1)]);

        let mut reference = OrderIndex::new(2).unwrap();
        reference.rebuild(q.entries());
        assert_eq!(q.order(), reference.live());
    }

    #[test]
    fn test_read_stability() {
        let mut q = parking_queue(3);
        q.add(t(8), K1, d(2));
        q.add(t(4), K2, d(0));
        q.start();
        assert_eq!(q.get_next_time(), q.get_next_time());
        assert_eq!(q.head(), q.head());
    }

    #[test]
    fn test_parking_dispatch_order() {
        let mut q = parking_queue(4);
        q.add(t(3), K1, d(3));
        q.add(t(3), K2, d(2));
        q.add(t(1), K1, d(1));
        q.add(t(3), K1, d(0));
        q.start();

        let mut log = Vec::new();
        while !q.get_next_time().is_never() {
            let now = q.get_next_time();
            q.call_next(&mut log);
            q.step(now);
        }
        assert_eq!(log, vec![1, 2, 0, 3]);
        assert!(q.stats().fast_advances >= 1);
    }

    #[test]
    fn test_deferred_resolves_to_committed_minimum() {
        let mut q = manual_queue(2, QueueConfig::new(2));
        q.add(t(20), K1, d(0));
        q.add(t(1), K1, d(1));
        q.start();

        // Device 0 defers from reference 20 to deadline 50; device 1
        // commits at 12.
        q.add_deferred(t(50), K1, d(0));
        assert!(q.has_pending());
        q.add(t(12), K2, d(1));
        q.step(t(1));

        let e = q.entry(d(0));
        assert_eq!(e.scheduled_time(), t(12));
        assert!(!e.is_pending());
        assert!(!q.has_pending());
        assert_eq!(q.stats().flushes, 1);
        // Same time: the higher kind of device 1 goes first.
        assert_eq!(q.order(), &[d(1), d(0)]);
    }

    #[test]
    fn test_deferred_waits_while_instant_unchanged() {
        let mut q = manual_queue(2, QueueConfig::new(2));
        q.add(t(7), K1, d(0));
        q.add(t(7), K1, d(1));
        q.start();

        let mut log = Vec::new();
        assert_eq!(q.call_next(&mut log), d(0));
        q.add_deferred(t(30), K1, d(0));
        q.step(t(7));

        // Device 1 still acts at 7, the instant of the deferral.
        assert!(q.entry(d(0)).is_pending());
        assert_eq!(q.head(), Some(d(1)));

        assert_eq!(q.call_next(&mut log), d(1));
        q.add(t(9), K1, d(1));
        q.step(t(7));

        assert!(!q.has_pending());
        assert_eq!(q.entry(d(0)).scheduled_time(), t(9));
        assert_eq!(q.head(), Some(d(0)));
    }

    #[test]
    fn test_deferred_alone_keeps_deadline() {
        let mut q = manual_queue(1, QueueConfig::new(1));
        q.add(t(2), K1, d(0));
        q.start();
        let mut log = Vec::new();
        q.call_next(&mut log);
        q.add_deferred(t(40), K1, d(0));
        q.step(t(2));
        assert_eq!(q.get_next_time(), t(40));
        assert!(!q.has_pending());
    }

    #[test]
    fn test_multiple_deferrals_resolve_together() {
        let mut q = manual_queue(3, QueueConfig::new(3));
        q.add(t(5), K1, d(0));
        q.add(t(5), K1, d(1));
        q.add(t(5), K1, d(2));
        q.start();

        q.add_deferred(t(100), K1, d(0));
        q.add_deferred(t(90), K2, d(1));
        q.add(t(15), K1, d(2));
        q.step(t(5));

        assert_eq!(q.entry(d(0)).scheduled_time(), t(15));
        assert_eq!(q.entry(d(1)).scheduled_time(), t(15));
        assert_eq!(q.order(), &[d(1), d(0), d(2)]);
    }

    #[test]
    fn test_deferrals_resolve_to_one_shared_time() {
        let mut q = manual_queue(3, QueueConfig::new(3));
        q.add(t(5), K1, d(0));
        q.start();

        let mut log = Vec::new();
        q.call_next(&mut log);
        q.add_deferred(t(30), K1, d(0));
        q.add_deferred(t(40), K1, d(1));
        q.add(t(100), K1, d(2));
        q.step(t(5));

        // Both take the earliest deadline, not their own.
        assert_eq!(q.entry(d(0)).scheduled_time(), t(30));
        assert_eq!(q.entry(d(1)).scheduled_time(), t(30));
        assert_eq!(q.entry(d(2)).scheduled_time(), t(100));
        assert!(!q.has_pending());
        assert_eq!(q.order(), &[d(0), d(1), d(2)]);
    }

    #[test]
    fn test_call_next_clears_pending() {
        let mut q = manual_queue(1, QueueConfig::new(1));
        q.add_deferred(t(3), K1, d(0));
        q.start();
        // Alone with nothing committed, the deadline holds.
        assert_eq!(q.get_next_time(), t(3));
        let mut log = Vec::new();
        q.call_next(&mut log);
        assert!(!q.has_pending());
    }

    #[test]
    fn test_fast_path_matches_full_rebuild() {
        // Distinct times, no deferrals: both policies must dispatch the
        // same devices at the same times.
        fn run(policy: RebuildPolicy, seed: u64) -> Vec<(u64, u32)> {
            let n = 16;
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut q = manual_queue(n, QueueConfig::new(n).with_policy(policy));
            let mut next_free = 0u64;
            let mut fresh = |rng: &mut ChaCha8Rng| {
                next_free += rng.gen_range(1..50);
                t(next_free)
            };
            let mut slots: Vec<u32> = (0..n as u32).collect();
            for i in (1..slots.len()).rev() {
                slots.swap(i, rng.gen_range(0..=i));
            }
            for dev in slots {
                let at = fresh(&mut rng);
                q.add(at, K1, d(dev));
            }
            q.start();

            let mut out = Vec::new();
            let mut log = Vec::new();
            for _ in 0..400 {
                let now = q.get_next_time();
                if now.is_never() {
                    break;
                }
                let dev = q.call_next(&mut log);
                out.push((now.ticks(), dev.raw()));
                match rng.gen_range(0..10) {
                    0 => q.remove(dev),
                    _ => {
                        let at = fresh(&mut rng);
                        let kind = if rng.gen_bool(0.5) { K1 } else { K2 };
                        q.add(at, kind, dev);
                    }
                }
                q.step(now);
            }
            out
        }

        for seed in [1, 7, 42, 1234] {
            assert_eq!(
                run(RebuildPolicy::Amortized, seed),
                run(RebuildPolicy::Always, seed)
            );
        }
    }

    #[test]
    fn test_random_adds_have_no_inversions() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let n = 64;
        let mut q: FnQueue = FnQueue::new(n);
        for dev in 0..n as u32 {
            if rng.gen_bool(0.1) {
                continue;
            }
            let kind = ActionKind::new(rng.gen_range(0..4));
            q.add(t(rng.gen_range(0..8)), kind, d(dev));
        }
        q.start();
        assert_eq!(q.order.inversions(q.entries()), 0);
        assert_eq!(q.order().len(), n);
    }

    #[test]
    fn test_untouched_head_is_dispatched_again() {
        let mut q = manual_queue(2, QueueConfig::new(2));
        q.add(t(1), K1, d(0));
        q.add(t(2), K1, d(1));
        q.start();
        let mut log = Vec::new();
        q.call_next(&mut log);
        q.step(t(1));
        q.call_next(&mut log);
        assert_eq!(log, vec![0, 0]);
    }

    #[test]
    fn test_try_errors() {
        let mut q: FnQueue = FnQueue::new(2);
        assert_eq!(q.try_call_next(&mut ()).unwrap_err(), QueueError::NotStarted);
        assert_eq!(q.try_step(t(0)).unwrap_err(), QueueError::NotStarted);
        assert_eq!(
            q.try_remove(d(2)).unwrap_err(),
            QueueError::DeviceOutOfRange {
                device: d(2),
                n_devices: 2
            }
        );
        q.start();
        assert_eq!(q.try_start().unwrap_err(), QueueError::AlreadyStarted);
        assert_eq!(
            q.try_call_next(&mut ()).unwrap_err(),
            QueueError::DispatchParked(d(0))
        );
        assert_eq!(
            q.try_register_handler(K1, |_: &mut (), _: &mut QueueContext<'_>, _: DeviceId| {})
                .unwrap_err(),
            QueueError::RegisterAfterStart(K1)
        );
    }

    #[test]
    fn test_unregistered_kind() {
        let mut q: FnQueue = FnQueue::new(1);
        q.add(t(1), K2, d(0));
        q.start();
        assert_eq!(
            q.try_call_next(&mut ()).unwrap_err(),
            QueueError::UnregisteredKind { kind: K2, device: d(0) }
        );
    }

    #[test]
    fn test_step_follows_earlier_reschedule() {
        let mut q = FnQueue::new(2);
        q.register(K1, |_: &mut (), ctx: &mut QueueContext<'_>, dev: DeviceId| {
            ctx.add(VirtualTime::new(3), K1, dev);
        });
        q.add(t(10), K1, d(0));
        q.add(t(20), K1, d(1));
        q.start();

        let now = q.get_next_time();
        q.call_next(&mut ());
        q.step(now);

        // Scheduled before the instant just consumed: still accepted.
        assert_eq!(q.get_next_time(), t(3));
        assert_eq!(q.try_step(q.get_next_time()), Ok(()));
        assert_eq!(q.head(), Some(d(0)));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_add_out_of_range_panics() {
        let mut q: FnQueue = FnQueue::new(1);
        q.add(t(1), K1, d(1));
    }

    #[test]
    #[should_panic(expected = "after the queue has started")]
    fn test_register_after_start_panics() {
        let mut q: FnQueue = FnQueue::new(1);
        q.start();
        q.register(K1, |_: &mut (), _: &mut QueueContext<'_>, _: DeviceId| {});
    }

    #[test]
    #[should_panic(expected = "at least one device")]
    fn test_zero_devices_panics() {
        let _q: FnQueue = FnQueue::new(0);
    }

    #[traced_test]
    #[test]
    fn test_rebuild_and_flush_are_logged() {
        let mut q = manual_queue(2, QueueConfig::new(2));
        q.add(t(4), K1, d(0));
        q.add(t(9), K1, d(1));
        q.start();
        q.call_next(&mut Vec::new());
        q.add_deferred(t(20), K1, d(0));
        q.step(t(4));

        assert_eq!(q.entry(d(0)).scheduled_time(), t(9));
        assert!(logs_contain("order index rebuilt"));
        assert!(logs_contain("deferred entries resolved"));
    }

    #[test]
    fn test_try_new_reports_zero_devices() {
        let err = FnQueue::<()>::try_new(0).err();
        assert_eq!(err, Some(QueueError::ZeroDevices));
    }

    #[test]
    fn test_teardown_returns_stats() {
        let mut q = parking_queue(2);
        q.add(t(1), K1, d(0));
        q.start();
        let now = q.get_next_time();
        q.call_next(&mut Vec::new());
        q.step(now);
        let stats = q.teardown();
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.steps, 1);
    }
}
