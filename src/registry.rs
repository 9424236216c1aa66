//! Callback Registry: which handler runs for which action kind.
//!
//! Filled before the queue starts and frozen afterwards. Handlers receive
//! the device model by explicit reference together with a
//! [`QueueContext`] through which the dispatched device re-schedules
//! itself.

use std::collections::BTreeMap;
use std::fmt;

use crate::device::{ActionKind, DeviceId};
use crate::error::{QueueError, QueueResult};
use crate::queue::QueueContext;

/// A dispatchable action.
///
/// Implemented for every `FnMut(&mut M, &mut QueueContext, DeviceId)`
/// closure, so most callers never implement it by hand.
///
/// # Contract
///
/// Before returning, the handler must call `add`, `add_deferred` or
/// `remove` for the device it was dispatched for. An untouched entry
/// keeps its old time and kind and is dispatched again on the next tick.
pub trait ActionHandler<M> {
    fn call(&mut self, model: &mut M, ctx: &mut QueueContext<'_>, device: DeviceId);
}

impl<M, F> ActionHandler<M> for F
where
    F: FnMut(&mut M, &mut QueueContext<'_>, DeviceId),
{
    fn call(&mut self, model: &mut M, ctx: &mut QueueContext<'_>, device: DeviceId) {
        (self)(model, ctx, device);
    }
}

pub(crate) struct CallbackRegistry<M> {
    handlers: BTreeMap<ActionKind, Box<dyn ActionHandler<M>>>,
    frozen: bool,
}

impl<M> CallbackRegistry<M> {
    pub(crate) fn new() -> Self {
        CallbackRegistry {
            handlers: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Bind `handler` to `kind`. Each kind is bound exactly once.
    pub(crate) fn insert(
        &mut self,
        kind: ActionKind,
        handler: Box<dyn ActionHandler<M>>,
    ) -> QueueResult<()> {
        if self.frozen {
            return Err(QueueError::RegisterAfterStart(kind));
        }
        if self.handlers.contains_key(&kind) {
            return Err(QueueError::DuplicateRegistration(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Reject any further registration.
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn contains(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub(crate) fn get_mut(
        &mut self,
        kind: ActionKind,
        device: DeviceId,
    ) -> QueueResult<&mut (dyn ActionHandler<M> + 'static)> {
        match self.handlers.get_mut(&kind) {
            Some(h) => Ok(h.as_mut()),
            None => Err(QueueError::UnregisteredKind { kind, device }),
        }
    }

    pub(crate) fn kinds(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.handlers.keys().copied()
    }
}

impl<M> fmt::Debug for CallbackRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .field("frozen", &self.frozen)
            .finish()
    }
}
