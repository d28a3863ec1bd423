//! Deferred calls against lightweight instances
//!
//! A registration holds a strong reference to its target so the instance
//! cannot be reclaimed mid-wait; the reference drops when the callout
//! fires or is cancelled. Time is the driver's logical tick counter;
//! firing happens synchronously inside `Context::advance`.

use crate::hooks::HookFn;
use crate::instance::LwoRef;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle identifying a deferred-call registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalloutId(u64);

/// What to run when a callout fires
#[derive(Clone)]
pub enum CalloutJob {
    /// Dispatch a method by name on the target instance
    Method(Arc<str>),
    /// Run a closure with the target instance and the stored arguments
    Closure(HookFn),
}

impl CalloutJob {
    /// Job that dispatches a method by name
    pub fn method(name: impl Into<Arc<str>>) -> Self {
        CalloutJob::Method(name.into())
    }

    /// Job that runs a closure
    pub fn closure(
        f: impl Fn(&crate::context::Context, &LwoRef, &[Value]) -> crate::error::LwResult<()>
            + 'static,
    ) -> Self {
        let f: HookFn = Arc::new(f);
        CalloutJob::Closure(f)
    }
}

pub(crate) struct Callout {
    pub id: CalloutId,
    pub target: LwoRef,
    pub job: CalloutJob,
    pub due: u64,
    pub args: Vec<Value>,
}

/// Read-only view of a pending registration
#[derive(Clone)]
pub struct CalloutInfo {
    /// Registration handle
    pub id: CalloutId,
    /// Target instance (held strongly by the queue)
    pub target: LwoRef,
    /// Ticks remaining until it fires
    pub remaining: u64,
    /// Method name, if the job is a named dispatch
    pub method: Option<Arc<str>>,
}

/// Pending deferred calls, ordered by due tick when drained
pub(crate) struct CalloutQueue {
    pending: Mutex<Vec<Callout>>,
    next_id: AtomicU64,
    clock: AtomicU64,
}

impl CalloutQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            clock: AtomicU64::new(0),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    pub fn schedule(
        &self,
        target: LwoRef,
        delay: u64,
        job: CalloutJob,
        args: Vec<Value>,
    ) -> CalloutId {
        let id = CalloutId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let due = self.now().saturating_add(delay);
        self.pending.lock().push(Callout {
            id,
            target,
            job,
            due,
            args,
        });
        id
    }

    /// Remove a registration; the held reference drops immediately
    pub fn cancel(&self, id: CalloutId) -> bool {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|c| c.id != id);
        pending.len() != before
    }

    /// Remove every registration targeting `lwo` (construction unwind)
    pub fn cancel_for(&self, lwo: &LwoRef) {
        self.pending.lock().retain(|c| !Arc::ptr_eq(&c.target, lwo));
    }

    /// Ticks remaining for a registration, if still pending
    pub fn remaining(&self, id: CalloutId) -> Option<u64> {
        let now = self.now();
        self.pending
            .lock()
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.due.saturating_sub(now))
    }

    pub fn info(&self) -> Vec<CalloutInfo> {
        let now = self.now();
        self.pending
            .lock()
            .iter()
            .map(|c| CalloutInfo {
                id: c.id,
                target: c.target.clone(),
                remaining: c.due.saturating_sub(now),
                method: match &c.job {
                    CalloutJob::Method(name) => Some(name.clone()),
                    CalloutJob::Closure(_) => None,
                },
            })
            .collect()
    }

    /// Advance the clock and drain everything now due, earliest first
    ///
    /// The queue lock is released before the caller fires anything, so a
    /// firing callout may schedule new registrations.
    pub fn take_due(&self, ticks: u64) -> Vec<Callout> {
        let now = self.clock.fetch_add(ticks, Ordering::Relaxed) + ticks;
        let mut pending = self.pending.lock();
        let mut due: Vec<Callout> = Vec::new();
        let mut i = 0;
        while i < pending.len() {
            if pending[i].due <= now {
                due.push(pending.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|c| c.due);
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Accounting;
    use crate::instance::Lwo;
    use crate::program::ProgramBuilder;

    fn target() -> LwoRef {
        let program = ProgramBuilder::new("/lwo/noop").build();
        Lwo::new(program, Arc::from("lwuid"), Arc::new(Accounting::new()))
    }

    #[test]
    fn test_schedule_and_cancel() {
        let queue = CalloutQueue::new();
        let id = queue.schedule(target(), 5, CalloutJob::method("tick"), vec![]);
        assert_eq!(queue.remaining(id), Some(5));
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert_eq!(queue.remaining(id), None);
    }

    #[test]
    fn test_take_due_respects_delay() {
        let queue = CalloutQueue::new();
        let early = queue.schedule(target(), 1, CalloutJob::method("tick"), vec![]);
        let late = queue.schedule(target(), 10, CalloutJob::method("tick"), vec![]);

        let due = queue.take_due(2);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early);
        assert_eq!(queue.remaining(late), Some(8));
    }

    #[test]
    fn test_holds_strong_reference() {
        let queue = CalloutQueue::new();
        let lwo = target();
        let weak = Arc::downgrade(&lwo);
        let id = queue.schedule(lwo.clone(), 3, CalloutJob::method("tick"), vec![]);
        drop(lwo);
        assert!(weak.upgrade().is_some());
        queue.cancel(id);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_cancel_for_target() {
        let queue = CalloutQueue::new();
        let a = target();
        let b = target();
        queue.schedule(a.clone(), 1, CalloutJob::method("tick"), vec![]);
        queue.schedule(a.clone(), 2, CalloutJob::method("tock"), vec![]);
        queue.schedule(b.clone(), 3, CalloutJob::method("tick"), vec![]);
        queue.cancel_for(&a);
        let info = queue.info();
        assert_eq!(info.len(), 1);
        assert!(Arc::ptr_eq(&info[0].target, &b));
    }
}
