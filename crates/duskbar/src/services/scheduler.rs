//! Timer primitives: the only source of interleaving in the bar.
//!
//! Everything runs on one GLib main loop. A task scheduled here never runs
//! concurrently with another task, so managers keep their state in plain
//! `Cell`/`RefCell` without locks.
//!
//! - [`Scheduler::every`] repeats until the task returns `ControlFlow::Break`
//!   or the handle is cancelled.
//! - [`Scheduler::after`] fires once.
//! - [`Scheduler::cancel`] is idempotent: cancelling a fired or already
//!   cancelled task does nothing.
//!
//! [`GlibScheduler`] backs the running bar. Tests drive the same tasks with a
//! manual clock (`scheduler_mock::VirtualScheduler`).
//! [`PollUntil`] is the bounded retry loop used wherever the bar waits for an
//! external side effect to show up.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

pub use glib::ControlFlow;
use tracing::trace;

/// Token for a scheduled task. Whoever scheduled it owns cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollHandle(pub(crate) u64);

/// Periodic/one-shot task registration.
pub trait Scheduler {
    fn every(&self, interval: Duration, task: Box<dyn FnMut() -> ControlFlow>) -> PollHandle;
    fn after(&self, delay: Duration, task: Box<dyn FnOnce()>) -> PollHandle;
    fn cancel(&self, handle: PollHandle);
    /// Whether the task is still scheduled (not fired, stopped, or cancelled).
    fn is_active(&self, handle: PollHandle) -> bool;
}

// GLib main loop

struct GlibInner {
    next_id: Cell<u64>,
    sources: RefCell<HashMap<u64, glib::SourceId>>,
}

impl GlibInner {
    fn forget(weak: &Weak<GlibInner>, id: u64) {
        if let Some(inner) = weak.upgrade() {
            inner.sources.borrow_mut().remove(&id);
        }
    }
}

/// Scheduler backed by `glib::timeout_add_local`.
///
/// Source ids are tracked per handle and dropped as soon as the source ends,
/// so a late `cancel` never calls `SourceId::remove` on a dead source.
pub struct GlibScheduler {
    inner: Rc<GlibInner>,
}

impl GlibScheduler {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(GlibInner {
                next_id: Cell::new(1),
                sources: RefCell::new(HashMap::new()),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        id
    }
}

impl Default for GlibScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for GlibScheduler {
    fn every(&self, interval: Duration, mut task: Box<dyn FnMut() -> ControlFlow>) -> PollHandle {
        let id = self.next_id();
        let weak = Rc::downgrade(&self.inner);
        let source = glib::timeout_add_local(interval, move || {
            let flow = task();
            if matches!(flow, ControlFlow::Break) {
                GlibInner::forget(&weak, id);
            }
            flow
        });
        self.inner.sources.borrow_mut().insert(id, source);
        PollHandle(id)
    }

    fn after(&self, delay: Duration, task: Box<dyn FnOnce()>) -> PollHandle {
        let id = self.next_id();
        let weak = Rc::downgrade(&self.inner);
        let source = glib::timeout_add_local_once(delay, move || {
            GlibInner::forget(&weak, id);
            task();
        });
        self.inner.sources.borrow_mut().insert(id, source);
        PollHandle(id)
    }

    fn cancel(&self, handle: PollHandle) {
        let source = self.inner.sources.borrow_mut().remove(&handle.0);
        if let Some(source) = source {
            trace!("GlibScheduler: cancel {:?}", handle);
            source.remove();
        }
    }

    fn is_active(&self, handle: PollHandle) -> bool {
        self.inner.sources.borrow().contains_key(&handle.0)
    }
}

// Poll-until

/// How a [`PollUntil`] loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate held on this attempt.
    Succeeded { attempts: u32 },
    /// The predicate never held within the attempt budget.
    Exhausted { attempts: u32 },
}

/// Bounded retry: check a predicate every `interval`, at most `max_attempts`
/// times. The first check runs one interval after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollUntil {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollUntil {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Start polling. `on_done` runs exactly once unless the returned handle
    /// is cancelled first.
    pub fn start<P, D>(&self, scheduler: &dyn Scheduler, mut check: P, on_done: D) -> PollHandle
    where
        P: FnMut() -> bool + 'static,
        D: FnOnce(PollOutcome) + 'static,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;
        let mut on_done = Some(on_done);

        scheduler.every(
            self.interval,
            Box::new(move || {
                attempts += 1;
                let outcome = if check() {
                    PollOutcome::Succeeded { attempts }
                } else if attempts >= max_attempts {
                    PollOutcome::Exhausted { attempts }
                } else {
                    return ControlFlow::Continue;
                };
                if let Some(done) = on_done.take() {
                    done(outcome);
                }
                ControlFlow::Break
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scheduler_mock::{VirtualScheduler, iterate_until, with_main_context};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_glib_every_stops_on_break() {
        with_main_context(|context| {
            let sched = GlibScheduler::new();
            let ticks = Rc::new(Cell::new(0));
            let t = ticks.clone();
            let handle = sched.every(
                Duration::from_millis(5),
                Box::new(move || {
                    t.set(t.get() + 1);
                    if t.get() == 3 {
                        ControlFlow::Break
                    } else {
                        ControlFlow::Continue
                    }
                }),
            );
            assert!(sched.is_active(handle));

            assert!(iterate_until(context, WAIT, || ticks.get() == 3));
            assert!(!sched.is_active(handle));

            // Cancelling a source that already ended must not touch GLib.
            sched.cancel(handle);
            iterate_until(context, Duration::from_millis(30), || false);
            assert_eq!(ticks.get(), 3);
        });
    }

    #[test]
    fn test_glib_after_fires_once_and_cancel_is_idempotent() {
        with_main_context(|context| {
            let sched = GlibScheduler::new();
            let fired = Rc::new(Cell::new(0));
            let skipped = Rc::new(Cell::new(false));

            let f = fired.clone();
            let once = sched.after(Duration::from_millis(5), Box::new(move || f.set(f.get() + 1)));
            let s = skipped.clone();
            let cancelled = sched.after(Duration::from_millis(10), Box::new(move || s.set(true)));
            sched.cancel(cancelled);
            sched.cancel(cancelled);
            assert!(!sched.is_active(cancelled));

            assert!(iterate_until(context, WAIT, || fired.get() == 1));
            assert!(!sched.is_active(once));
            sched.cancel(once);

            iterate_until(context, Duration::from_millis(40), || false);
            assert_eq!(fired.get(), 1);
            assert!(!skipped.get());
        });
    }

    #[test]
    fn test_poll_until_succeeds_on_first_true() {
        let sched = VirtualScheduler::new();
        let checks = Rc::new(Cell::new(0));
        let outcome = Rc::new(Cell::new(None));

        let c = checks.clone();
        let o = outcome.clone();
        PollUntil::new(Duration::from_secs(2), 5).start(
            &sched,
            move || {
                c.set(c.get() + 1);
                c.get() == 3
            },
            move |result| o.set(Some(result)),
        );

        sched.advance(Duration::from_secs(5));
        assert_eq!(outcome.get(), None);
        sched.advance(Duration::from_secs(1));
        assert_eq!(outcome.get(), Some(PollOutcome::Succeeded { attempts: 3 }));

        sched.advance(Duration::from_secs(30));
        assert_eq!(checks.get(), 3);
    }

    #[test]
    fn test_poll_until_exhausts_after_max_attempts() {
        let sched = VirtualScheduler::new();
        let checks = Rc::new(Cell::new(0));
        let outcome = Rc::new(Cell::new(None));

        let c = checks.clone();
        let o = outcome.clone();
        let handle = PollUntil::new(Duration::from_secs(2), 5).start(
            &sched,
            move || {
                c.set(c.get() + 1);
                false
            },
            move |result| o.set(Some(result)),
        );

        sched.advance(Duration::from_secs(10));
        assert_eq!(outcome.get(), Some(PollOutcome::Exhausted { attempts: 5 }));
        assert_eq!(checks.get(), 5);
        assert!(!sched.is_active(handle));
    }

    #[test]
    fn test_poll_until_cancel_skips_completion() {
        let sched = VirtualScheduler::new();
        let outcome = Rc::new(Cell::new(None));
        let o = outcome.clone();
        let handle = PollUntil::new(Duration::from_secs(2), 5).start(
            &sched,
            || false,
            move |result| o.set(Some(result)),
        );

        sched.advance(Duration::from_secs(3));
        sched.cancel(handle);
        sched.advance(Duration::from_secs(30));
        assert_eq!(outcome.get(), None);
    }
}
