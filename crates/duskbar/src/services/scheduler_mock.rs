//! Manual-clock [`Scheduler`] for tests, plus helpers for the few tests that
//! need a real GLib main context.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::scheduler::{ControlFlow, PollHandle, Scheduler};

enum TaskKind {
    Once(Box<dyn FnOnce()>),
    Every {
        interval: Duration,
        task: Box<dyn FnMut() -> ControlFlow>,
    },
}

struct Entry {
    id: u64,
    kind: TaskKind,
}

#[derive(Default)]
struct VirtualState {
    now: Duration,
    next_id: u64,
    next_seq: u64,
    /// Keyed by (due time, registration sequence) so ties fire in order.
    queue: BTreeMap<(Duration, u64), Entry>,
    live: HashSet<u64>,
}

impl VirtualState {
    fn push(&mut self, due: Duration, entry: Entry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((due, seq), entry);
    }
}

/// Deterministic scheduler driven by [`VirtualScheduler::advance`].
///
/// Tasks may schedule or cancel other tasks (or themselves) while running.
#[derive(Default)]
pub struct VirtualScheduler {
    state: RefCell<VirtualState>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of tasks still scheduled.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Move the clock forward, running every task that falls due on the way
    /// in time order.
    pub fn advance(&self, by: Duration) {
        let target = self.state.borrow().now + by;

        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                match state.queue.first_key_value() {
                    Some((&(due, _), _)) if due <= target => state.queue.pop_first(),
                    _ => None,
                }
            };
            let Some(((due, _), entry)) = next else {
                break;
            };
            self.state.borrow_mut().now = due;

            match entry.kind {
                TaskKind::Once(task) => {
                    self.state.borrow_mut().live.remove(&entry.id);
                    task();
                }
                TaskKind::Every { interval, mut task } => {
                    let flow = task();
                    let mut state = self.state.borrow_mut();
                    let keep = matches!(flow, ControlFlow::Continue) && state.live.contains(&entry.id);
                    if keep {
                        let due = state.now + interval;
                        state.push(
                            due,
                            Entry {
                                id: entry.id,
                                kind: TaskKind::Every { interval, task },
                            },
                        );
                    } else {
                        state.live.remove(&entry.id);
                    }
                }
            }
        }

        self.state.borrow_mut().now = target;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    fn schedule(&self, due_in: Duration, kind: TaskKind) -> PollHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.live.insert(id);
        let due = state.now + due_in;
        state.push(due, Entry { id, kind });
        PollHandle(id)
    }
}

impl Scheduler for VirtualScheduler {
    fn every(&self, interval: Duration, task: Box<dyn FnMut() -> ControlFlow>) -> PollHandle {
        // A zero period would spin forever inside `advance`.
        let interval = interval.max(Duration::from_millis(1));
        self.schedule(interval, TaskKind::Every { interval, task })
    }

    fn after(&self, delay: Duration, task: Box<dyn FnOnce()>) -> PollHandle {
        self.schedule(delay, TaskKind::Once(task))
    }

    fn cancel(&self, handle: PollHandle) {
        let mut state = self.state.borrow_mut();
        if state.live.remove(&handle.0) {
            state.queue.retain(|_, entry| entry.id != handle.0);
        }
    }

    fn is_active(&self, handle: PollHandle) -> bool {
        self.state.borrow().live.contains(&handle.0)
    }
}

/// Tests run on parallel threads, but the default main context can only be
/// owned by one of them at a time.
static GLIB_CONTEXT: Mutex<()> = Mutex::new(());

/// Run `f` while this thread owns the default GLib main context.
pub fn with_main_context<R>(f: impl FnOnce(&glib::MainContext) -> R) -> R {
    let _lock = GLIB_CONTEXT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let context = glib::MainContext::default();
    let _guard = context
        .acquire()
        .expect("default main context is owned elsewhere");
    f(&context)
}

/// Iterate `context` until `done` holds or `timeout` passes. Returns the last
/// value of `done`.
pub fn iterate_until(
    context: &glib::MainContext,
    timeout: Duration,
    mut done: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        while context.iteration(false) {}
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let make = move |tag: &str| -> Box<dyn FnOnce()> {
            let l = l.clone();
            let tag = tag.to_string();
            Box::new(move || l.borrow_mut().push(tag))
        };
        (log, make)
    }

    #[test]
    fn test_after_fires_once_at_due_time() {
        let sched = VirtualScheduler::new();
        let (log, make) = recorder();
        let handle = sched.after(Duration::from_millis(500), make("a"));

        sched.advance_ms(499);
        assert!(log.borrow().is_empty());
        assert!(sched.is_active(handle));

        sched.advance_ms(1);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(!sched.is_active(handle));

        sched.advance_ms(10_000);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_callbacks_fire_in_time_order_with_stable_ties() {
        let sched = VirtualScheduler::new();
        let (log, make) = recorder();
        sched.after(Duration::from_millis(2000), make("late"));
        sched.after(Duration::from_millis(500), make("tie-1"));
        sched.after(Duration::from_millis(1000), make("mid"));
        sched.after(Duration::from_millis(500), make("tie-2"));

        sched.advance_ms(5000);
        assert_eq!(*log.borrow(), vec!["tie-1", "tie-2", "mid", "late"]);
    }

    #[test]
    fn test_every_repeats_until_break() {
        let sched = VirtualScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let handle = sched.every(
            Duration::from_secs(5),
            Box::new(move || {
                c.set(c.get() + 1);
                if c.get() == 3 {
                    ControlFlow::Break
                } else {
                    ControlFlow::Continue
                }
            }),
        );

        sched.advance(Duration::from_secs(14));
        assert_eq!(count.get(), 2);
        sched.advance(Duration::from_secs(60));
        assert_eq!(count.get(), 3);
        assert!(!sched.is_active(handle));
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let sched = VirtualScheduler::new();
        let (log, make) = recorder();
        let fired = sched.after(Duration::from_millis(10), make("fired"));
        let cancelled = sched.after(Duration::from_millis(20), make("cancelled"));

        sched.advance_ms(15);
        sched.cancel(cancelled);
        sched.cancel(cancelled);
        sched.cancel(fired);
        sched.advance_ms(100);

        assert_eq!(*log.borrow(), vec!["fired"]);
    }

    #[test]
    fn test_task_can_cancel_itself_while_running() {
        let sched = Rc::new(VirtualScheduler::new());
        let handle_slot: Rc<Cell<Option<PollHandle>>> = Rc::new(Cell::new(None));
        let runs = Rc::new(Cell::new(0));

        let s = sched.clone();
        let slot = handle_slot.clone();
        let r = runs.clone();
        let handle = sched.every(
            Duration::from_secs(1),
            Box::new(move || {
                r.set(r.get() + 1);
                if let Some(h) = slot.get() {
                    s.cancel(h);
                }
                ControlFlow::Continue
            }),
        );
        handle_slot.set(Some(handle));

        sched.advance(Duration::from_secs(10));
        assert_eq!(runs.get(), 1);
        assert!(!sched.is_active(handle));
    }

    #[test]
    fn test_task_scheduled_from_task_runs_in_same_advance() {
        let sched = Rc::new(VirtualScheduler::new());
        let (log, make) = recorder();
        let make = Rc::new(make);

        let s = sched.clone();
        let m = make.clone();
        sched.after(
            Duration::from_millis(100),
            Box::new(move || {
                s.after(Duration::from_millis(100), m("nested"));
            }),
        );

        sched.advance_ms(150);
        assert!(log.borrow().is_empty());
        sched.advance_ms(50);
        assert_eq!(*log.borrow(), vec!["nested"]);
        assert_eq!(sched.now(), Duration::from_millis(200));
    }
}
