//! Snapshot subscriptions shared by every manager.
//!
//! Managers own their state and publish a cloned snapshot whenever it changes.
//! Whatever renders the bar subscribes here instead of being poked directly
//! from business logic.
//!
//! ```rust,ignore
//! let id = wifi.connect(|snapshot: &WifiSnapshot| render(snapshot));
//! // later
//! wifi.disconnect(id);
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by [`Callbacks::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

impl CallbackId {
    fn next() -> Self {
        Self(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Subscriber<T> {
    id: CallbackId,
    callback: Rc<dyn Fn(&T)>,
}

/// Registry of listeners for one snapshot type.
pub struct Callbacks<T> {
    subscribers: RefCell<Vec<Subscriber<T>>>,
}

impl<T> Callbacks<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Add a listener. It is not invoked until the next `notify`.
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&T) + 'static,
    {
        let id = CallbackId::next();
        self.subscribers.borrow_mut().push(Subscriber {
            id,
            callback: Rc::new(callback),
        });
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() < before
    }

    /// Deliver `snapshot` to every listener in registration order.
    ///
    /// The list is copied first so a listener may call back into the manager
    /// (or register/unregister) without a `RefCell` double borrow.
    pub fn notify(&self, snapshot: &T) {
        let callbacks: Vec<Rc<dyn Fn(&T)>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|s| s.callback.clone())
            .collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }

    /// Deliver `snapshot` to a single listener, typically one that was just
    /// registered and needs the current state.
    pub fn notify_single(&self, id: CallbackId, snapshot: &T) -> bool {
        let callback = self
            .subscribers
            .borrow()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.callback.clone());

        match callback {
            Some(cb) => {
                cb(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}
