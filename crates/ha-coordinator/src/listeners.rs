//! Update listeners: the observer list a coordinator notifies after refresh
//!
//! Each registration lives in its own slot. A notification pass walks a
//! copy of the slot list and invokes each callback while holding that
//! slot's lock, so removal either waits for the running call or prevents the
//! next one. After `remove` returns the callback is never invoked again.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, trace};

/// A no-argument callback invoked after every refresh completion
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handle returned by [`Listeners::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Slot {
    id: ListenerId,
    callback: Mutex<Option<UpdateCallback>>,
}

/// Observer list owned by one coordinator
///
/// No ordering is guaranteed between listeners. Passes are serialized, and
/// a listener added during a pass is first called on the next one.
///
/// A callback must not remove itself (or run another pass) from inside its
/// own invocation: removal waits for that invocation to finish.
pub struct Listeners {
    slots: Mutex<Vec<Arc<Slot>>>,
    pass: Mutex<()>,
    next_id: AtomicU64,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            pass: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(Slot {
            id,
            callback: Mutex::new(Some(Arc::new(callback))),
        });
        self.slots.lock().push(slot);
        trace!(listener = id.0, "Added update listener");
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let slot = {
            let mut slots = self.slots.lock();
            match slots.iter().position(|s| s.id == id) {
                Some(pos) => slots.remove(pos),
                None => return false,
            }
        };

        // Blocks until an invocation already underway has returned
        slot.callback.lock().take();
        trace!(listener = id.0, "Removed update listener");
        true
    }

    /// Invoke every registered listener once; returns how many ran
    ///
    /// A panicking listener is logged and does not stop the pass.
    pub fn notify(&self) -> usize {
        let _pass = self.pass.lock();
        let slots: Vec<Arc<Slot>> = self.slots.lock().clone();

        let mut called = 0;
        for slot in slots {
            let callback = slot.callback.lock();
            if let Some(callback) = callback.as_ref() {
                if catch_unwind(AssertUnwindSafe(|| (**callback)())).is_err() {
                    error!(listener = slot.id.0, "Update listener panicked");
                }
                called += 1;
            }
        }
        called
    }

    /// Remove every listener
    pub fn clear(&self) {
        let slots = std::mem::take(&mut *self.slots.lock());
        for slot in slots {
            slot.callback.lock().take();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}
