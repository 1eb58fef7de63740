use crate::error::SessionError;
use crate::types::GazeEvent;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Application-side subscriber for a session's events.
///
/// Callbacks run on the session's event loop thread, one event at a time.
pub trait GazeListener: Send + Sync {
    fn on_gaze_event(&self, event: &GazeEvent);

    /// Called when the event loop terminates with an error.
    fn on_session_error(&self, error: &SessionError);
}

/// Ordered, thread-safe set of listeners.
///
/// Listeners are compared by `Arc` identity. Dispatch holds the registry lock
/// for the whole iteration, so a listener must not call [`add`](Self::add) or
/// [`remove`](Self::remove) on the same registry from inside a callback.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn GazeListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn GazeListener>) {
        self.lock().push(listener);
    }

    /// Remove the first entry matching `listener`. No-op if absent.
    pub fn remove(&self, listener: &Arc<dyn GazeListener>) {
        let mut listeners = self.lock();
        if let Some(index) = listeners.iter().position(|l| same_listener(l, listener)) {
            listeners.remove(index);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn dispatch_gaze(&self, event: &GazeEvent) {
        self.for_each("on_gaze_event", |l| l.on_gaze_event(event));
    }

    pub fn dispatch_error(&self, error: &SessionError) {
        let delivered = self.for_each("on_session_error", |l| l.on_session_error(error));
        if delivered == 0 {
            log::debug!("No listeners registered, dropping session error: {}", error);
        }
    }

    /// Invoke `f` on every listener in registration order. A panicking listener
    /// is logged and skipped. Returns the number of listeners visited.
    fn for_each(&self, what: &str, f: impl Fn(&dyn GazeListener)) -> usize {
        let listeners = self.lock();
        for (index, listener) in listeners.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(listener.as_ref())));
            if let Err(payload) = result {
                log::error!(
                    "Listener #{} panicked in {}: {}",
                    index,
                    what,
                    panic_message(payload.as_ref())
                );
            }
        }
        listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn GazeListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_listener(a: &Arc<dyn GazeListener>, b: &Arc<dyn GazeListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
