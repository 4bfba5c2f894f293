//! Listener registry for received documents.
//!
//! Every document the I/O loop completes is offered to each registered
//! listener in registration order. Dispatch works on a snapshot of the
//! registry, so listeners may add or remove listeners (themselves
//! included) from inside a callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use netconf_protocol::Element;
use tracing::trace;

use crate::error::{NetconfError, NetconfResult};

/// Receives documents and errors from a session.
pub trait SessionListener: Send + Sync {
    /// Called for every received document.
    ///
    /// An error ends the session: it is broadcast to all listeners through
    /// [`SessionListener::errback`] and the session closes.
    fn callback(&self, root: &Element, raw: &str) -> NetconfResult<()>;

    /// Called once with the error that ended the session.
    fn errback(&self, error: &NetconfError);
}

/// Handle returned by [`ListenerRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Result of offering one document to every listener.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Delivered,
    ListenerFailed { cause: NetconfError },
}

type Entry = (ListenerId, Arc<dyn SessionListener>);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Entry>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Removes a listener, returning false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(entry, _)| *entry != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn SessionListener>> {
        self.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offers a document to every listener registered at call time.
    ///
    /// Stops at the first failing listener.
    pub fn dispatch(&self, root: &Element, raw: &str) -> DispatchOutcome {
        let listeners = self.snapshot();
        trace!(listeners = listeners.len(), root = %root.name(), "dispatching");
        for listener in listeners {
            if let Err(cause) = listener.callback(root, raw) {
                return DispatchOutcome::ListenerFailed { cause };
            }
        }
        DispatchOutcome::Delivered
    }

    /// Delivers a fatal error to every listener.
    pub fn broadcast_error(&self, error: &NetconfError) {
        for listener in self.snapshot() {
            listener.errback(error);
        }
    }
}
