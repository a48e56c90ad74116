//! Subscriber registries.
//!
//! Dispatch iterates over a snapshot taken when it starts, so handlers may
//! register or remove handlers (themselves included) while being called.
//! Changes apply from the next dispatch on.

use beacon_core::Envelope;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Called for every inbound envelope.
pub type MessageHandler = dyn Fn(&Envelope) + Send + Sync;

/// Called with `true` on connect and `false` on disconnect.
pub type ConnectionHandler = dyn Fn(bool) + Send + Sync;

/// Token returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub(crate) struct Registry<H: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(HandlerId, Arc<H>)>>,
}

impl<H: ?Sized> Registry<H> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn insert(&self, handler: Arc<H>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Returns false if `id` was not registered.
    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    /// Handlers in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<H>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Registry<MessageHandler> {
    pub(crate) fn dispatch(&self, envelope: &Envelope) {
        for handler in self.snapshot() {
            isolate("message", || handler(envelope));
        }
    }
}

impl Registry<ConnectionHandler> {
    pub(crate) fn dispatch(&self, connected: bool) {
        for handler in self.snapshot() {
            isolate("connection", || handler(connected));
        }
    }
}

/// Run a handler, containing any panic it raises.
fn isolate(kind: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        tracing::warn!(
            handler = kind,
            panic = panic_message(payload.as_ref()),
            "handler panicked; continuing dispatch"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}
