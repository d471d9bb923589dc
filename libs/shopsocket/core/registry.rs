//! Subscriber registry
//!
//! Handlers are kept in registration order. Registering the same
//! `Arc<dyn MessageHandler>` twice keeps a single entry.

use crate::core::message::InboundMessage;
use crate::traits::MessageHandler;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, trace};

type HandlerId = u64;

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    entries: RwLock<Vec<(HandlerId, Arc<dyn MessageHandler>)>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning its id
    ///
    /// A handler already present (same allocation) keeps its original
    /// position and id.
    pub(crate) fn insert(&self, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let mut entries = self.entries.write();

        if let Some((id, _)) = entries
            .iter()
            .find(|(_, existing)| same_handler(existing, &handler))
        {
            trace!("Handler already registered as #{}", id);
            return *id;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Deliver a message to every handler, in registration order
    ///
    /// Works on a snapshot, so handlers may subscribe or unsubscribe while
    /// being invoked; changes apply from the next message on. Returns the
    /// failures as `(handler id, description)` pairs.
    pub(crate) fn dispatch(&self, message: &InboundMessage) -> Vec<(HandlerId, String)> {
        let snapshot: Vec<(HandlerId, Arc<dyn MessageHandler>)> = self.entries.read().clone();
        let mut failures = Vec::new();

        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Handler #{} failed on '{}' message: {}", id, message.kind, e);
                    failures.push((id, e.to_string()));
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!("Handler #{} panicked on '{}' message: {}", id, message.kind, reason);
                    failures.push((id, format!("panicked: {}", reason)));
                }
            }
        }

        failures
    }
}

fn same_handler(a: &Arc<dyn MessageHandler>, b: &Arc<dyn MessageHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle returned by `on_message` / `subscribe`
///
/// Dropping it leaves the handler registered; call [`Subscription::unsubscribe`]
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: HandlerId,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: HandlerId, registry: &Arc<HandlerRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Remove exactly this subscriber
    ///
    /// Returns `false` if it was already gone (or the manager was dropped).
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.remove(self.id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
