//! Callback registry for named remote signals.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`SignalRegistry`] - Stores callbacks by signal name and dispatches to all of them
//!
//! Every callback registered for a name receives every emission of that name.
//! Nothing is buffered: a signal emitted while no callback is registered is
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::transport::Value;

/// Unique identifier for a subscription.
///
/// IDs are unique within a registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Type alias for signal callbacks. Receives the signal payload.
pub type SignalCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

struct Entry {
    name: String,
    callback: SignalCallback,
}

/// Registry for signal callbacks.
///
/// Thread-safe; callbacks are invoked outside of the registry lock, so a
/// callback may register or remove subscriptions.
pub struct SignalRegistry {
    next_id: AtomicU64,
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
}

impl SignalRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `callback` for signal `name`.
    pub fn on<F>(&self, name: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().insert(
            id,
            Entry {
                name: name.into(),
                callback: Arc::new(callback),
            },
        );
        id
    }

    /// Removes a subscription. Returns `true` if it existed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    /// Delivers `args` to every callback registered for `name`.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, name: &str, args: &[Value]) -> usize {
        let mut targets: Vec<(SubscriptionId, SignalCallback)> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.name == name)
            .map(|(id, entry)| (*id, Arc::clone(&entry.callback)))
            .collect();
        // Registration order
        targets.sort_by_key(|(id, _)| id.0);

        for (_, callback) in &targets {
            callback(args);
        }
        targets.len()
    }

    /// Number of callbacks registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.name == name)
            .count()
    }

    /// Removes all subscriptions.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("subscriptions", &self.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_every_handler_receives_emission() {
        let registry = SignalRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            registry.on("ModeReapplyPendingChanged", move |args| {
                seen.lock().push((tag, args[0].clone()));
            });
        }

        let delivered = registry.emit("ModeReapplyPendingChanged", &[json!(true)]);
        assert_eq!(delivered, 2);
        assert_eq!(
            *seen.lock(),
            vec![("a", json!(true)), ("b", json!(true))]
        );
    }

    #[test]
    fn test_emit_without_handlers_is_dropped() {
        let registry = SignalRegistry::new();
        assert_eq!(registry.emit("Nobody", &[]), 0);

        // Late subscribers do not see earlier emissions
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        registry.on("Nobody", move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_off_and_clear() {
        let registry = SignalRegistry::new();
        let first = registry.on("x", |_| {});
        let second = registry.on("x", |_| {});
        registry.on("y", |_| {});
        assert_ne!(first, second);
        assert_eq!(registry.handler_count("x"), 2);

        assert!(registry.off(first));
        assert!(!registry.off(first));
        assert_eq!(registry.emit("x", &[]), 1);

        registry.clear();
        assert_eq!(registry.handler_count("x"), 0);
        assert_eq!(registry.handler_count("y"), 0);
    }

    #[test]
    fn test_callback_may_unsubscribe() {
        let registry = Arc::new(SignalRegistry::new());
        let slot = Arc::new(Mutex::new(None::<SubscriptionId>));

        let inner_registry = Arc::clone(&registry);
        let inner_slot = Arc::clone(&slot);
        let id = registry.on("once", move |_| {
            if let Some(id) = inner_slot.lock().take() {
                inner_registry.off(id);
            }
        });
        *slot.lock() = Some(id);

        assert_eq!(registry.emit("once", &[]), 1);
        assert_eq!(registry.emit("once", &[]), 0);
    }
}
