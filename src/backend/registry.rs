//! Backend factory resolution.
//!
//! Sites name their backends by type selector. A `PluginResolver` maps a
//! selector to a `BackendFactory`, or, when the factory is not available
//! yet, registers a one-shot listener that is invoked once it appears.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::traits::BackendFactory;

/// Identifier of a pending factory subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-shot callback invoked when a pending factory becomes available.
pub type FactoryListener = Box<dyn FnOnce(Arc<dyn BackendFactory>) + Send>;

/// Outcome of resolving a type selector.
pub enum Resolution {
    /// The factory is available now; the listener was dropped unused.
    Ready(Arc<dyn BackendFactory>),
    /// The listener will be called once the factory is registered.
    Pending(SubscriptionId),
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => write!(f, "Ready"),
            Self::Pending(id) => f.debug_tuple("Pending").field(id).finish(),
        }
    }
}

/// Resolves backend type selectors to factories.
///
/// `resolve_or_subscribe` must be atomic with respect to registration: a
/// factory registered concurrently is either returned as `Ready` or delivered
/// to the listener, never lost.
pub trait PluginResolver: Send + Sync {
    /// Resolve `selector`, or subscribe `listener` for its later availability.
    fn resolve_or_subscribe(&self, selector: &str, listener: FactoryListener) -> Resolution;

    /// Cancel a pending subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

#[derive(Default)]
struct RegistryState {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
    pending: HashMap<String, Vec<(SubscriptionId, FactoryListener)>>,
}

/// In-process `PluginResolver`.
///
/// Hosts register factories under their selector; sites created before the
/// registration are completed through their pending listeners. Listeners run
/// on the registering thread after the registry lock is released.
#[derive(Default)]
pub struct PluginRegistry {
    state: Mutex<RegistryState>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the factory for `selector` and fires pending listeners.
    pub fn register(&self, selector: impl Into<String>, factory: Arc<dyn BackendFactory>) {
        let selector = selector.into();
        let listeners = {
            let Ok(mut state) = self.state.lock() else {
                tracing::error!(%selector, "plugin registry lock poisoned; factory not registered");
                return;
            };
            state.factories.insert(selector.clone(), Arc::clone(&factory));
            state.pending.remove(&selector).unwrap_or_default()
        };

        tracing::info!(%selector, listeners = listeners.len(), "backend factory registered");
        for (_, listener) in listeners {
            listener(Arc::clone(&factory));
        }
    }

    /// Removes the factory for `selector`. Instances already created are unaffected.
    pub fn unregister(&self, selector: &str) -> bool {
        self.state
            .lock()
            .map(|mut state| state.factories.remove(selector).is_some())
            .unwrap_or(false)
    }

    /// Number of listeners still waiting for `selector`.
    #[must_use]
    pub fn pending_count(&self, selector: &str) -> usize {
        self.state
            .lock()
            .map(|state| state.pending.get(selector).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl PluginResolver for PluginRegistry {
    fn resolve_or_subscribe(&self, selector: &str, listener: FactoryListener) -> Resolution {
        let id = SubscriptionId::new();
        let Ok(mut state) = self.state.lock() else {
            // A poisoned registry never resolves; the role stays pending.
            return Resolution::Pending(id);
        };
        if let Some(factory) = state.factories.get(selector) {
            return Resolution::Ready(Arc::clone(factory));
        }
        state
            .pending
            .entry(selector.to_string())
            .or_default()
            .push((id, listener));
        tracing::debug!(%selector, subscription = %id, "backend factory not yet available; waiting");
        Resolution::Pending(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut state) = self.state.lock() {
            for listeners in state.pending.values_mut() {
                listeners.retain(|(sid, _)| *sid != id);
            }
            state.pending.retain(|_, listeners| !listeners.is_empty());
        }
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PluginRegistry");
        if let Ok(state) = self.state.lock() {
            let mut selectors: Vec<_> = state.factories.keys().collect();
            selectors.sort();
            s.field("factories", &selectors);
            s.field("pending", &state.pending.len());
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::BackendInstance;
    use crate::config::SiteConfiguration;
    use crate::error::BackendError;

    struct NoopFactory;

    impl BackendFactory for NoopFactory {
        fn create(&self, _: &SiteConfiguration) -> Result<BackendInstance, BackendError> {
            Err(BackendError::Creation {
                selector: "noop".to_string(),
                reason: "test factory".to_string(),
            })
        }
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> FactoryListener {
        let counter = Arc::clone(counter);
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_resolve_registered_factory() {
        let registry = PluginRegistry::new();
        registry.register("noop", Arc::new(NoopFactory));
        let fired = Arc::new(AtomicUsize::new(0));
        let resolution = registry.resolve_or_subscribe("noop", counting_listener(&fired));
        assert!(matches!(resolution, Resolution::Ready(_)));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pending_listener_fires_once() {
        let registry = PluginRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let resolution = registry.resolve_or_subscribe("noop", counting_listener(&fired));
        assert!(matches!(resolution, Resolution::Pending(_)));
        assert_eq!(registry.pending_count("noop"), 1);

        registry.register("noop", Arc::new(NoopFactory));
        registry.register("noop", Arc::new(NoopFactory));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending_count("noop"), 0);
    }

    #[test]
    fn test_unsubscribe_drops_listener() {
        let registry = PluginRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let Resolution::Pending(id) = registry.resolve_or_subscribe("noop", counting_listener(&fired)) else {
            panic!("expected pending resolution");
        };
        registry.unsubscribe(id);
        registry.register("noop", Arc::new(NoopFactory));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unregister() {
        let registry = PluginRegistry::new();
        registry.register("noop", Arc::new(NoopFactory));
        assert!(registry.unregister("noop"));
        assert!(!registry.unregister("noop"));
        let resolution = registry.resolve_or_subscribe("noop", Box::new(|_| {}));
        assert!(matches!(resolution, Resolution::Pending(_)));
    }
}
