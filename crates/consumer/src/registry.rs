//! Event kind to handler mapping.

use std::collections::HashMap;
use std::sync::Arc;

use domain::EventKind;
use projections::EventHandler;

/// At most one handler per event kind.
///
/// Registering a second handler for a kind replaces the first; the
/// replaced handler is returned so callers that care can detect it.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a set of handlers, later entries winning.
    pub fn with_handlers(handlers: impl IntoIterator<Item = Arc<dyn EventHandler>>) -> Self {
        let mut registry = Self::new();
        for handler in handlers {
            registry.register(handler);
        }
        registry
    }

    /// Registers `handler` under the kind it declares.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) -> Option<Arc<dyn EventHandler>> {
        let kind = handler.kind();
        let replaced = self.handlers.insert(kind, handler);
        if replaced.is_some() {
            tracing::debug!(event_type = %kind, "replaced existing handler");
        }
        replaced
    }

    pub fn lookup(&self, kind: EventKind) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use projections::HandlerOutcome;
    use serde_json::Value;

    struct Named {
        kind: EventKind,
    }

    #[async_trait]
    impl EventHandler for Named {
        fn kind(&self) -> EventKind {
            self.kind
        }

        async fn handle(&self, _data: &Value) -> projections::Result<HandlerOutcome> {
            Ok(HandlerOutcome::Completed)
        }
    }

    fn named(kind: EventKind) -> Arc<dyn EventHandler> {
        Arc::new(Named { kind })
    }

    #[test]
    fn lookup_finds_registered_kinds_only() {
        let registry = HandlerRegistry::with_handlers([named(EventKind::ProductCreated)]);
        assert!(registry.lookup(EventKind::ProductCreated).is_some());
        assert!(registry.lookup(EventKind::OrderCreated).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn last_registration_wins() {
        let first = named(EventKind::OrderCreated);
        let second = named(EventKind::OrderCreated);
        let mut registry = HandlerRegistry::new();
        assert!(registry.register(first.clone()).is_none());
        let replaced = registry.register(second.clone()).unwrap();

        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(Arc::ptr_eq(registry.lookup(EventKind::OrderCreated).unwrap(), &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(format!("{registry:?}"), "HandlerRegistry { kinds: [OrderCreated] }");
    }
}
