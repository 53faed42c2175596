//! Handler traits.

use async_trait::async_trait;
use domain::EventKind;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{HandlerError, HandlerOutcome, Result};

/// A handler specialized for one event kind's typed payload.
///
/// Implementations run their steps in a fixed order: primary store, then
/// search index (hard steps, returned as errors), then cache (soft steps,
/// folded into the outcome). Hard steps must be safe to re-run.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// The event kind this handler is registered for.
    const KIND: EventKind;

    /// The payload record the event data decodes into.
    type Payload: DeserializeOwned + Send;

    async fn apply(&self, payload: Self::Payload) -> Result<HandlerOutcome>;
}

/// A handler over untyped event data, as stored in a registry.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn kind(&self) -> EventKind;

    /// Decodes `data` and applies it.
    async fn handle(&self, data: &Value) -> Result<HandlerOutcome>;
}

#[async_trait]
impl<H: SyncHandler> EventHandler for H {
    fn kind(&self) -> EventKind {
        H::KIND
    }

    async fn handle(&self, data: &Value) -> Result<HandlerOutcome> {
        let payload = H::Payload::deserialize(data).map_err(|source| HandlerError::Payload {
            kind: H::KIND,
            source,
        })?;
        self.apply(payload).await
    }
}
