//! Durable-log consumer for the query-side read model.
//!
//! A [`Consumer`] pulls one message at a time, decodes its event envelope,
//! dispatches it to the handler registered for its kind and retries failures
//! on a [`RetryPolicy`] schedule. Messages that cannot be decoded, have no
//! handler, or exhaust their retries are republished by the
//! [`DeadLetterRouter`] with failure headers.

pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod registry;
pub mod retry;

pub use consumer::{Consumer, ConsumerConfig, ConsumerHandle, MessageOutcome};
pub use dead_letter::{DeadLetterKind, DeadLetterRouter};
pub use error::RetryConfigError;
pub use registry::HandlerRegistry;
pub use retry::RetryPolicy;
