//! Dead-letter routing for messages that cannot be processed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use read_store::{Acks, LogWriter, Message};

/// Why a message was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadLetterKind {
    /// The body did not decode into an event envelope.
    ParseError,
    /// No handler is registered for the event type.
    NoHandler,
    /// The handler failed on every attempt.
    ProcessingError,
}

impl DeadLetterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterKind::ParseError => "parse_error",
            DeadLetterKind::NoHandler => "no_handler",
            DeadLetterKind::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for DeadLetterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header names attached to dead-lettered messages.
pub mod headers {
    pub const ERROR_TYPE: &str = "error_type";
    pub const ERROR_DETAIL: &str = "error_detail";
    pub const ORIGINAL_TOPIC: &str = "original_topic";
    pub const FAILED_AT: &str = "failed_at";
}

/// Republishes failed messages to `<topic>-dlq`.
///
/// A failed dead-letter write is logged and dropped; it is never retried
/// and never dead-lettered itself.
#[derive(Clone)]
pub struct DeadLetterRouter {
    writer: Arc<dyn LogWriter>,
    source_topic: String,
    destination: String,
}

impl DeadLetterRouter {
    /// Suffix appended to the source topic to name the destination.
    pub const SUFFIX: &'static str = "-dlq";

    pub fn new(writer: Arc<dyn LogWriter>, source_topic: impl Into<String>) -> Self {
        let source_topic = source_topic.into();
        let destination = format!("{source_topic}{}", Self::SUFFIX);
        Self {
            writer,
            source_topic,
            destination,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Builds the dead-letter record: the original key, value and headers,
    /// followed by the failure headers.
    pub fn record(
        &self,
        message: &Message,
        kind: DeadLetterKind,
        detail: &str,
        failed_at: DateTime<Utc>,
    ) -> Message {
        let mut record = Message::new(message.key.clone(), message.value.clone());
        record.headers = message.headers.clone();
        record
            .with_header(headers::ERROR_TYPE, kind.as_str())
            .with_header(headers::ERROR_DETAIL, detail)
            .with_header(headers::ORIGINAL_TOPIC, self.source_topic.as_str())
            .with_header(
                headers::FAILED_AT,
                failed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
    }

    /// Writes a dead-letter record, requiring acknowledgement from every
    /// replica. Returns true if the write succeeded.
    #[tracing::instrument(
        skip(self, message, detail),
        fields(offset = message.offset, error_type = %kind)
    )]
    pub async fn send(&self, message: &Message, kind: DeadLetterKind, detail: &str) -> bool {
        let record = self.record(message, kind, detail, Utc::now());
        match self
            .writer
            .publish(&self.destination, record, Acks::All)
            .await
        {
            Ok(()) => {
                metrics::counter!("consumer_dead_letters_total", "error_type" => kind.as_str())
                    .increment(1);
                tracing::warn!(destination = %self.destination, detail, "message dead-lettered");
                true
            }
            Err(err) => {
                tracing::error!(
                    destination = %self.destination,
                    error = %err,
                    detail,
                    "failed to write dead letter"
                );
                false
            }
        }
    }

    /// Releases the underlying writer.
    pub async fn close(&self) {
        if let Err(err) = self.writer.close().await {
            tracing::warn!(error = %err, "error closing dead-letter writer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use read_store::InMemoryLog;

    fn router(log: &InMemoryLog) -> DeadLetterRouter {
        DeadLetterRouter::new(Arc::new(log.clone()), "query-service-events")
    }

    #[test]
    fn record_appends_failure_headers_after_original_ones() {
        let log = InMemoryLog::new();
        let message = Message::new("p1", "{bad").with_header("trace", "abc");
        let failed_at = Utc.with_ymd_and_hms(2024, 4, 1, 12, 30, 0).unwrap();

        let record = router(&log).record(&message, DeadLetterKind::ParseError, "eof", failed_at);

        let names: Vec<_> = record.headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["trace", "error_type", "error_detail", "original_topic", "failed_at"]
        );
        assert_eq!(record.key, b"p1".to_vec());
        assert_eq!(record.value, b"{bad".to_vec());
        assert_eq!(record.header("error_type"), Some(&b"parse_error"[..]));
        assert_eq!(record.header("original_topic"), Some(&b"query-service-events"[..]));
        assert_eq!(record.header("failed_at"), Some(&b"2024-04-01T12:30:00Z"[..]));
    }

    #[tokio::test]
    async fn send_publishes_to_suffixed_topic_with_all_acks() {
        let log = InMemoryLog::new();
        let router = router(&log);
        assert_eq!(router.destination(), "query-service-events-dlq");

        let written = router
            .send(&Message::new("o1", "{}"), DeadLetterKind::ProcessingError, "boom")
            .await;

        assert!(written);
        let dead = log.messages("query-service-events-dlq").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].header("error_detail"), Some(&b"boom"[..]));
        assert_eq!(log.publish_acks().await, vec![Acks::All]);
    }

    #[tokio::test]
    async fn failed_write_is_reported_not_retried() {
        let log = InMemoryLog::new();
        log.set_publish_unavailable(true);

        let written = router(&log)
            .send(&Message::new("o1", "{}"), DeadLetterKind::NoHandler, "nobody home")
            .await;

        assert!(!written);
        assert!(log.messages("query-service-events-dlq").await.is_empty());
        assert!(log.publish_acks().await.is_empty());
    }
}
