//! The consumption loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::EventEnvelope;
use projections::{HandlerError, HandlerOutcome};
use read_store::{LogError, LogReader, LogWriter, Message};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{DeadLetterKind, DeadLetterRouter, HandlerRegistry, RetryPolicy};

/// Timing knobs for a [`Consumer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumerConfig {
    pub retry: RetryPolicy,
    /// Upper bound on a single handler attempt.
    pub handler_timeout: Duration,
    /// Longest a pull blocks before the stop signal is checked again.
    pub poll_timeout: Duration,
    /// Pause after a failed pull before pulling again.
    pub pull_error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            handler_timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(1),
            pull_error_backoff: Duration::from_secs(1),
        }
    }
}

/// Terminal state of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// A handler attempt succeeded.
    Succeeded {
        attempts: u32,
        outcome: HandlerOutcome,
    },
    /// The message was handed to the dead-letter router.
    DeadLettered(DeadLetterKind),
}

impl MessageOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            MessageOutcome::Succeeded { .. } => "succeeded",
            MessageOutcome::DeadLettered(_) => "dead_lettered",
        }
    }
}

/// Pulls messages one at a time and drives each to a terminal state before
/// pulling the next.
pub struct Consumer {
    reader: Arc<dyn LogReader>,
    registry: HandlerRegistry,
    dead_letters: DeadLetterRouter,
    config: ConsumerConfig,
}

impl Consumer {
    /// Creates a consumer over `reader`. Dead letters are written through
    /// `writer` to the reader's topic plus the dead-letter suffix.
    pub fn new(
        reader: Arc<dyn LogReader>,
        writer: Arc<dyn LogWriter>,
        registry: HandlerRegistry,
        config: ConsumerConfig,
    ) -> Self {
        let dead_letters = DeadLetterRouter::new(writer, reader.topic());
        Self {
            reader,
            registry,
            dead_letters,
            config,
        }
    }

    /// Decodes, dispatches and retries one message until it succeeds or is
    /// dead-lettered.
    #[tracing::instrument(
        skip(self, message),
        fields(partition = message.partition, offset = message.offset, key = %message.key_str())
    )]
    pub async fn process(&self, message: &Message) -> MessageOutcome {
        let outcome = self.dispatch(message).await;
        metrics::counter!("consumer_messages_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    async fn dispatch(&self, message: &Message) -> MessageOutcome {
        let envelope = match EventEnvelope::decode(&message.value) {
            Ok(envelope) => envelope,
            Err(err) => {
                return self
                    .dead_letter(message, DeadLetterKind::ParseError, &err.to_string())
                    .await;
            }
        };

        let handler = envelope
            .kind()
            .ok()
            .and_then(|kind| self.registry.lookup(kind));
        let Some(handler) = handler else {
            let detail = format!("no handler registered for event type {}", envelope.event_type);
            return self
                .dead_letter(message, DeadLetterKind::NoHandler, &detail)
                .await;
        };

        let retry = self.config.retry;
        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let timeout = self.config.handler_timeout;
            let result = match tokio::time::timeout(timeout, handler.handle(&envelope.data)).await {
                Ok(result) => result,
                Err(_) => Err(HandlerError::Timeout(timeout)),
            };
            metrics::histogram!("consumer_handler_duration_seconds")
                .record(started.elapsed().as_secs_f64());

            match result {
                Ok(outcome) => {
                    for failure in outcome.soft_failures() {
                        let step = failure.step.as_str();
                        metrics::counter!("sync_soft_failures_total", "step" => step).increment(1);
                        tracing::warn!(
                            event_type = %envelope.event_type,
                            step = %failure.step,
                            keys = ?failure.keys,
                            error = %failure.error,
                            "cache step failed; continuing"
                        );
                    }
                    tracing::debug!(
                        event_type = %envelope.event_type,
                        attempts = attempt + 1,
                        "event processed"
                    );
                    return MessageOutcome::Succeeded {
                        attempts: attempt + 1,
                        outcome,
                    };
                }
                Err(err) if retry.should_retry(attempt) => {
                    let delay = retry.delay(attempt);
                    metrics::counter!("consumer_retries_total").increment(1);
                    tracing::warn!(
                        event_type = %envelope.event_type,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "handler failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        event_type = %envelope.event_type,
                        attempts = attempt + 1,
                        error = %err,
                        "handler failed; retries exhausted"
                    );
                    return self
                        .dead_letter(message, DeadLetterKind::ProcessingError, &err.to_string())
                        .await;
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        message: &Message,
        kind: DeadLetterKind,
        detail: &str,
    ) -> MessageOutcome {
        self.dead_letters.send(message, kind, detail).await;
        MessageOutcome::DeadLettered(kind)
    }

    /// Runs until `token` is cancelled or the reader is closed, then
    /// releases the reader and the dead-letter writer.
    ///
    /// Cancellation is observed between messages only; a message being
    /// processed is always driven to its terminal state first.
    pub async fn run(self, token: CancellationToken) {
        tracing::info!(
            topic = %self.reader.topic(),
            dead_letter_topic = %self.dead_letters.destination(),
            handlers = self.registry.len(),
            "consumer started"
        );

        loop {
            let pulled = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                pulled = self.reader.pull(self.config.poll_timeout) => pulled,
            };

            match pulled {
                Ok(Some(message)) => {
                    self.process(&message).await;
                    if let Err(err) = self.reader.commit(&message).await {
                        tracing::warn!(
                            offset = message.offset,
                            error = %err,
                            "failed to commit offset"
                        );
                    }
                }
                Ok(None) => {}
                Err(LogError::Closed) => {
                    tracing::warn!("log reader closed; consumer exiting");
                    break;
                }
                Err(err) => {
                    metrics::counter!("log_pull_errors_total").increment(1);
                    tracing::warn!(error = %err, "failed to pull from log");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.config.pull_error_backoff) => {}
                    }
                }
            }
        }

        self.close().await;
        tracing::info!("consumer stopped");
    }

    async fn close(&self) {
        if let Err(err) = self.reader.close().await {
            tracing::warn!(error = %err, "error closing log reader");
        }
        self.dead_letters.close().await;
    }

    /// Spawns [`run`](Self::run) on the runtime.
    pub fn start(self) -> ConsumerHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone()));
        ConsumerHandle { token, task }
    }
}

/// Handle to a running consumer.
pub struct ConsumerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signals the loop to exit after its in-flight message.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the loop and waits until it has exited and released its
    /// resources.
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }

    /// Waits for the loop to exit.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "consumer task failed");
        }
    }
}
