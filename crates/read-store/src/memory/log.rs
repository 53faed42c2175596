use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use crate::log::{Acks, LogReader, LogWriter, Message};
use crate::LogError;

#[derive(Default)]
struct LogState {
    topics: HashMap<String, Vec<Message>>,
    /// Next offset to deliver, keyed by (topic, group).
    committed: HashMap<(String, String), u64>,
    publish_acks: Vec<Acks>,
}

#[derive(Default)]
struct LogShared {
    state: RwLock<LogState>,
    appended: Notify,
    publish_unavailable: AtomicBool,
    pending_pull_failures: AtomicUsize,
    writer_closed: AtomicBool,
}

/// In-memory single-partition log with consumer-group offsets.
///
/// Clones share the same topics. A reader created for a group resumes after
/// the group's last committed offset.
#[derive(Clone, Default)]
pub struct InMemoryLog {
    shared: Arc<LogShared>,
}

impl InMemoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a reader on `topic` for consumer group `group`.
    pub async fn reader(&self, topic: &str, group: &str) -> InMemoryLogReader {
        let start = self
            .shared
            .state
            .read()
            .await
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .copied()
            .unwrap_or(0);

        InMemoryLogReader {
            log: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position: AtomicU64::new(start),
            closed: AtomicBool::new(false),
        }
    }

    /// Appends a message to `topic` as a producer would. Returns its offset.
    pub async fn produce(
        &self,
        topic: &str,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> u64 {
        self.append(topic, Message::new(key, value), Acks::Leader).await
    }

    /// Returns every message in `topic`.
    pub async fn messages(&self, topic: &str) -> Vec<Message> {
        self.shared
            .state
            .read()
            .await
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the acknowledgement levels requested by successful publishes.
    pub async fn publish_acks(&self) -> Vec<Acks> {
        self.shared.state.read().await.publish_acks.clone()
    }

    /// Returns the next offset `group` will read from `topic`.
    pub async fn committed_offset(&self, topic: &str, group: &str) -> u64 {
        self.shared
            .state
            .read()
            .await
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Makes publishes fail with [`LogError::Unavailable`].
    pub fn set_publish_unavailable(&self, unavailable: bool) {
        self.shared
            .publish_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` pulls on any reader fail.
    pub fn fail_next_pulls(&self, count: usize) {
        self.shared
            .pending_pull_failures
            .store(count, Ordering::SeqCst);
    }

    /// Returns true once the log has been closed as a writer.
    pub fn is_writer_closed(&self) -> bool {
        self.shared.writer_closed.load(Ordering::SeqCst)
    }

    async fn append(&self, topic: &str, mut message: Message, acks: Acks) -> u64 {
        let offset = {
            let mut state = self.shared.state.write().await;
            let partition = state.topics.entry(topic.to_string()).or_default();
            let offset = partition.len() as u64;
            message.topic = topic.to_string();
            message.partition = 0;
            message.offset = offset;
            partition.push(message);
            state.publish_acks.push(acks);
            offset
        };
        self.shared.appended.notify_waiters();
        offset
    }

    async fn message_at(&self, topic: &str, offset: u64) -> Option<Message> {
        self.shared
            .state
            .read()
            .await
            .topics
            .get(topic)
            .and_then(|partition| partition.get(offset as usize))
            .cloned()
    }

    fn take_pull_failure(&self) -> bool {
        self.shared
            .pending_pull_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LogWriter for InMemoryLog {
    async fn publish(
        &self,
        destination: &str,
        message: Message,
        acks: Acks,
    ) -> Result<(), LogError> {
        if self.is_writer_closed() {
            return Err(LogError::Closed);
        }
        if self.shared.publish_unavailable.load(Ordering::SeqCst) {
            return Err(LogError::Unavailable(format!(
                "cannot publish to {destination}"
            )));
        }
        self.append(destination, message, acks).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        self.shared.writer_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A consumer-group reader over one [`InMemoryLog`] topic.
pub struct InMemoryLogReader {
    log: InMemoryLog,
    topic: String,
    group: String,
    position: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryLogReader {
    /// Returns true once the reader has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogReader for InMemoryLogReader {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn pull(&self, max_wait: Duration) -> Result<Option<Message>, LogError> {
        if self.is_closed() {
            return Err(LogError::Closed);
        }
        if self.log.take_pull_failure() {
            return Err(LogError::Unavailable(format!(
                "fetch from {} failed",
                self.topic
            )));
        }

        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            // Register interest before checking, so an append between the
            // check and the wait is not missed.
            let notified = self.log.shared.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let position = self.position.load(Ordering::SeqCst);
            if let Some(message) = self.log.message_at(&self.topic, position).await {
                self.position.store(position + 1, Ordering::SeqCst);
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&self, message: &Message) -> Result<(), LogError> {
        let mut state = self.log.shared.state.write().await;
        let next = state
            .committed
            .entry((self.topic.clone(), self.group.clone()))
            .or_insert(0);
        *next = (*next).max(message.offset + 1);
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_delivers_in_offset_order() {
        let log = InMemoryLog::new();
        log.produce("events", "k", "one").await;
        log.produce("events", "k", "two").await;

        let reader = log.reader("events", "g").await;
        let first = reader.pull(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = reader.pull(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!((first.offset, first.value.as_slice()), (0, &b"one"[..]));
        assert_eq!((second.offset, second.value.as_slice()), (1, &b"two"[..]));
        assert_eq!(second.topic, "events");
    }

    #[tokio::test(start_paused = true)]
    async fn pull_times_out_on_empty_topic() {
        let log = InMemoryLog::new();
        let reader = log.reader("events", "g").await;
        let pulled = reader.pull(Duration::from_secs(1)).await.unwrap();
        assert!(pulled.is_none());
    }

    #[tokio::test]
    async fn pull_wakes_when_a_message_arrives() {
        let log = InMemoryLog::new();
        let reader = log.reader("events", "g").await;

        let producer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.produce("events", "k", "late").await;
        });

        let pulled = reader.pull(Duration::from_secs(5)).await.unwrap();
        assert_eq!(pulled.unwrap().value, b"late".to_vec());
    }

    #[tokio::test]
    async fn new_reader_resumes_after_committed_offset() {
        let log = InMemoryLog::new();
        for value in ["a", "b", "c"] {
            log.produce("events", "k", value).await;
        }

        let reader = log.reader("events", "g").await;
        let first = reader.pull(Duration::from_millis(10)).await.unwrap().unwrap();
        reader.commit(&first).await.unwrap();
        // Pulled but never committed.
        reader.pull(Duration::from_millis(10)).await.unwrap().unwrap();
        reader.close().await.unwrap();

        let reopened = log.reader("events", "g").await;
        let next = reopened.pull(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(next.value, b"b".to_vec());
        assert_eq!(log.committed_offset("events", "g").await, 1);
    }

    #[tokio::test]
    async fn injected_pull_failures_are_consumed() {
        let log = InMemoryLog::new();
        log.produce("events", "k", "v").await;
        log.fail_next_pulls(1);

        let reader = log.reader("events", "g").await;
        assert!(matches!(
            reader.pull(Duration::from_millis(10)).await,
            Err(LogError::Unavailable(_))
        ));
        assert!(reader.pull(Duration::from_millis(10)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn closed_handles_reject_work() {
        let log = InMemoryLog::new();
        let reader = log.reader("events", "g").await;
        reader.close().await.unwrap();
        assert!(matches!(
            reader.pull(Duration::from_millis(10)).await,
            Err(LogError::Closed)
        ));

        LogWriter::close(&log).await.unwrap();
        assert!(matches!(
            log.publish("events-dlq", Message::new("k", "v"), Acks::All).await,
            Err(LogError::Closed)
        ));
    }
}
