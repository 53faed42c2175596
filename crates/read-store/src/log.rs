//! Durable log contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::LogError;

/// A named header attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

/// A message read from or written to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message belongs to.
    pub topic: String,
    /// Partition within the topic.
    pub partition: u32,
    /// Position within the partition.
    pub offset: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Headers in the order they were added.
    pub headers: Vec<Header>,
}

impl Message {
    /// Creates an unpositioned message. The log assigns topic and offset on publish.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: String::new(),
            partition: 0,
            offset: 0,
            key: key.into(),
            value: value.into(),
            headers: Vec::new(),
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Returns the value of the last header named `name`.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .rev()
            .find(|h| h.name == name)
            .map(|h| h.value.as_slice())
    }

    /// Returns the key as lossy UTF-8, for logging.
    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

/// Acknowledgement level required for a publish to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acks {
    /// The partition leader has the write.
    Leader,
    /// Every in-sync replica has the write.
    All,
}

/// Reads one topic on behalf of a consumer group.
#[async_trait]
pub trait LogReader: Send + Sync {
    /// The topic being read.
    fn topic(&self) -> &str;

    /// Waits up to `max_wait` for the next message. `Ok(None)` means the wait
    /// elapsed with nothing to read.
    async fn pull(&self, max_wait: Duration) -> Result<Option<Message>, LogError>;

    /// Records that `message` reached a terminal state, so the group resumes
    /// after it.
    async fn commit(&self, message: &Message) -> Result<(), LogError>;

    /// Releases the reader.
    async fn close(&self) -> Result<(), LogError>;
}

/// Publishes messages to arbitrary destinations.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Appends `message` to `destination`.
    async fn publish(&self, destination: &str, message: Message, acks: Acks)
    -> Result<(), LogError>;

    /// Releases the writer.
    async fn close(&self) -> Result<(), LogError>;
}
