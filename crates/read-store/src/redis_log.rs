//! Redis Streams-backed log.
//!
//! Each topic is one stream. A message is stored as a stream entry with a
//! `key` field, a `value` field and one `header:<name>` field per header, in
//! header order. Consumer groups are Redis consumer groups: a pull is an
//! `XREADGROUP` and a commit is an `XACK`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value};
use tokio::sync::Mutex;

use crate::LogError;
use crate::log::{Acks, Header, LogReader, LogWriter, Message};

const KEY_FIELD: &str = "key";
const VALUE_FIELD: &str = "value";
const HEADER_PREFIX: &str = "header:";

/// Publishes to Redis streams and opens consumer-group readers on them.
#[derive(Clone)]
pub struct RedisStreamLog {
    client: Client,
    conn: ConnectionManager,
    min_replicas: u32,
    replica_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl RedisStreamLog {
    /// Connects to the Redis server at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, LogError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            min_replicas: 0,
            replica_timeout: Duration::from_secs(1),
            closed: Arc::default(),
        })
    }

    /// Makes [`Acks::All`] publishes wait, via `WAIT`, until `replicas`
    /// replicas hold the entry. Fewer acknowledgements within `timeout`
    /// fail the publish.
    pub fn with_min_replicas(mut self, replicas: u32, timeout: Duration) -> Self {
        self.min_replicas = replicas;
        self.replica_timeout = timeout;
        self
    }

    /// Opens a reader on `topic` as `consumer` within `group`.
    ///
    /// A missing group is created at the start of the stream, so a new group
    /// sees every retained entry.
    pub async fn reader(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<RedisStreamReader, LogError> {
        // A blocked XREADGROUP holds its connection, so readers get their own.
        let mut conn = ConnectionManager::new(self.client.clone()).await?;
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(topic)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => tracing::info!(topic, group, "created consumer group"),
            Err(err) if err.code() == Some("BUSYGROUP") => {}
            Err(err) => return Err(err.into()),
        }

        Ok(RedisStreamReader {
            conn,
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            next_offset: AtomicU64::new(0),
            in_flight: Mutex::new(HashMap::new()),
            backlog_drained: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl LogWriter for RedisStreamLog {
    #[tracing::instrument(skip(self, message), fields(key = %message.key_str()))]
    async fn publish(
        &self,
        destination: &str,
        message: Message,
        acks: Acks,
    ) -> Result<(), LogError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }

        let mut cmd = redis::cmd("XADD");
        cmd.arg(destination).arg("*");
        for (name, value) in entry_fields(&message) {
            cmd.arg(name).arg(value);
        }
        let mut conn = self.conn.clone();
        let id: String = cmd.query_async(&mut conn).await?;

        if acks == Acks::All && self.min_replicas > 0 {
            let acknowledged: u32 = redis::cmd("WAIT")
                .arg(self.min_replicas)
                .arg(millis(self.replica_timeout))
                .query_async(&mut conn)
                .await?;
            if acknowledged < self.min_replicas {
                return Err(LogError::Unavailable(format!(
                    "{destination} entry {id} reached {acknowledged} of {} replicas",
                    self.min_replicas
                )));
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A consumer-group reader over one Redis stream.
///
/// Offsets are assigned in delivery order by the reader. The stream entry
/// id behind each delivered offset is kept until the offset is committed.
pub struct RedisStreamReader {
    conn: ConnectionManager,
    topic: String,
    group: String,
    consumer: String,
    next_offset: AtomicU64,
    in_flight: Mutex<HashMap<u64, String>>,
    backlog_drained: AtomicBool,
    closed: AtomicBool,
}

impl RedisStreamReader {
    async fn read(
        &self,
        start: &str,
        block: Option<Duration>,
    ) -> Result<Vec<StreamEntry>, LogError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(millis(block));
        }
        cmd.arg("STREAMS").arg(&self.topic).arg(start);

        let mut conn = self.conn.clone();
        let reply: Value = cmd.query_async(&mut conn).await?;
        parse_read_reply(reply)
    }

    async fn acknowledge(&self, id: &str) -> Result<(), LogError> {
        let mut conn = self.conn.clone();
        redis::cmd("XACK")
            .arg(&self.topic)
            .arg(&self.group)
            .arg(id)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn deliver(&self, id: String, fields: Vec<(String, Vec<u8>)>) -> Message {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        self.in_flight.lock().await.insert(offset, id);
        into_message(&self.topic, offset, fields)
    }
}

#[async_trait]
impl LogReader for RedisStreamReader {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn pull(&self, max_wait: Duration) -> Result<Option<Message>, LogError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }

        // Entries delivered to this consumer before a restart and never
        // acknowledged come first.
        while !self.backlog_drained.load(Ordering::SeqCst) {
            match self.read("0", None).await?.into_iter().next() {
                None => self.backlog_drained.store(true, Ordering::SeqCst),
                Some(StreamEntry {
                    id,
                    fields: Some(fields),
                }) => return Ok(Some(self.deliver(id, fields).await)),
                Some(StreamEntry { id, fields: None }) => {
                    tracing::warn!(topic = %self.topic, %id, "acknowledging trimmed pending entry");
                    self.acknowledge(&id).await?;
                }
            }
        }

        match self.read(">", Some(max_wait)).await?.into_iter().next() {
            None => Ok(None),
            Some(StreamEntry { id, fields }) => {
                Ok(Some(self.deliver(id, fields.unwrap_or_default()).await))
            }
        }
    }

    async fn commit(&self, message: &Message) -> Result<(), LogError> {
        let id = self
            .in_flight
            .lock()
            .await
            .remove(&message.offset)
            .ok_or_else(|| {
                LogError::Malformed(format!(
                    "offset {} was not delivered by this reader",
                    message.offset
                ))
            })?;

        if let Err(err) = self.acknowledge(&id).await {
            self.in_flight.lock().await.insert(message.offset, id);
            return Err(err);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One stream entry. `fields` is `None` for a pending entry that has been
/// trimmed from the stream.
#[derive(Debug, PartialEq)]
struct StreamEntry {
    id: String,
    fields: Option<Vec<(String, Vec<u8>)>>,
}

fn millis(duration: Duration) -> u64 {
    // BLOCK 0 waits forever, so the shortest wait is one millisecond.
    u64::try_from(duration.as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

fn entry_fields(message: &Message) -> Vec<(String, &[u8])> {
    let mut fields = vec![
        (KEY_FIELD.to_string(), message.key.as_slice()),
        (VALUE_FIELD.to_string(), message.value.as_slice()),
    ];
    fields.extend(
        message
            .headers
            .iter()
            .map(|h| (format!("{HEADER_PREFIX}{}", h.name), h.value.as_slice())),
    );
    fields
}

fn into_message(topic: &str, offset: u64, fields: Vec<(String, Vec<u8>)>) -> Message {
    let mut message = Message::new(Vec::new(), Vec::new());
    message.topic = topic.to_string();
    message.offset = offset;
    for (name, value) in fields {
        match name.as_str() {
            KEY_FIELD => message.key = value,
            VALUE_FIELD => message.value = value,
            other => {
                if let Some(header) = other.strip_prefix(HEADER_PREFIX) {
                    message.headers.push(Header {
                        name: header.to_string(),
                        value,
                    });
                }
            }
        }
    }
    message
}

fn malformed(what: &str) -> LogError {
    LogError::Malformed(format!("unexpected XREADGROUP reply: {what}"))
}

fn bytes(value: Value, what: &str) -> Result<Vec<u8>, LogError> {
    match value {
        Value::Data(data) => Ok(data),
        Value::Status(status) => Ok(status.into_bytes()),
        _ => Err(malformed(what)),
    }
}

/// Parses `[[stream, [[id, [field, value, ...]], ...]], ...]`. A timed-out
/// blocking read replies `nil`.
fn parse_read_reply(reply: Value) -> Result<Vec<StreamEntry>, LogError> {
    let streams = match reply {
        Value::Nil => return Ok(Vec::new()),
        Value::Bulk(streams) => streams,
        _ => return Err(malformed("streams")),
    };

    let mut entries = Vec::new();
    for stream in streams {
        let Value::Bulk(parts) = stream else {
            return Err(malformed("stream"));
        };
        let Ok([_name, Value::Bulk(items)]) = <[Value; 2]>::try_from(parts) else {
            return Err(malformed("stream"));
        };

        for item in items {
            let Value::Bulk(parts) = item else {
                return Err(malformed("entry"));
            };
            let Ok([id, fields]) = <[Value; 2]>::try_from(parts) else {
                return Err(malformed("entry"));
            };
            let id = String::from_utf8_lossy(&bytes(id, "entry id")?).into_owned();

            let fields = match fields {
                Value::Nil => None,
                Value::Bulk(flat) => {
                    let mut pairs = Vec::with_capacity(flat.len() / 2);
                    let mut flat = flat.into_iter();
                    while let Some(name) = flat.next() {
                        let value = flat.next().ok_or_else(|| malformed("field pair"))?;
                        let name = bytes(name, "field name")?;
                        let name = String::from_utf8_lossy(&name).into_owned();
                        pairs.push((name, bytes(value, "field value")?));
                    }
                    Some(pairs)
                }
                _ => return Err(malformed("entry fields")),
            };
            entries.push(StreamEntry { id, fields });
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(text: &str) -> Value {
        Value::Data(text.as_bytes().to_vec())
    }

    fn reply(entries: Vec<Value>) -> Value {
        Value::Bulk(vec![Value::Bulk(vec![
            data("query-service-events"),
            Value::Bulk(entries),
        ])])
    }

    #[test]
    fn timed_out_read_has_no_entries() {
        assert_eq!(parse_read_reply(Value::Nil).unwrap(), Vec::new());
    }

    #[test]
    fn entries_keep_field_order() {
        let entry = Value::Bulk(vec![
            data("1700000000000-0"),
            Value::Bulk(vec![
                data("key"),
                data("p1"),
                data("value"),
                data("{}"),
                data("header:error_type"),
                data("parse_error"),
            ]),
        ]);

        let entries = parse_read_reply(reply(vec![entry])).unwrap();
        assert_eq!(
            entries,
            vec![StreamEntry {
                id: "1700000000000-0".to_string(),
                fields: Some(vec![
                    ("key".to_string(), b"p1".to_vec()),
                    ("value".to_string(), b"{}".to_vec()),
                    ("header:error_type".to_string(), b"parse_error".to_vec()),
                ]),
            }]
        );
    }

    #[test]
    fn trimmed_pending_entry_has_no_fields() {
        let entry = Value::Bulk(vec![data("1-0"), Value::Nil]);
        let entries = parse_read_reply(reply(vec![entry])).unwrap();
        assert_eq!(entries[0].fields, None);
    }

    #[test]
    fn odd_field_list_is_rejected() {
        let entry = Value::Bulk(vec![data("1-0"), Value::Bulk(vec![data("key")])]);
        assert!(matches!(
            parse_read_reply(reply(vec![entry])),
            Err(LogError::Malformed(_))
        ));
    }

    #[test]
    fn message_fields_survive_a_stream_entry() {
        let original = Message::new("o1", r#"{"type":"OrderCreated"}"#)
            .with_header("error_type", "no_handler")
            .with_header("original_topic", "query-service-events");

        let fields = entry_fields(&original)
            .into_iter()
            .map(|(name, value)| (name, value.to_vec()))
            .collect();
        let restored = into_message("query-service-events-dlq", 7, fields);

        assert_eq!(restored.topic, "query-service-events-dlq");
        assert_eq!(restored.offset, 7);
        assert_eq!(restored.key, original.key);
        assert_eq!(restored.value, original.value);
        assert_eq!(restored.headers, original.headers);
    }

    #[test]
    fn block_never_waits_forever() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
    }
}
