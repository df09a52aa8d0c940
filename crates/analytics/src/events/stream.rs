use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::streams::StreamRangeReply;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};

/// One entry read from an append-only stream: a monotone-comparable id and
/// a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub data: String,
}

/// Ordered stream source. Implementations must return entries strictly
/// greater than `after` in stream order.
#[async_trait]
pub trait EventStream: Send + Sync {
    async fn read_after(
        &self,
        stream: &str,
        after: Option<&str>,
        count: usize,
    ) -> Result<Vec<StreamEntry>>;

    async fn ping(&self) -> Result<()>;
}

/// Redis streams implementation. Entries carry the payload under a single
/// `data` field.
pub struct RedisEventStream {
    redis: ConnectionManager,
}

impl RedisEventStream {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl EventStream for RedisEventStream {
    async fn read_after(
        &self,
        stream: &str,
        after: Option<&str>,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.redis.clone();
        // `(` makes the lower bound exclusive; `-` reads from the start.
        let start = match after {
            Some(id) => format!("({id}"),
            None => "-".to_string(),
        };

        let reply: StreamRangeReply = conn.xrange_count(stream, start, "+", count).await?;

        let mut entries = Vec::with_capacity(reply.ids.len());
        for stream_id in reply.ids {
            let data = match stream_id.map.get("data") {
                Some(redis::Value::BulkString(bytes)) => {
                    String::from_utf8_lossy(bytes).into_owned()
                }
                Some(redis::Value::SimpleString(s)) => s.clone(),
                _ => String::new(),
            };
            entries.push(StreamEntry {
                id: stream_id.id,
                data,
            });
        }
        Ok(entries)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// In-memory stream for tests. Appended entries get zero-padded ids so
/// lexicographic order matches append order.
#[derive(Default)]
pub struct MemoryEventStream {
    streams: DashMap<String, Vec<StreamEntry>>,
    sequence: AtomicU64,
}

impl MemoryEventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload, returning the generated entry id.
    pub fn append(&self, stream: &str, data: impl Into<String>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{seq:016}-0");
        self.streams
            .entry(stream.to_string())
            .or_default()
            .push(StreamEntry {
                id: id.clone(),
                data: data.into(),
            });
        id
    }
}

#[async_trait]
impl EventStream for MemoryEventStream {
    async fn read_after(
        &self,
        stream: &str,
        after: Option<&str>,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let entries = match self.streams.get(stream) {
            Some(entries) => entries.clone(),
            None => return Ok(Vec::new()),
        };

        let result = entries
            .into_iter()
            .filter(|entry| match after {
                Some(after) => entry.id.as_str() > after,
                None => true,
            })
            .take(count)
            .collect();
        Ok(result)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_stream_reads_strictly_after() {
        let stream = MemoryEventStream::new();
        let first = stream.append("events:orders", "a");
        let second = stream.append("events:orders", "b");
        stream.append("events:orders", "c");

        let all = stream.read_after("events:orders", None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let rest = stream
            .read_after("events:orders", Some(&first), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].id, second);

        let bounded = stream
            .read_after("events:orders", None, 2)
            .await
            .unwrap();
        assert_eq!(bounded.len(), 2);
    }
}
