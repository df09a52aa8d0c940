//! Event ingestion from the append-only order/payment streams.

mod consumer;
mod stream;
mod types;

pub use consumer::{ConsumeReport, EventConsumer};
pub use stream::{EventStream, MemoryEventStream, RedisEventStream, StreamEntry};
pub use types::{OrderCancelled, OrderCreated, OrderLine, StreamEvent};

/// Streams the analytics consumer drains.
pub const STREAM_ORDERS: &str = "events:orders";
pub const STREAM_PAYMENTS: &str = "events:payments";
pub const STREAM_SHIPMENTS: &str = "events:shipments";
