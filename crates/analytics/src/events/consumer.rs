use super::stream::EventStream;
use super::types::StreamEvent;
use super::{STREAM_ORDERS, STREAM_PAYMENTS};
use crate::error::Result;
use crate::model::DailySalesMetric;
use crate::repository::AnalyticsRepository;
use restock_core::Clock;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of one `consume` invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeReport {
    pub processed: u64,
    pub failed: u64,
    pub last_event_id: Option<String>,
}

/// Drains ordered append-only streams and applies events to the metric
/// tables with at-least-once semantics.
///
/// The read position for `(consumer_name, stream)` advances only past
/// successfully handled events, and is persisted per event. A crash
/// between handling an event and persisting its position replays that
/// event on restart; handlers therefore upsert against uniquely keyed
/// rows. Exactly one consumer instance runs per `(consumer_name, stream)`
/// logical key. Shutdown finishes the current event before stopping.
pub struct EventConsumer {
    consumer_name: String,
    stream: Arc<dyn EventStream>,
    repo: Arc<dyn AnalyticsRepository>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl EventConsumer {
    pub fn new(
        consumer_name: impl Into<String>,
        stream: Arc<dyn EventStream>,
        repo: Arc<dyn AnalyticsRepository>,
        clock: Arc<dyn Clock>,
        batch_size: usize,
    ) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            stream,
            repo,
            clock,
            batch_size,
        }
    }

    /// Drain a bounded batch from the orders stream.
    pub async fn consume_orders(&self) -> Result<ConsumeReport> {
        self.consume(STREAM_ORDERS).await
    }

    /// Drain a bounded batch from the payments stream.
    pub async fn consume_payments(&self) -> Result<ConsumeReport> {
        self.consume(STREAM_PAYMENTS).await
    }

    /// Drain up to `batch_size` events strictly after the persisted
    /// position. A failed event is logged and skipped; the position does
    /// not advance for it, but later successes advance past it.
    pub async fn consume(&self, stream_name: &str) -> Result<ConsumeReport> {
        let position = self.repo.load_position(&self.consumer_name, stream_name).await?;
        if position.is_none() {
            info!(stream = stream_name, "first read, consuming from the start");
        }

        let entries = self
            .stream
            .read_after(stream_name, position.as_deref(), self.batch_size)
            .await?;

        let mut report = ConsumeReport::default();

        for entry in entries {
            match self.apply(&entry.data).await {
                Ok(()) => {
                    self.repo
                        .store_position(
                            &self.consumer_name,
                            stream_name,
                            &entry.id,
                            self.clock.now(),
                        )
                        .await?;
                    report.processed += 1;
                    report.last_event_id = Some(entry.id);
                }
                Err(e) => {
                    error!(
                        stream = stream_name,
                        event_id = %entry.id,
                        error = %e,
                        "failed to process event, skipping"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.processed > 0 {
            info!(
                stream = stream_name,
                processed = report.processed,
                "processed stream events"
            );
        }

        Ok(report)
    }

    async fn apply(&self, data: &str) -> Result<()> {
        match StreamEvent::decode(data)? {
            StreamEvent::OrderCreated(order) => {
                let date = order.effective_date()?;
                let mut metric = match self.repo.daily_sales_on(date).await? {
                    Some(metric) => metric,
                    None => DailySalesMetric::empty(date, self.clock.now()),
                };
                metric.apply_order(order.total, order.quantity_sum());
                metric.calculated_at = self.clock.now();
                self.repo.upsert_daily_sales(&metric).await?;
                debug!(order_id = order.order_id, %date, "applied order.created");
            }
            StreamEvent::OrderUpdated { order_id } => {
                // Status changes only; no metric impact.
                debug!(order_id, "order.updated observed");
            }
            StreamEvent::OrderCancelled(cancel) => {
                // Without an explicit order_date the cancellation debits
                // today's metric.
                let date = cancel.order_date.unwrap_or_else(|| self.clock.today());
                if let Some(mut metric) = self.repo.daily_sales_on(date).await? {
                    metric.apply_cancellation(cancel.total);
                    metric.calculated_at = self.clock.now();
                    self.repo.upsert_daily_sales(&metric).await?;
                }
                debug!(order_id = cancel.order_id, %date, "applied order.cancelled");
            }
            StreamEvent::PaymentCreated { payment_id } => {
                debug!(payment_id, "payment recorded");
            }
            StreamEvent::Other { event_type } => {
                debug!(%event_type, "ignoring unhandled event type");
            }
        }
        Ok(())
    }

    /// Verify the stream backend is reachable.
    pub async fn health_check(&self) -> bool {
        match self.stream.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "event stream health check failed");
                false
            }
        }
    }
}
