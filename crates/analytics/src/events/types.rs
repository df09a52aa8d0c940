use crate::error::{AnalyticsError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One order line inside an `order.created` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: i64,
    /// ISO timestamp the producer stamped on the event.
    pub timestamp: String,
    /// Business date of the order; falls back to the timestamp's date.
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    pub total: Decimal,
    #[serde(default)]
    pub details: Vec<OrderLine>,
    #[serde(default)]
    pub customer_id: Option<i64>,
}

impl OrderCreated {
    /// The day this order lands on: the explicit `order_date`, else the
    /// date part of the timestamp.
    pub fn effective_date(&self) -> Result<NaiveDate> {
        if let Some(date) = self.order_date {
            return Ok(date);
        }
        let day = self.timestamp.split('T').next().unwrap_or_default();
        day.parse::<NaiveDate>().map_err(|_| {
            AnalyticsError::EventDecode(format!(
                "order {}: unparseable timestamp `{}`",
                self.order_id, self.timestamp
            ))
        })
    }

    pub fn quantity_sum(&self) -> i64 {
        self.details.iter().map(|line| line.quantity).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: i64,
    pub total: Decimal,
    /// Cancellations usually omit the original order date; in that case
    /// the consumer debits today's metric.
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
}

/// Decoded stream event. Unknown event types decode to `Other` and advance
/// the position without side effects.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    OrderCreated(OrderCreated),
    OrderUpdated { order_id: i64 },
    OrderCancelled(OrderCancelled),
    PaymentCreated { payment_id: i64 },
    Other { event_type: String },
}

impl StreamEvent {
    /// Decode the `data` payload of a stream entry.
    pub fn decode(data: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| AnalyticsError::EventDecode(format!("malformed event JSON: {e}")))?;

        let event_type = value
            .get("event_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AnalyticsError::EventDecode("event without event_type".to_string()))?
            .to_string();

        let decoded = match event_type.as_str() {
            "order.created" => StreamEvent::OrderCreated(
                serde_json::from_value(value)
                    .map_err(|e| AnalyticsError::EventDecode(format!("order.created: {e}")))?,
            ),
            "order.updated" => StreamEvent::OrderUpdated {
                order_id: value
                    .get("order_id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or_default(),
            },
            "order.cancelled" => StreamEvent::OrderCancelled(
                serde_json::from_value(value)
                    .map_err(|e| AnalyticsError::EventDecode(format!("order.cancelled: {e}")))?,
            ),
            "payment.created" => StreamEvent::PaymentCreated {
                payment_id: value
                    .get("payment_id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or_default(),
            },
            _ => StreamEvent::Other { event_type },
        };

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_order_created() {
        let data = r#"{
            "event_type": "order.created",
            "order_id": 42,
            "timestamp": "2025-03-10T14:30:00",
            "total": 1000,
            "details": [{"product_id": 7, "quantity": 2}],
            "customer_id": 9
        }"#;

        let event = StreamEvent::decode(data).unwrap();
        match event {
            StreamEvent::OrderCreated(order) => {
                assert_eq!(order.order_id, 42);
                assert_eq!(order.quantity_sum(), 2);
                assert_eq!(
                    order.effective_date().unwrap(),
                    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn explicit_order_date_wins_over_timestamp() {
        let data = r#"{
            "event_type": "order.created",
            "order_id": 1,
            "timestamp": "2025-03-11T01:00:00",
            "order_date": "2025-03-10",
            "total": 100
        }"#;
        match StreamEvent::decode(data).unwrap() {
            StreamEvent::OrderCreated(order) => assert_eq!(
                order.effective_date().unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
            ),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_passthrough() {
        let data = r#"{"event_type": "refund.created", "refund_id": 3}"#;
        match StreamEvent::decode(data).unwrap() {
            StreamEvent::Other { event_type } => assert_eq!(event_type, "refund.created"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        assert!(StreamEvent::decode("{oops").is_err());
        assert!(StreamEvent::decode(r#"{"no_type": 1}"#).is_err());
    }
}
