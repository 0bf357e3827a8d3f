use uuid::Uuid;

pub const BOOKING_STATUS_TOPIC: &str = "booking.status_changed";
pub const PAYMENT_STATUS_TOPIC: &str = "payment.status_changed";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingStatusChangedEvent {
    pub booking_id: Uuid,
    pub owner_id: String,
    pub status: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct PaymentStatusChangedEvent {
    pub booking_id: Uuid,
    pub tran_id: String,
    pub status: String,
    pub timestamp: i64,
}

/// Fire-and-forget notification emitted after a committed status change.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    BookingStatusChanged(BookingStatusChangedEvent),
    PaymentStatusChanged(PaymentStatusChangedEvent),
}

impl NotificationEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            NotificationEvent::BookingStatusChanged(_) => BOOKING_STATUS_TOPIC,
            NotificationEvent::PaymentStatusChanged(_) => PAYMENT_STATUS_TOPIC,
        }
    }

    /// Partition key: events for one booking stay ordered.
    pub fn key(&self) -> String {
        match self {
            NotificationEvent::BookingStatusChanged(e) => e.booking_id.to_string(),
            NotificationEvent::PaymentStatusChanged(e) => e.booking_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_routing() {
        let booking_id = Uuid::new_v4();
        let event = NotificationEvent::PaymentStatusChanged(PaymentStatusChangedEvent {
            booking_id,
            tran_id: "BK1234ABCD".to_string(),
            status: "success".to_string(),
            timestamp: 0,
        });

        assert_eq!(event.topic(), PAYMENT_STATUS_TOPIC);
        assert_eq!(event.key(), booking_id.to_string());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "payment_status_changed");
        assert_eq!(json["tran_id"], "BK1234ABCD");
    }
}
