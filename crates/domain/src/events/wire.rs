//! The flat JSON payload shared by every service.

use std::str::FromStr;

use common::{CorrelationId, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event discriminator. Doubles as the routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "product.creating")]
    ProductCreating,
    #[serde(rename = "product.updating")]
    ProductUpdating,
    #[serde(rename = "product.deleted")]
    ProductDeleted,
    #[serde(rename = "product.creating.completed")]
    ProductCreatingCompleted,
    #[serde(rename = "product.deleted.completed")]
    ProductDeletedCompleted,
    #[serde(rename = "image.uploaded")]
    ImageUploaded,
    #[serde(rename = "image.created")]
    ImageCreated,
    #[serde(rename = "image.processed")]
    ImageProcessed,
    #[serde(rename = "image.deleted")]
    ImageDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProductCreating => "product.creating",
            EventType::ProductUpdating => "product.updating",
            EventType::ProductDeleted => "product.deleted",
            EventType::ProductCreatingCompleted => "product.creating.completed",
            EventType::ProductDeletedCompleted => "product.deleted.completed",
            EventType::ImageUploaded => "image.uploaded",
            EventType::ImageCreated => "image.created",
            EventType::ImageProcessed => "image.processed",
            EventType::ImageDeleted => "image.deleted",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown event type '{s}'"))
    }
}

/// The wire payload.
///
/// Only `event_type` and `product_id` are always present; `product_id` is 0
/// until the store has assigned one. An absent price and a zero price are
/// distinct values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleMessage {
    pub event_type: EventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    pub product_id: ProductId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub image_data: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LifecycleMessage {
    /// Creates a message with only the discriminator, correlation and product set.
    pub fn new(event_type: EventType, correlation_id: CorrelationId, product_id: ProductId) -> Self {
        Self {
            event_type,
            correlation_id: Some(correlation_id),
            product_id,
            name: None,
            price: None,
            description: None,
            image_url: None,
            filename: None,
            image_data: None,
            error: None,
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_message_round_trip() {
        let mut message = LifecycleMessage::new(
            EventType::ProductCreating,
            CorrelationId::new(),
            ProductId::new(42),
        );
        message.name = Some("Desk Lamp".to_string());
        message.price = Some(Decimal::from_str("19.99").unwrap());
        message.description = Some("Warm light".to_string());
        message.image_url = Some("http://localhost/images/42.jpg".to_string());
        message.filename = Some("lamp.jpg".to_string());
        message.image_data = Some(vec![0xFF, 0xD8, 0x00, 0x01]);
        message.error = Some("boom".to_string());

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["event_type"], "product.creating");
        assert_eq!(json["product_id"], 42);
        assert_eq!(json["price"], "19.99");
        assert_eq!(json["image_data"], "/9gAAQ==");

        let decoded: LifecycleMessage = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_zero_price_is_not_absent_price() {
        let mut zero = LifecycleMessage::new(
            EventType::ProductUpdating,
            CorrelationId::new(),
            ProductId::new(1),
        );
        zero.price = Some(Decimal::ZERO);
        let json = serde_json::to_string(&zero).unwrap();
        let decoded: LifecycleMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.price, Some(Decimal::ZERO));

        let mut absent = zero.clone();
        absent.price = None;
        let json = serde_json::to_value(&absent).unwrap();
        assert!(json.get("price").is_none());
        let decoded: LifecycleMessage = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.price, None);
    }

    #[test]
    fn test_minimal_payload_decodes() {
        let decoded: LifecycleMessage =
            serde_json::from_str(r#"{"event_type":"product.deleted","product_id":7}"#).unwrap();
        assert_eq!(decoded.event_type, EventType::ProductDeleted);
        assert_eq!(decoded.product_id, ProductId::new(7));
        assert!(decoded.correlation_id.is_none());
        assert!(decoded.image_url.is_none());
    }

    #[test]
    fn test_bad_base64_is_rejected() {
        let result: Result<LifecycleMessage, _> = serde_json::from_str(
            r#"{"event_type":"image.uploaded","product_id":7,"image_data":"not base64!"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_event_type_parses_routing_keys() {
        assert_eq!(
            "product.deleted.completed".parse::<EventType>(),
            Ok(EventType::ProductDeletedCompleted)
        );
        assert_eq!(EventType::ImageProcessed.to_string(), "image.processed");
        assert!("image.exploded".parse::<EventType>().is_err());
    }
}
