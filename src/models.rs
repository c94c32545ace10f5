use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{NotifyError, Result};

/// Server-assigned notification identifier. The backend sends integers for
/// persisted rows and strings for some push-only events, so both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for NotificationId {
    fn from(id: i64) -> Self {
        NotificationId(id.to_string())
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        NotificationId(id.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(id: String) -> Self {
        NotificationId(id)
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Int(i64),
            Text(String),
        }

        match WireId::deserialize(deserializer)? {
            WireId::Int(id) => Ok(id.into()),
            WireId::Text(id) if id.trim().is_empty() => {
                Err(serde::de::Error::custom("notification id is empty"))
            }
            WireId::Text(id) => Ok(id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ChatMessage,
    PriceOffer,
    Promotion,
    Generic,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::ChatMessage,
        Category::PriceOffer,
        Category::Promotion,
        Category::Generic,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "chat_message" | "chatMessage" | "chat" => Some(Category::ChatMessage),
            "price_offer" | "priceOffer" | "offer" => Some(Category::PriceOffer),
            "promotion" => Some(Category::Promotion),
            "generic" => Some(Category::Generic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub id: NotificationId,
    pub created_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub category: Category,
    pub title: String,
    pub body: String,
    pub sender_id: Option<i64>,
    pub sender_email: Option<String>,
    pub price_offer: Option<f64>,
    pub repair_id: Option<i64>,
    pub offer_id: Option<i64>,
    pub promotion_id: Option<i64>,
}

impl NotificationEvent {
    pub fn new(id: impl Into<NotificationId>, category: Category) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            is_read: false,
            category,
            title: String::new(),
            body: String::new(),
            sender_id: None,
            sender_email: None,
            price_offer: None,
            repair_id: None,
            offer_id: None,
            promotion_id: None,
        }
    }

    /// Sort key; entries without a usable timestamp count as the oldest.
    pub fn sort_timestamp(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

// Shape the backend actually sends. Field names drifted between snake_case and
// camelCase across endpoints, and linked resources are sometimes nested objects.
#[derive(Debug, Deserialize)]
struct WireNotification {
    id: NotificationId,
    #[serde(default, alias = "createdAt")]
    created_at: Option<serde_json::Value>,
    #[serde(default, alias = "isRead")]
    is_read: Option<bool>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "senderId")]
    sender_id: Option<serde_json::Value>,
    #[serde(default, alias = "senderEmail")]
    sender_email: Option<String>,
    #[serde(default, alias = "priceOffer")]
    price_offer: Option<serde_json::Value>,
    #[serde(default, alias = "repairId")]
    repair_id: Option<serde_json::Value>,
    #[serde(default)]
    repair: Option<serde_json::Value>,
    #[serde(default, alias = "offerId")]
    offer_id: Option<serde_json::Value>,
    #[serde(default)]
    offer: Option<serde_json::Value>,
    #[serde(default, alias = "promotionId")]
    promotion_id: Option<serde_json::Value>,
    #[serde(default, alias = "isPromotion")]
    is_promotion: Option<bool>,
}

impl From<WireNotification> for NotificationEvent {
    fn from(wire: WireNotification) -> Self {
        let repair_id = wire
            .repair_id
            .as_ref()
            .and_then(link_id)
            .or_else(|| wire.repair.as_ref().and_then(link_id));
        let offer_id = wire
            .offer_id
            .as_ref()
            .and_then(link_id)
            .or_else(|| wire.offer.as_ref().and_then(link_id));
        let promotion_id = wire.promotion_id.as_ref().and_then(link_id);
        let sender_id = wire.sender_id.as_ref().and_then(link_id);
        let price_offer = wire.price_offer.as_ref().and_then(number_value);

        let category = wire
            .category
            .as_deref()
            .and_then(Category::parse)
            .unwrap_or_else(|| {
                if promotion_id.is_some() || wire.is_promotion == Some(true) {
                    Category::Promotion
                } else if offer_id.is_some() || price_offer.is_some() {
                    Category::PriceOffer
                } else if repair_id.is_some() || sender_id.is_some() || wire.sender_email.is_some() {
                    Category::ChatMessage
                } else {
                    Category::Generic
                }
            });

        NotificationEvent {
            id: wire.id,
            created_at: wire.created_at.as_ref().and_then(parse_timestamp),
            is_read: wire.is_read.unwrap_or(false),
            category,
            title: wire.title.unwrap_or_default(),
            body: wire.body.or(wire.message).unwrap_or_default(),
            sender_id,
            sender_email: wire.sender_email,
            price_offer,
            repair_id,
            offer_id,
            promotion_id,
        }
    }
}

impl<'de> Deserialize<'de> for NotificationEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        WireNotification::deserialize(deserializer).map(NotificationEvent::from)
    }
}

/// Decode one inbound live-channel message.
pub fn decode_payload(text: &str) -> Result<NotificationEvent> {
    serde_json::from_str(text).map_err(|e| NotifyError::MalformedPayload(e.to_string()))
}

fn link_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Object(map) => map.get("id").and_then(link_id),
        _ => None,
    }
}

fn number_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        // Epoch values above this bound are milliseconds.
        serde_json::Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}
