//! Push message envelope

use crate::types::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message envelope: `{type, channel, data}` plus routing metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Event type, e.g. `fee_adjusted`
    #[serde(rename = "type")]
    pub event_type: String,

    /// Channel
    pub channel: Channel,

    /// Payload
    pub data: serde_json::Value,

    /// Message ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// Entity the event concerns (pool address, proposal id, user)
    pub key: String,

    /// Publication time
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create new message
    pub fn new(
        channel: Channel,
        event_type: impl Into<String>,
        key: impl Into<String>,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            channel,
            data,
            id: Uuid::now_v7(),
            key: key.into(),
            timestamp,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let msg = Message::new(
            Channel::PoolUpdates,
            "fee_adjusted",
            "0xabc",
            json!({"newFeeRate": 35}),
            Utc::now(),
        );

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "fee_adjusted");
        assert_eq!(value["channel"], "pool_updates");
        assert_eq!(value["data"]["newFeeRate"], 35);
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::new(
            Channel::VoteUpdates,
            "vote_cast",
            "7",
            json!({"voter": "0x01"}),
            Utc::now(),
        );

        let bytes = msg.to_bytes().unwrap();
        let decoded = Message::from_bytes(&bytes).unwrap();

        assert_eq!(msg.id, decoded.id);
        assert_eq!(msg.channel, decoded.channel);
        assert_eq!(msg.data, decoded.data);
    }
}
