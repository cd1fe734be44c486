use serde::{Deserialize, Serialize};

use crate::models::{Message, UserId};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the session is registered with the hub
    Ready { user_id: UserId },

    /// A message was persisted on one of the user's connections
    MessageCreate(Message),
}

impl From<Message> for GatewayEvent {
    fn from(message: Message) -> Self {
        Self::MessageCreate(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_message_create_shape() {
        let event = GatewayEvent::from(Message {
            id: 3,
            connection_id: 8,
            sender_id: 1,
            content: "hi".into(),
            created_at: Utc::now(),
            read_at: None,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "MessageCreate");
        assert_eq!(value["data"]["sender_id"], 1);
        assert_eq!(value["data"]["connection_id"], 8);
        assert!(value["data"]["read_at"].is_null());
    }
}
