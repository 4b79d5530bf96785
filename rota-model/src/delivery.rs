/// Where notifications about an issued value should be sent: the chat the
/// request arrived in and, optionally, the message to reply to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeliveryContext {
    pub chat_id: i64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub message_id: Option<i64>,
}

impl DeliveryContext {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            message_id: None,
        }
    }

    pub fn replying_to(chat_id: i64, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id: Some(message_id),
        }
    }
}
