use chrono::Utc;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Message;

const TITLE_MAX_CHARS: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub model: String,
    pub timestamp: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: &str) -> Conversation {
        return Conversation {
            id: id.to_string(),
            title: "".to_string(),
            model: "".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            messages: vec![],
        };
    }

    /// Appends a message, dropping the oldest ones once `limit` is exceeded.
    pub fn push(&mut self, message: Message, limit: usize) {
        if self.title.is_empty() {
            self.title = message.content.chars().take(TITLE_MAX_CHARS).collect();
        }

        self.messages.push(message);
        if self.messages.len() > limit {
            let overflow = self.messages.len() - limit;
            self.messages.drain(..overflow);
        }
        self.timestamp = Utc::now().to_rfc3339();
    }
}
