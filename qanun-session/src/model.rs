//! Conversation data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque session identifier (a UUID v4 string).
pub type SessionId = String;

/// Opaque visitor identifier, stable across that visitor's sessions.
pub type OwnerId = String;

/// Title shown in the history list for a session without messages ("empty conversation").
pub const EMPTY_TITLE: &str = "محادثة فارغة";

const TITLE_CHARS: usize = 40;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub time: DateTime<Utc>,
}

impl Message {
    /// A message stamped with the current time.
    pub fn now(role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into(), time: Utc::now() }
    }
}

/// Full transcript of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub owner: OwnerId,
    pub created: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// One row of a visitor's history list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: SessionId,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

/// History title for a conversation: its opening words, or [`EMPTY_TITLE`].
pub fn title_for(messages: &[Message]) -> String {
    match messages.first() {
        Some(first) => {
            let mut title: String = first.text.chars().take(TITLE_CHARS).collect();
            title.push_str("...");
            title
        }
        None => EMPTY_TITLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_first_forty_characters() {
        let long = "ما هي أحكام المادة 23 من قانون المسطرة الجنائية المغربي؟";
        let messages = vec![Message::now(Role::User, long), Message::now(Role::Bot, "answer")];
        let title = title_for(&messages);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 43);
        assert!(long.starts_with(title.trim_end_matches("...")));
    }

    #[test]
    fn empty_conversation_title() {
        assert_eq!(title_for(&[]), EMPTY_TITLE);
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Bot).unwrap(), "\"bot\"");
    }
}
