//! Chat transcript types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Model,
    System,
}

/// Per-URL retrieval status reported by the model when it fetched
/// supplied URLs for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRetrieval {
    pub url: String,
    pub status: String,
}

/// One entry in the transcript.
///
/// A loading placeholder (`is_loading`) stands in for the model's reply
/// until the request resolves; it is then replaced in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<Vec<UrlRetrieval>>,
}

impl ChatMessage {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            is_loading: false,
            retrieval: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Sender::Model, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    /// A "thinking" placeholder awaiting the model's reply.
    pub fn loading() -> Self {
        let mut msg = Self::new(Sender::Model, "Thinking...");
        msg.is_loading = true;
        msg
    }

    pub fn with_retrieval(mut self, retrieval: Vec<UrlRetrieval>) -> Self {
        if !retrieval.is_empty() {
            self.retrieval = Some(retrieval);
        }
        self
    }
}
