use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

/// Hard cap on message content length, in characters.
pub const MAX_MESSAGE_CONTENT: usize = 5000;
/// Hard cap on query length, in characters.
pub const MAX_QUERY_LENGTH: usize = 1000;
/// Hard cap on selected text carried in a request, in characters.
pub const MAX_SELECTED_TEXT: usize = 1000;
/// Hard cap on messages per session.
pub const MAX_SESSION_MESSAGES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    #[default]
    Sent,
    Error,
    /// The backend answered but reported no relevant content for the query.
    NoContent,
}

/// One turn in the conversation. Immutable once created except for status
/// transitions performed by the owning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        sender: Sender,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let id: String = id.into();
        let message = Message {
            id: id.trim().to_string(),
            content: content.into(),
            sender,
            timestamp,
            sources: Vec::new(),
            status: MessageStatus::Sent,
        };
        message.validate()?;
        Ok(message)
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Result<Self> {
        self.sources = sources.into_iter().map(|s| s.trim().to_string()).collect();
        self.validate()?;
        Ok(self)
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation(
                "Message ID must be a non-empty string".into(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(Error::Validation(
                "Message content must be a non-empty string".into(),
            ));
        }
        if self.content.chars().count() > MAX_MESSAGE_CONTENT {
            return Err(Error::Validation(format!(
                "Message content must be less than {} characters",
                MAX_MESSAGE_CONTENT
            )));
        }
        for source in &self.sources {
            if source.trim().is_empty() {
                return Err(Error::Validation(
                    "Each source must be a non-empty string".into(),
                ));
            }
        }
        Ok(())
    }

    /// Rebuild a message from its plain serialized form, re-validating fields.
    pub fn from_plain(value: Value) -> Result<Self> {
        let mut message: Message =
            serde_json::from_value(value).map_err(|e| Error::Validation(e.to_string()))?;
        message.id = message.id.trim().to_string();
        message.sources = message
            .sources
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect();
        message.validate()?;
        Ok(message)
    }

    pub fn to_plain(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// One ongoing conversation thread tied to a page visit.
///
/// Owns its message list exclusively: messages enter only through
/// [`Session::add_message`], which enforces the capacity cap and refreshes
/// `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub page_url: String,
    #[serde(default)]
    pub selected_text: String,
    #[serde(default)]
    messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, page_url: impl Into<String>) -> Result<Self> {
        let now = Utc::now();
        let id: String = id.into();
        let session = Session {
            id: id.trim().to_string(),
            page_url: page_url.into(),
            selected_text: String::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        session.validate()?;
        Ok(session)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation(
                "Session ID must be a non-empty string".into(),
            ));
        }
        reqwest::Url::parse(&self.page_url)
            .map_err(|_| Error::Validation("Page URL must be a valid URL format".into()))?;
        if self.selected_text.chars().count() > MAX_SELECTED_TEXT {
            return Err(Error::Validation(format!(
                "Selected text must be less than {} characters",
                MAX_SELECTED_TEXT
            )));
        }
        if self.messages.len() > MAX_SESSION_MESSAGES {
            return Err(Error::Validation(format!(
                "Session must not exceed {} messages",
                MAX_SESSION_MESSAGES
            )));
        }
        for message in &self.messages {
            message.validate()?;
        }
        Ok(())
    }

    /// Append a message, failing once the session is at capacity.
    pub fn add_message(&mut self, message: Message) -> Result<()> {
        if self.messages.len() >= MAX_SESSION_MESSAGES {
            return Err(Error::SessionFull(MAX_SESSION_MESSAGES));
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_selected_text(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        if text.chars().count() > MAX_SELECTED_TEXT {
            return Err(Error::Validation(format!(
                "Selected text must be less than {} characters",
                MAX_SELECTED_TEXT
            )));
        }
        self.selected_text = text;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn from_plain(value: Value) -> Result<Self> {
        let mut session: Session =
            serde_json::from_value(value).map_err(|e| Error::Validation(e.to_string()))?;
        session.id = session.id.trim().to_string();
        session.validate()?;
        Ok(session)
    }

    pub fn to_plain(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Read-only context about the host page, consumed when building requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
}

/// An outbound query with its page context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub query: String,
    #[serde(default)]
    pub selected_text: String,
    #[serde(default)]
    pub page_context: PageContext,
    pub timestamp: DateTime<Utc>,
}

impl ApiRequest {
    pub fn new(
        query: impl Into<String>,
        selected_text: impl Into<String>,
        page_context: PageContext,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let request = ApiRequest {
            query: query.into(),
            selected_text: selected_text.into(),
            page_context,
            timestamp,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::Validation("Query must be a non-empty string".into()));
        }
        if self.query.chars().count() > MAX_QUERY_LENGTH {
            return Err(Error::Validation(format!(
                "Query must be less than {} characters",
                MAX_QUERY_LENGTH
            )));
        }
        if self.selected_text.chars().count() > MAX_SELECTED_TEXT {
            return Err(Error::Validation(format!(
                "Selected text must be less than {} characters",
                MAX_SELECTED_TEXT
            )));
        }
        Ok(())
    }

    pub fn from_plain(value: Value) -> Result<Self> {
        let request: ApiRequest =
            serde_json::from_value(value).map_err(|e| Error::Validation(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn to_plain(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A normalized backend answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub retrieved_context: Vec<String>,
    #[serde(default)]
    pub followup_questions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

fn default_confidence() -> f64 {
    0.5
}

impl ApiResponse {
    pub fn new(
        answer: impl Into<String>,
        sources: Vec<String>,
        confidence: Option<f64>,
        retrieved_context: Vec<String>,
        followup_questions: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let response = ApiResponse {
            answer: answer.into(),
            sources,
            confidence: confidence.unwrap_or_else(default_confidence),
            retrieved_context,
            followup_questions,
            timestamp,
        };
        response.validate()?;
        Ok(response)
    }

    pub fn validate(&self) -> Result<()> {
        if self.answer.trim().is_empty() {
            return Err(Error::Validation(
                "Answer must be a non-empty string".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Validation(
                "Confidence must be a number between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn from_plain(value: Value) -> Result<Self> {
        let response: ApiResponse =
            serde_json::from_value(value).map_err(|e| Error::Validation(e.to_string()))?;
        response.validate()?;
        Ok(response)
    }

    pub fn to_plain(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
