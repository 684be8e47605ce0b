use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A mailbox participant (sender or recipient)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub name: Option<String>,
    pub email: String,
}

impl Participant {
    pub fn new(name: Option<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.filter(|n| !n.trim().is_empty()),
            email: email.into(),
        }
    }

    /// Name if known, otherwise the address
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }

    /// RFC 822 address header value; non-ASCII names become encoded words
    pub fn to_header(&self) -> String {
        match &self.name {
            Some(name) => {
                let name = name.replace(['"', '\r', '\n'], "");
                if name.is_ascii() {
                    format!("\"{}\" <{}>", name, self.email)
                } else {
                    format!("{} <{}>", encode_header_text(&name), self.email)
                }
            }
            None => self.email.clone(),
        }
    }
}

/// UTF-8 bytes per encoded word; 45 bytes of base64 plus the `=?UTF-8?B??=`
/// wrapper stays under the 75 character limit
const ENCODED_WORD_BYTES: usize = 45;

/// RFC 2047 header text: ASCII passes through, anything else becomes
/// `=?UTF-8?B?...?=` words split on character boundaries and folded
pub fn encode_header_text(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
    }
    words.join("\r\n ")
}

/// A message as read from the mail provider
///
/// Required fields are validated when the provider payload is parsed; anything
/// the triage pipeline does not use is kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub snippet: String,
    /// None when the provider payload has no parseable sender address
    pub sender: Option<Participant>,
    /// RFC 822 Message-ID header, used to thread replies
    pub message_id_header: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MailMessage {
    pub fn sender_email(&self) -> Option<&str> {
        self.sender.as_ref().map(|s| s.email.as_str())
    }

    /// Subject used for replies to this message
    pub fn reply_subject(&self) -> String {
        format!("Re: {}", self.subject)
    }
}

/// Triage category of a message
///
/// Known categories drive the dispatcher; any other name from the category
/// table or the model is carried as `Other` and gets no automated action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    /// Keyword override of the URGENT_P0 category
    Emergency,
    UrgentP0,
    ActionRequired,
    CalendarSync,
    LowSignal,
    SecurityRisk,
    Other(String),
}

impl Category {
    pub const EMERGENCY: &'static str = "Emergency";
    pub const URGENT_P0: &'static str = "URGENT_P0";
    pub const ACTION_REQUIRED: &'static str = "ACTION_REQUIRED";
    pub const CALENDAR_SYNC: &'static str = "CALENDAR_SYNC";
    pub const LOW_SIGNAL: &'static str = "LOW_SIGNAL";
    pub const SECURITY_RISK: &'static str = "SECURITY_RISK";

    /// Parse a category name, ignoring case and surrounding whitespace
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.to_uppercase().as_str() {
            "EMERGENCY" => Category::Emergency,
            "URGENT_P0" => Category::UrgentP0,
            "ACTION_REQUIRED" => Category::ActionRequired,
            "CALENDAR_SYNC" => Category::CalendarSync,
            "LOW_SIGNAL" => Category::LowSignal,
            "SECURITY_RISK" => Category::SecurityRisk,
            _ => Category::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Emergency => Self::EMERGENCY,
            Category::UrgentP0 => Self::URGENT_P0,
            Category::ActionRequired => Self::ACTION_REQUIRED,
            Category::CalendarSync => Self::CALENDAR_SYNC,
            Category::LowSignal => Self::LOW_SIGNAL,
            Category::SecurityRisk => Self::SECURITY_RISK,
            Category::Other(name) => name,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Category::parse(name)
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Category::parse(&name))
    }
}

/// Result of classifying one message, by keyword override or by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub category: Category,
    pub summary: String,
    pub suggested_action: String,
}

/// A busy period returned by a free/busy query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusySlot {
    pub calendar: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A folder (or label, for label-based providers)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
}

/// Reply to be saved as a draft or sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    pub to: Participant,
    pub subject: String,
    pub body: String,
    /// Provider id of the message being answered
    pub reply_to_message_id: String,
    pub thread_id: Option<String>,
    /// Message-ID header of the message being answered
    pub in_reply_to: Option<String>,
}

impl OutgoingReply {
    /// Build a reply to `message`; None when the message has no sender address
    pub fn to_message(message: &MailMessage, body: String) -> Option<Self> {
        let to = message.sender.clone()?;
        Some(Self {
            to,
            subject: message.reply_subject(),
            body,
            reply_to_message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            in_reply_to: message.message_id_header.clone(),
        })
    }
}

/// The automated action taken for a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionOutcome {
    DraftSaved { draft_id: String, to: String },
    ReplySent { message_id: String, to: String },
    MovedToFolder { folder_id: String, folder_name: String },
    Flagged,
    Skipped { reason: String },
    NoAction,
    DryRun { planned: String },
}

/// Per-message outcome of a sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub message_id: String,
    pub subject: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
    /// Keyword that short-circuited AI classification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SweepResult {
    pub fn succeeded(
        message: &MailMessage,
        analysis: Analysis,
        override_keyword: Option<String>,
        action: ActionOutcome,
    ) -> Self {
        Self {
            message_id: message.id.clone(),
            subject: message.subject.clone(),
            success: true,
            analysis: Some(analysis),
            override_keyword,
            action: Some(action),
            error: None,
        }
    }

    pub fn failed(message: &MailMessage, error: &crate::error::TriageError) -> Self {
        Self {
            subject: message.subject.clone(),
            ..Self::fetch_failed(&message.id, error)
        }
    }

    /// A listed message that could not be fetched; its subject is unknown
    pub fn fetch_failed(message_id: &str, error: &crate::error::TriageError) -> Self {
        Self {
            message_id: message_id.to_string(),
            subject: String::new(),
            success: false,
            analysis: None,
            override_keyword: None,
            action: None,
            error: Some(error.to_string()),
        }
    }
}
