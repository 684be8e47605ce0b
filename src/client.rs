//! Mail provider client: Gmail messages/labels/drafts plus Calendar free/busy

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_calendar3::api::{FreeBusyRequest, FreeBusyRequestItem};
use google_gmail1::api::{Draft, Label, Message, ModifyMessageRequest};
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{CalendarHub, GmailHub, MailboxHubs};
use crate::error::{Result, TriageError};
use crate::models::{
    encode_header_text, BusySlot, FolderInfo, MailMessage, OutgoingReply, Participant,
};

const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const GMAIL_LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";
const GMAIL_COMPOSE_SCOPE: &str = "https://www.googleapis.com/auth/gmail.compose";
const CALENDAR_FREEBUSY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.freebusy";

/// Upper bound on any single provider call
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers requested when fetching message metadata
const METADATA_HEADERS: &[&str] = &["From", "Subject", "Message-ID", "Date"];

/// Trait defining mail provider operations for easier testing
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Ids of the most recent messages matching the configured mailbox query, newest first
    async fn list_recent_ids(&self, limit: usize) -> Result<Vec<String>>;

    /// Fetch one message by id
    async fn get_message(&self, id: &str) -> Result<MailMessage>;

    /// Move a message into a folder, removing it from the inbox
    async fn move_to_folder(&self, message_id: &str, folder_id: &str) -> Result<()>;

    /// List all folders in the mailbox
    async fn list_folders(&self) -> Result<Vec<FolderInfo>>;

    /// Create a folder, returning its id
    async fn create_folder(&self, name: &str) -> Result<String>;

    /// Save a reply as a draft, returning the draft id
    async fn create_draft(&self, reply: &OutgoingReply) -> Result<String>;

    /// Send a reply, returning the sent message id
    async fn send_message(&self, reply: &OutgoingReply) -> Result<String>;

    /// Busy periods for the given calendars between `start` and `end`
    async fn free_busy(
        &self,
        calendars: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusySlot>>;
}

/// Gmail + Google Calendar implementation of [`MailClient`]
///
/// Folders are user labels; moving a message adds the label and removes
/// `INBOX`, which is Gmail's equivalent of a folder move.
pub struct ProductionMailClient {
    gmail: GmailHub,
    calendar: CalendarHub,
    user_id: String,
    query: String,
}

impl ProductionMailClient {
    pub fn new(hubs: MailboxHubs, user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            gmail: hubs.gmail,
            calendar: hubs.calendar,
            user_id: user_id.into(),
            query: query.into(),
        }
    }

    /// Email address of the connected account
    pub async fn account_email(&self) -> Result<String> {
        let (_, profile) = with_timeout("get_profile", async {
            self.gmail
                .users()
                .get_profile(&self.user_id)
                .add_scope(GMAIL_MODIFY_SCOPE)
                .doit()
                .await
                .map_err(TriageError::from)
        })
        .await?;

        profile
            .email_address
            .ok_or_else(|| TriageError::MailApiError("Profile has no email address".to_string()))
    }

    async fn page_recent_ids(&self, limit: usize) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(limit);
        let mut page_token: Option<String> = None;

        while ids.len() < limit {
            let remaining = (limit - ids.len()).min(500) as u32;
            let mut call = self
                .gmail
                .users()
                .messages_list(&self.user_id)
                .q(&self.query)
                .max_results(remaining);

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = with_timeout("list_messages", async {
                call.add_scope(GMAIL_MODIFY_SCOPE)
                    .doit()
                    .await
                    .map_err(TriageError::from)
            })
            .await?;

            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        ids.truncate(limit);
        Ok(ids)
    }

    async fn upload_reply(&self, reply: &OutgoingReply, send: bool) -> Result<String> {
        let raw = build_reply_mime(reply);
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| TriageError::Unknown(format!("Invalid mime type: {}", e)))?;
        let envelope = Message {
            thread_id: reply.thread_id.clone(),
            ..Default::default()
        };

        if send {
            let (_, sent) = with_timeout("send_message", async {
                self.gmail
                    .users()
                    .messages_send(envelope, &self.user_id)
                    .add_scope(GMAIL_COMPOSE_SCOPE)
                    .upload(Cursor::new(raw.into_bytes()), mime_type)
                    .await
                    .map_err(TriageError::from)
            })
            .await?;
            sent.id
                .ok_or_else(|| TriageError::MailApiError("Sent message has no ID".to_string()))
        } else {
            let draft = Draft {
                message: Some(envelope),
                ..Default::default()
            };
            let (_, created) = with_timeout("create_draft", async {
                self.gmail
                    .users()
                    .drafts_create(draft, &self.user_id)
                    .add_scope(GMAIL_COMPOSE_SCOPE)
                    .upload(Cursor::new(raw.into_bytes()), mime_type)
                    .await
                    .map_err(TriageError::from)
            })
            .await?;
            created
                .id
                .ok_or_else(|| TriageError::MailApiError("Created draft has no ID".to_string()))
        }
    }
}

/// Run a provider call with the standard timeout
async fn with_timeout<T, Fut>(operation_name: &str, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(API_TIMEOUT, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} call timed out after {:?}", operation_name, API_TIMEOUT);
            Err(TriageError::NetworkError(format!(
                "API call timed out after {:?}",
                API_TIMEOUT
            )))
        }
    }
}

/// Map a Calendar API error with the same rules as Gmail's
pub(crate) fn map_calendar_error(error: google_calendar3::Error) -> TriageError {
    match error {
        google_calendar3::Error::Failure(ref response) => {
            let status = response.status();
            TriageError::from_http_status(
                status.as_u16(),
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            )
        }
        google_calendar3::Error::BadRequest(ref body) => TriageError::from_google_error_body(body),
        google_calendar3::Error::HttpError(ref err) => {
            TriageError::NetworkError(format!("Connection error: {}", err))
        }
        google_calendar3::Error::Io(err) => TriageError::NetworkError(err.to_string()),
        other => TriageError::MailApiError(other.to_string()),
    }
}

/// Parse a Gmail message into a [`MailMessage`]; only the id is mandatory
fn parse_message(msg: Message) -> Result<MailMessage> {
    let id = msg
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let mut sender = None;
    let mut subject = String::new();
    let mut message_id_header = None;
    let mut received_at = None;

    let headers = msg
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .map(|h| h.as_slice())
        .unwrap_or_default();

    for header in headers {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            match name.to_lowercase().as_str() {
                "from" => sender = parse_sender(value),
                "subject" => subject = value.clone(),
                "message-id" => message_id_header = Some(value.trim().to_string()),
                "date" => received_at = parse_date(value).ok(),
                _ => {}
            }
        }
    }

    // Fall back to Gmail's internal timestamp when the Date header is unusable
    if received_at.is_none() {
        received_at = msg
            .internal_date
            .and_then(DateTime::<Utc>::from_timestamp_millis);
    }

    let mut extra = serde_json::Map::new();
    if let Some(labels) = &msg.label_ids {
        extra.insert("label_ids".to_string(), serde_json::json!(labels));
    }
    if let Some(size) = msg.size_estimate {
        extra.insert("size_estimate".to_string(), serde_json::json!(size));
    }
    if let Some(history_id) = msg.history_id {
        extra.insert("history_id".to_string(), serde_json::json!(history_id.to_string()));
    }

    Ok(MailMessage {
        id,
        thread_id: msg.thread_id,
        subject,
        snippet: decode_html_entities(msg.snippet.as_deref().unwrap_or_default()),
        sender,
        message_id_header,
        received_at,
        extra,
    })
}

/// Parse a From header; None when there is no usable address
fn parse_sender(value: &str) -> Option<Participant> {
    if let Some((name, email)) = parse_email_header(value) {
        return (!email.is_empty() && email.contains('@'))
            .then(|| Participant::new(Some(name), email));
    }
    let bare = value.trim();
    bare.contains('@').then(|| Participant::new(None, bare))
}

/// Parse email header in "Name <email@example.com>" format
fn parse_email_header(header: &str) -> Option<(String, String)> {
    let start = header.find('<')?;
    let end = header[start..].find('>')? + start;
    let name = header[..start].trim().trim_matches('"').to_string();
    let email = header[start + 1..end].trim().to_string();
    Some((name, email))
}

/// Parse RFC 2822 date string
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(date_str).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| TriageError::InvalidMessageFormat(format!("Invalid date format: {}", e)))
}

/// Gmail snippets arrive HTML-escaped
fn decode_html_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Render a plain-text RFC 822 reply
fn build_reply_mime(reply: &OutgoingReply) -> String {
    let mut raw = format!("To: {}\r\n", reply.to.to_header());
    raw.push_str(&format!(
        "Subject: {}\r\n",
        encode_header_text(&strip_newlines(&reply.subject))
    ));
    if let Some(in_reply_to) = &reply.in_reply_to {
        let in_reply_to = strip_newlines(in_reply_to);
        raw.push_str(&format!("In-Reply-To: {}\r\n", in_reply_to));
        raw.push_str(&format!("References: {}\r\n", in_reply_to));
    }
    raw.push_str("MIME-Version: 1.0\r\n");
    raw.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
    raw.push_str("\r\n");
    raw.push_str(&reply.body.replace("\r\n", "\n").replace('\n', "\r\n"));
    raw
}

fn strip_newlines(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[async_trait]
impl MailClient for ProductionMailClient {
    async fn list_recent_ids(&self, limit: usize) -> Result<Vec<String>> {
        let ids = self.page_recent_ids(limit).await?;
        debug!("Listed {} message ids", ids.len());
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage> {
        let (_, msg) = with_timeout("get_message", async {
            let mut call = self
                .gmail
                .users()
                .messages_get(&self.user_id, id)
                .format("metadata");
            for header in METADATA_HEADERS {
                call = call.add_metadata_headers(header);
            }
            call.add_scope(GMAIL_MODIFY_SCOPE)
                .doit()
                .await
                .map_err(TriageError::from)
        })
        .await?;

        parse_message(msg)
    }

    async fn move_to_folder(&self, message_id: &str, folder_id: &str) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: Some(vec![folder_id.to_string()]),
            remove_label_ids: Some(vec!["INBOX".to_string()]),
        };

        with_timeout("move_to_folder", async {
            self.gmail
                .users()
                .messages_modify(request, &self.user_id, message_id)
                .add_scope(GMAIL_MODIFY_SCOPE)
                .doit()
                .await
                .map_err(TriageError::from)
        })
        .await?;

        Ok(())
    }

    async fn list_folders(&self) -> Result<Vec<FolderInfo>> {
        let (_, response) = with_timeout("list_folders", async {
            debug!("Calling Gmail API to list labels...");
            self.gmail
                .users()
                .labels_list(&self.user_id)
                .add_scope(GMAIL_LABELS_SCOPE)
                .doit()
                .await
                .map_err(TriageError::from)
        })
        .await?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(FolderInfo { id, name }),
                _ => None,
            })
            .collect())
    }

    async fn create_folder(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let (_, created) = with_timeout("create_folder", async {
            self.gmail
                .users()
                .labels_create(label, &self.user_id)
                .add_scope(GMAIL_LABELS_SCOPE)
                .doit()
                .await
                .map_err(TriageError::from)
        })
        .await?;

        created
            .id
            .ok_or_else(|| TriageError::FolderError("Created label has no ID".to_string()))
    }

    async fn create_draft(&self, reply: &OutgoingReply) -> Result<String> {
        self.upload_reply(reply, false).await
    }

    async fn send_message(&self, reply: &OutgoingReply) -> Result<String> {
        self.upload_reply(reply, true).await
    }

    async fn free_busy(
        &self,
        calendars: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusySlot>> {
        let request = FreeBusyRequest {
            time_min: Some(start),
            time_max: Some(end),
            items: Some(
                calendars
                    .iter()
                    .map(|id| FreeBusyRequestItem { id: Some(id.clone()) })
                    .collect(),
            ),
            ..Default::default()
        };

        let (_, response) = with_timeout("free_busy", async {
            self.calendar
                .freebusy()
                .query(request)
                .add_scope(CALENDAR_FREEBUSY_SCOPE)
                .doit()
                .await
                .map_err(map_calendar_error)
        })
        .await?;

        let mut slots = Vec::new();
        for (calendar, info) in response.calendars.unwrap_or_default() {
            if let Some(errors) = info.errors.filter(|e| !e.is_empty()) {
                let reason = errors
                    .first()
                    .and_then(|e| e.reason.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(TriageError::MailApiError(format!(
                    "Free/busy lookup failed for {}: {}",
                    calendar, reason
                )));
            }
            for period in info.busy.unwrap_or_default() {
                if let (Some(start), Some(end)) = (period.start, period.end) {
                    slots.push(BusySlot {
                        calendar: calendar.clone(),
                        start,
                        end,
                    });
                }
            }
        }

        slots.sort_by_key(|slot| slot.start);
        Ok(slots)
    }
}

#[async_trait]
impl<T: MailClient + ?Sized> MailClient for Arc<T> {
    async fn list_recent_ids(&self, limit: usize) -> Result<Vec<String>> {
        (**self).list_recent_ids(limit).await
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage> {
        (**self).get_message(id).await
    }

    async fn move_to_folder(&self, message_id: &str, folder_id: &str) -> Result<()> {
        (**self).move_to_folder(message_id, folder_id).await
    }

    async fn list_folders(&self) -> Result<Vec<FolderInfo>> {
        (**self).list_folders().await
    }

    async fn create_folder(&self, name: &str) -> Result<String> {
        (**self).create_folder(name).await
    }

    async fn create_draft(&self, reply: &OutgoingReply) -> Result<String> {
        (**self).create_draft(reply).await
    }

    async fn send_message(&self, reply: &OutgoingReply) -> Result<String> {
        (**self).send_message(reply).await
    }

    async fn free_busy(
        &self,
        calendars: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusySlot>> {
        (**self).free_busy(calendars, start, end).await
    }
}
