//! Common test utilities and fixtures
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use inbox_triage::categories::CategoryTable;
use inbox_triage::client::MailClient;
use inbox_triage::config::Config;
use inbox_triage::error::{Result, TriageError};
use inbox_triage::llm::{CompletionRequest, LlmClient};
use inbox_triage::models::{BusySlot, FolderInfo, MailMessage, OutgoingReply, Participant};
use inbox_triage::sweep::Sweeper;
use mockall::mock;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Create a test message with a sender address
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        thread_id: Some(format!("thread_{}", id)),
        subject: subject.to_string(),
        snippet: "Short preview of the message body".to_string(),
        sender: Some(Participant::new(Some("Test Sender".to_string()), sender)),
        message_id_header: Some(format!("<{}@mail.example.com>", id)),
        received_at: Some(Utc::now()),
        extra: Default::default(),
    }
}

/// Create a message whose From header could not be parsed
pub fn create_anonymous_message(id: &str, subject: &str) -> MailMessage {
    let mut message = create_test_message(id, "unused@example.com", subject);
    message.sender = None;
    message
}

/// Model output for a classification
pub fn classification_json(category: &str) -> String {
    json!({
        "category": category,
        "summary": format!("Looks like {}", category),
        "suggested_action": "Handle it",
    })
    .to_string()
}

/// Defaults with fast retries and the action log inside `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.action_log.path = dir.join("TODO.md");
    config
}

pub fn builtin_categories() -> Arc<CategoryTable> {
    Arc::new(CategoryTable::builtin().expect("builtin categories parse"))
}

/// Wire a sweeper around the mocks
pub fn build_sweeper(client: MockMailClient, llm: MockLlmClient, config: &Config) -> Sweeper {
    Sweeper::from_config(
        Arc::new(client),
        Arc::new(llm),
        builtin_categories(),
        config,
    )
}

/// Serve `messages` as the mailbox: listing returns their ids, fetching returns each one
pub fn serve_messages(client: &mut MockMailClient, messages: Vec<MailMessage>) {
    let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
    client
        .expect_list_recent_ids()
        .returning(move |_| Ok(ids.clone()));
    client.expect_get_message().returning(move |id| {
        messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(format!("message {}", id)))
    });
}

/// Every request the mock model received, in order
#[derive(Clone, Default)]
pub struct PromptLog(Arc<Mutex<Vec<CompletionRequest>>>);

impl PromptLog {
    pub fn push(&self, request: CompletionRequest) {
        self.0.lock().unwrap().push(request);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.0.lock().unwrap().clone()
    }

    /// Requests that asked for JSON, i.e. classifications
    pub fn classify_count(&self) -> usize {
        self.requests().iter().filter(|r| r.json_output).count()
    }

    pub fn reply_requests(&self) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !r.json_output)
            .collect()
    }
}

/// Mock model that classifies every message as `category` and replies with `reply`
pub fn scripted_llm(category: &'static str, reply: &'static str, log: PromptLog) -> MockLlmClient {
    let mut llm = MockLlmClient::new();
    llm.expect_complete().returning(move |request| {
        let json_output = request.json_output;
        log.push(request);
        if json_output {
            Ok(classification_json(category))
        } else {
            Ok(reply.to_string())
        }
    });
    llm
}

pub fn busy_slot(calendar: &str, start: DateTime<Utc>, hours: i64) -> BusySlot {
    BusySlot {
        calendar: calendar.to_string(),
        start,
        end: start + chrono::Duration::hours(hours),
    }
}

// Mock implementation of MailClient for testing
mock! {
    pub MailClient {}

    #[async_trait::async_trait]
    impl MailClient for MailClient {
        async fn list_recent_ids(&self, limit: usize) -> Result<Vec<String>>;
        async fn get_message(&self, id: &str) -> Result<MailMessage>;
        async fn move_to_folder(&self, message_id: &str, folder_id: &str) -> Result<()>;
        async fn list_folders(&self) -> Result<Vec<FolderInfo>>;
        async fn create_folder(&self, name: &str) -> Result<String>;
        async fn create_draft(&self, reply: &OutgoingReply) -> Result<String>;
        async fn send_message(&self, reply: &OutgoingReply) -> Result<String>;
        async fn free_busy(
            &self,
            calendars: &[String],
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<BusySlot>>;
    }
}

// Mock implementation of LlmClient for testing
mock! {
    pub LlmClient {}

    #[async_trait::async_trait]
    impl LlmClient for LlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String>;
    }
}
