//! Inbox Triage
//!
//! An AI executive assistant for a Gmail inbox. Each sweep reads the most
//! recent messages, decides a category for each one and takes exactly one
//! action for that category.
//!
//! # Overview
//!
//! - **Keyword overrides**: configured keywords (e.g. "critical", "outage")
//!   decide the category without calling the model
//! - **AI classification**: any OpenAI-compatible chat endpoint returns a
//!   category, a one-line summary and a suggested action as JSON
//! - **Reply generation**: category-specific tone, with real free/busy data
//!   from Google Calendar for scheduling requests
//! - **Dispatch**: draft, send, file into a review folder, flag or leave alone
//! - **Retry**: provider throttling is retried with linear backoff
//!
//! # Example Usage
//!
//! ```no_run
//! use inbox_triage::{auth, client::ProductionMailClient, config::Config};
//! use inbox_triage::{categories::CategoryTable, llm::OpenAiCompatibleClient, sweep::Sweeper};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hubs = auth::connect_mailbox(
//!         "credentials.json".as_ref(),
//!         ".inbox-triage/token.json".as_ref(),
//!     ).await?;
//!     let client = Arc::new(ProductionMailClient::new(
//!         hubs,
//!         config.mailbox.user_id.clone(),
//!         config.mailbox.query.clone(),
//!     ));
//!     let llm = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
//!     let categories = Arc::new(CategoryTable::builtin()?);
//!
//!     let sweeper = Sweeper::from_config(client, llm, categories, &config);
//!     for result in sweeper.run().await? {
//!         println!("{}: {:?}", result.subject, result.action);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail/Calendar hub initialization
//! - [`client`] - Mail provider trait and the Gmail implementation
//! - [`llm`] - Chat-completion trait and the OpenAI-compatible implementation
//! - [`categories`] - Category table loading and the prompt guide
//! - [`overrides`] - Keyword override matching
//! - [`classifier`] - AI classification and response parsing
//! - [`availability`] - Free/busy lookup for scheduling replies
//! - [`reply`] - Reply body generation
//! - [`folders`] - Review folder resolution
//! - [`action_log`] - Markdown checklist of items needing attention
//! - [`dispatcher`] - Category to action routing
//! - [`sweep`] - Sweep orchestration and watch mode
//! - [`retry`] - Rate-limit retry with linear backoff
//! - [`cli`] - Command-line interface and sweep reports
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod action_log;
pub mod auth;
pub mod availability;
pub mod categories;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod folders;
pub mod llm;
pub mod models;
pub mod overrides;
pub mod reply;
pub mod retry;
pub mod sweep;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, Result, TriageError};

// Core data models
pub use models::{
    ActionOutcome, Analysis, BusySlot, Category, FolderInfo, MailMessage, OutgoingReply,
    Participant, SweepResult,
};

// Config types
pub use config::{Config, LlmConfig, RetryConfig};

// Client traits
pub use client::{MailClient, ProductionMailClient};
pub use llm::{CompletionRequest, LlmClient, OpenAiCompatibleClient};

// Pipeline
pub use categories::{CategoryDefinition, CategoryTable};
pub use classifier::AiClassifier;
pub use dispatcher::{ActionDispatcher, TriageAction};
pub use overrides::{KeywordOverride, OverrideMatch};
pub use reply::ReplyGenerator;
pub use retry::{with_retry, RetryPolicy};
pub use sweep::{Sweeper, Triage};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter, SweepReport};
