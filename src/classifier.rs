//! AI classification of messages into configured categories

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::categories::CategoryTable;
use crate::error::{Result, TriageError};
use crate::llm::{CompletionRequest, LlmClient};
use crate::models::{Analysis, Category, MailMessage};
use crate::retry::{with_retry, RetryPolicy};

/// Opening or closing markdown fence, with an optional json language tag
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json|JSON)?").unwrap());

/// Raw model output; every field is required
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    category: String,
    summary: String,
    suggested_action: String,
}

/// Classifies messages with a chat-completion model
pub struct AiClassifier {
    llm: Arc<dyn LlmClient>,
    categories: Arc<CategoryTable>,
    temperature: f32,
    retry: RetryPolicy,
    system_prompt: String,
}

impl AiClassifier {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        categories: Arc<CategoryTable>,
        temperature: f32,
        retry: RetryPolicy,
    ) -> Self {
        let system_prompt = build_system_prompt(&categories);
        Self {
            llm,
            categories,
            temperature,
            retry,
            system_prompt,
        }
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Classify one message; malformed output is an error, never a default category
    pub async fn classify(&self, message: &MailMessage) -> Result<Analysis> {
        let request = CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt: build_user_prompt(message),
            temperature: self.temperature,
            json_output: true,
        };

        let text = with_retry("classify", &self.retry, || {
            self.llm.complete(request.clone())
        })
        .await?;

        let analysis = parse_analysis(&text)?;
        if self.categories.get(analysis.category.as_str()).is_none() {
            debug!(
                "Model returned unconfigured category '{}' for message {}",
                analysis.category, message.id
            );
        }
        Ok(analysis)
    }
}

fn build_system_prompt(categories: &CategoryTable) -> String {
    format!(
        "You are a high-level Executive Assistant managing a busy executive's inbox.\n\
         Classify each email into ONE category and return a JSON object.\n\
         \n\
         === CATEGORY GUIDE ===\n\
         {guide}\n\
         \n\
         === OUTPUT FORMAT ===\n\
         Return strictly a JSON object:\n\
         {{\n  \"category\": \"<one of: {names}>\",\n  \"summary\": \"<1-sentence summary>\",\n  \"suggested_action\": \"<short action instruction>\"\n}}\n\
         Return ONLY valid JSON. No markdown, no explanation.",
        guide = categories.guide(),
        names = categories.names().join(", "),
    )
}

fn build_user_prompt(message: &MailMessage) -> String {
    format!(
        "Subject: {}\nFrom: {}\nSnippet: {}",
        message.subject,
        message.sender_email().unwrap_or("unknown"),
        message.snippet
    )
}

/// Remove markdown code fences the model may wrap around its JSON
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Parse model output into an [`Analysis`]
pub fn parse_analysis(text: &str) -> Result<Analysis> {
    let cleaned = strip_code_fences(text);
    let raw: RawAnalysis = serde_json::from_str(&cleaned).map_err(|e| {
        TriageError::MalformedResponse(format!("{} (output: {:?})", e, truncate(&cleaned, 200)))
    })?;

    Ok(Analysis {
        category: Category::parse(&raw.category),
        summary: raw.summary,
        suggested_action: raw.suggested_action,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
