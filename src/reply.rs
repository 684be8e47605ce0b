//! Reply drafting with category-specific tone

use std::sync::Arc;
use tracing::{debug, warn};

use crate::availability::{AvailabilityChecker, AVAILABILITY_UNAVAILABLE};
use crate::categories::CategoryTable;
use crate::error::Result;
use crate::llm::{CompletionRequest, LlmClient};
use crate::models::{Analysis, Category, MailMessage};
use crate::retry::{with_retry, RetryPolicy};

/// Intent used when the category table has no entry for the category
const DEFAULT_INTENT: &str = "a standard business email";

pub struct ReplyGenerator {
    llm: Arc<dyn LlmClient>,
    categories: Arc<CategoryTable>,
    /// None means availability is never queried and the fallback text is used
    availability: Option<AvailabilityChecker>,
    temperature: f32,
    sign_off: String,
    retry: RetryPolicy,
}

impl ReplyGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        categories: Arc<CategoryTable>,
        availability: Option<AvailabilityChecker>,
        temperature: f32,
        sign_off: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            categories,
            availability,
            temperature,
            sign_off: sign_off.into(),
            retry,
        }
    }

    /// Plain-text reply body; may be empty if the model returns nothing
    pub async fn generate(&self, message: &MailMessage, analysis: &Analysis) -> Result<String> {
        let availability = if analysis.category == Category::CalendarSync {
            let slots = match &self.availability {
                Some(checker) => checker.availability_context().await,
                None => AVAILABILITY_UNAVAILABLE.to_string(),
            };
            Some(slots)
        } else {
            None
        };

        let request = CompletionRequest {
            system_prompt: self.system_prompt(&analysis.category, availability.as_deref()),
            user_prompt: self.user_prompt(message, analysis),
            temperature: self.temperature,
            json_output: false,
        };

        let body = with_retry("generate_reply", &self.retry, || {
            self.llm.complete(request.clone())
        })
        .await?
        .trim()
        .to_string();

        if body.is_empty() {
            warn!("Model returned an empty reply for message {}", message.id);
        } else {
            debug!("Generated {} character reply for {}", body.len(), message.id);
        }
        Ok(body)
    }

    fn system_prompt(&self, category: &Category, availability: Option<&str>) -> String {
        let mut prompt = String::from(
            "You are a highly efficient, senior Executive Assistant.\n\
             Your tone is professional, decisive, and warm but brief.\n\
             Never sound like an \"AI assistant\"; sound like a trusted colleague.\n",
        );

        if let Some(slots) = availability {
            prompt.push_str(&format!(
                "\n=== REAL-TIME AVAILABILITY (Next 3 Days) ===\n{}\n\n\
                 Based on the above, suggest 2-3 specific 30-min slots during business hours (9am-5pm).\n",
                slots
            ));
        }

        prompt.push_str("\n=== INSTRUCTIONS ===\nWrite a concise reply:\n- ");
        prompt.push_str(tone_instructions(category));
        prompt.push_str(&format!(
            "\n\nSign off as \"{}\". Return ONLY plain text: no markdown, no subject line.",
            self.sign_off
        ));
        prompt
    }

    fn user_prompt(&self, message: &MailMessage, analysis: &Analysis) -> String {
        let intent = self
            .categories
            .intent_for(&analysis.category)
            .unwrap_or(DEFAULT_INTENT);

        format!(
            "Original: {}\nFrom: {}\nCategory: {}\nIntent: {}\nSummary: {}",
            message.subject,
            message.sender_email().unwrap_or("unknown"),
            analysis.category,
            intent,
            analysis.summary
        )
    }
}

fn tone_instructions(category: &Category) -> &'static str {
    match category {
        Category::Emergency | Category::UrgentP0 => {
            "Emergency/URGENT_P0: Decisive, immediate acknowledgement."
        }
        Category::ActionRequired => "ACTION_REQUIRED: Clear confirmation of approval or next steps.",
        Category::CalendarSync => {
            "CALENDAR_SYNC: Use the provided availability to suggest 2-3 specific options."
        }
        _ => "Acknowledge the message briefly and state the next step.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::CategoryDefinition;
    use crate::models::Participant;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingLlm {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn llm(reply: &str) -> Arc<RecordingLlm> {
        Arc::new(RecordingLlm {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn generator(llm: Arc<RecordingLlm>) -> ReplyGenerator {
        let table = CategoryTable::new(vec![
            CategoryDefinition {
                name: "URGENT_P0".to_string(),
                priority: 1,
                intent: "Production fires".to_string(),
                keywords: vec!["critical".to_string()],
            },
            CategoryDefinition {
                name: "CALENDAR_SYNC".to_string(),
                priority: 4,
                intent: "Scheduling".to_string(),
                keywords: vec!["availability".to_string()],
            },
        ])
        .unwrap();
        ReplyGenerator::new(
            llm,
            Arc::new(table),
            None,
            0.5,
            "Ops Desk",
            RetryPolicy::default(),
        )
    }

    fn message() -> MailMessage {
        MailMessage {
            id: "m7".to_string(),
            thread_id: None,
            subject: "Sync next week?".to_string(),
            snippet: "What is your availability".to_string(),
            sender: Some(Participant::new(None, "pm@example.com")),
            message_id_header: None,
            received_at: None,
            extra: Default::default(),
        }
    }

    fn analysis(category: Category) -> Analysis {
        Analysis {
            category,
            summary: "Wants a meeting.".to_string(),
            suggested_action: "Propose times.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reply_is_trimmed_and_uses_reply_temperature() {
        let llm = llm("\n  Tuesday 10am works.\n\nOps Desk  \n");
        let reply = generator(llm.clone())
            .generate(&message(), &analysis(Category::UrgentP0))
            .await
            .unwrap();
        assert_eq!(reply, "Tuesday 10am works.\n\nOps Desk");

        let requests = llm.requests.lock().unwrap();
        assert!((requests[0].temperature - 0.5).abs() < f32::EPSILON);
        assert!(!requests[0].json_output);
        assert!(requests[0].system_prompt.contains("Sign off as \"Ops Desk\""));
        assert!(requests[0].system_prompt.contains("Decisive, immediate acknowledgement"));
    }

    #[tokio::test]
    async fn test_calendar_without_checker_uses_fallback() {
        let llm = llm("Here are some options.");
        generator(llm.clone())
            .generate(&message(), &analysis(Category::CalendarSync))
            .await
            .unwrap();

        let requests = llm.requests.lock().unwrap();
        let prompt = &requests[0].system_prompt;
        assert!(prompt.contains("=== REAL-TIME AVAILABILITY (Next 3 Days) ==="));
        assert!(prompt.contains(AVAILABILITY_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_non_calendar_reply_has_no_availability_block() {
        let llm = llm("Approved.");
        generator(llm.clone())
            .generate(&message(), &analysis(Category::ActionRequired))
            .await
            .unwrap();

        let requests = llm.requests.lock().unwrap();
        assert!(!requests[0].system_prompt.contains("REAL-TIME AVAILABILITY"));
        assert!(requests[0].system_prompt.contains("ACTION_REQUIRED: Clear confirmation"));
    }

    #[tokio::test]
    async fn test_user_prompt_intent_lookup() {
        let llm = llm("On it.");
        let generator = generator(llm.clone());
        generator
            .generate(&message(), &analysis(Category::Emergency))
            .await
            .unwrap();
        generator
            .generate(&message(), &analysis(Category::ActionRequired))
            .await
            .unwrap();

        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].user_prompt.contains("Category: Emergency\nIntent: Production fires"));
        assert!(requests[1].user_prompt.contains("Intent: a standard business email"));
        assert!(requests[1].user_prompt.starts_with("Original: Sync next week?\nFrom: pm@example.com"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_allowed() {
        let llm = llm("   ");
        let reply = generator(llm)
            .generate(&message(), &analysis(Category::UrgentP0))
            .await
            .unwrap();
        assert!(reply.is_empty());
    }
}
