//! Category to action routing

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::action_log::ActionLog;
use crate::client::MailClient;
use crate::error::Result;
use crate::folders::ReviewFolder;
use crate::models::{ActionOutcome, Analysis, Category, MailMessage, OutgoingReply};
use crate::reply::ReplyGenerator;
use crate::retry::{with_retry, RetryPolicy};

/// The single terminal action taken for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageAction {
    SaveDraft,
    SendReply,
    MoveToReviewFolder,
    Flag,
    NoOp,
}

impl TriageAction {
    pub fn for_category(category: &Category) -> Self {
        match category {
            Category::Emergency | Category::UrgentP0 | Category::ActionRequired => {
                TriageAction::SaveDraft
            }
            Category::CalendarSync => TriageAction::SendReply,
            Category::LowSignal => TriageAction::MoveToReviewFolder,
            Category::SecurityRisk => TriageAction::Flag,
            Category::Other(_) => TriageAction::NoOp,
        }
    }

    pub fn needs_reply(&self) -> bool {
        matches!(self, TriageAction::SaveDraft | TriageAction::SendReply)
    }
}

impl fmt::Display for TriageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriageAction::SaveDraft => "save draft reply",
            TriageAction::SendReply => "send reply",
            TriageAction::MoveToReviewFolder => "move to review folder",
            TriageAction::Flag => "flag",
            TriageAction::NoOp => "no action",
        };
        f.write_str(name)
    }
}

/// Categories recorded in the action log
fn is_logged(category: &Category) -> bool {
    matches!(
        category,
        Category::Emergency | Category::UrgentP0 | Category::ActionRequired
    )
}

pub struct ActionDispatcher {
    client: Arc<dyn MailClient>,
    replies: ReplyGenerator,
    review_folder: ReviewFolder,
    action_log: Option<ActionLog>,
    dry_run: bool,
    retry: RetryPolicy,
}

impl ActionDispatcher {
    pub fn new(
        client: Arc<dyn MailClient>,
        replies: ReplyGenerator,
        review_folder: ReviewFolder,
        action_log: Option<ActionLog>,
        dry_run: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            replies,
            review_folder,
            action_log,
            dry_run,
            retry,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Take the action mapped to the analysis category
    pub async fn dispatch(&self, message: &MailMessage, analysis: &Analysis) -> Result<ActionOutcome> {
        let action = TriageAction::for_category(&analysis.category);

        if self.dry_run {
            info!("[dry run] would {} for \"{}\"", action, message.subject);
            return Ok(ActionOutcome::DryRun {
                planned: action.to_string(),
            });
        }

        if is_logged(&analysis.category) {
            self.log_action(analysis, &message.subject).await;
        }

        match action {
            TriageAction::SaveDraft | TriageAction::SendReply => {
                // Checked before generating so no tokens are spent on an unsendable reply
                if message.sender_email().is_none() {
                    warn!(
                        "Could not determine sender email for {}, skipping {}",
                        message.id, action
                    );
                    return Ok(ActionOutcome::Skipped {
                        reason: "no sender email address".to_string(),
                    });
                }

                let body = self.replies.generate(message, analysis).await?;
                let reply = match OutgoingReply::to_message(message, body) {
                    Some(reply) => reply,
                    None => {
                        return Ok(ActionOutcome::Skipped {
                            reason: "no sender email address".to_string(),
                        })
                    }
                };

                if action == TriageAction::SaveDraft {
                    self.save_draft(&reply).await
                } else {
                    self.send_reply(&reply).await
                }
            }
            TriageAction::MoveToReviewFolder => {
                let folder = self.review_folder.resolve().await?;
                with_retry("move_to_folder", &self.retry, || {
                    self.client.move_to_folder(&message.id, &folder.id)
                })
                .await?;
                info!("Moved \"{}\" to \"{}\"", message.subject, folder.name);
                Ok(ActionOutcome::MovedToFolder {
                    folder_id: folder.id.clone(),
                    folder_name: folder.name.clone(),
                })
            }
            TriageAction::Flag => {
                warn!(
                    "SECURITY_RISK: \"{}\" from {} flagged as phishing/scam, no reply",
                    message.subject,
                    message.sender_email().unwrap_or("unknown")
                );
                Ok(ActionOutcome::Flagged)
            }
            TriageAction::NoOp => {
                info!(
                    "No action defined for category {} (\"{}\")",
                    analysis.category, message.subject
                );
                Ok(ActionOutcome::NoAction)
            }
        }
    }

    async fn save_draft(&self, reply: &OutgoingReply) -> Result<ActionOutcome> {
        let draft_id = with_retry("create_draft", &self.retry, || self.client.create_draft(reply)).await?;
        info!("Draft saved: \"{}\"", reply.subject);
        Ok(ActionOutcome::DraftSaved {
            draft_id,
            to: reply.to.email.clone(),
        })
    }

    async fn send_reply(&self, reply: &OutgoingReply) -> Result<ActionOutcome> {
        let message_id =
            with_retry("send_message", &self.retry, || self.client.send_message(reply)).await?;
        info!("Reply sent: \"{}\" to {}", reply.subject, reply.to.email);
        Ok(ActionOutcome::ReplySent {
            message_id,
            to: reply.to.email.clone(),
        })
    }

    async fn log_action(&self, analysis: &Analysis, subject: &str) {
        if let Some(log) = &self.action_log {
            if let Err(e) = log.record(analysis, subject).await {
                warn!("Failed to update action log {:?}: {}", log.path(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_table() {
        assert_eq!(TriageAction::for_category(&Category::Emergency), TriageAction::SaveDraft);
        assert_eq!(TriageAction::for_category(&Category::UrgentP0), TriageAction::SaveDraft);
        assert_eq!(
            TriageAction::for_category(&Category::ActionRequired),
            TriageAction::SaveDraft
        );
        assert_eq!(
            TriageAction::for_category(&Category::CalendarSync),
            TriageAction::SendReply
        );
        assert_eq!(
            TriageAction::for_category(&Category::LowSignal),
            TriageAction::MoveToReviewFolder
        );
        assert_eq!(TriageAction::for_category(&Category::SecurityRisk), TriageAction::Flag);
        assert_eq!(
            TriageAction::for_category(&Category::Other("FYI".to_string())),
            TriageAction::NoOp
        );
    }

    #[test]
    fn test_needs_reply() {
        assert!(TriageAction::SaveDraft.needs_reply());
        assert!(TriageAction::SendReply.needs_reply());
        assert!(!TriageAction::Flag.needs_reply());
        assert!(!TriageAction::MoveToReviewFolder.needs_reply());
    }

    #[test]
    fn test_logged_categories() {
        assert!(is_logged(&Category::Emergency));
        assert!(is_logged(&Category::ActionRequired));
        assert!(!is_logged(&Category::CalendarSync));
        assert!(!is_logged(&Category::LowSignal));
    }
}
