//! Sweep orchestration: list, classify and act on recent messages

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::action_log::ActionLog;
use crate::availability::AvailabilityChecker;
use crate::categories::CategoryTable;
use crate::classifier::AiClassifier;
use crate::client::MailClient;
use crate::config::Config;
use crate::dispatcher::ActionDispatcher;
use crate::error::Result;
use crate::folders::ReviewFolder;
use crate::llm::LlmClient;
use crate::models::{Analysis, MailMessage, SweepResult};
use crate::overrides::KeywordOverride;
use crate::reply::ReplyGenerator;
use crate::retry::{with_retry, RetryPolicy};

/// Keyword override first, the model only when no keyword matches
pub struct Triage {
    overrides: KeywordOverride,
    classifier: AiClassifier,
}

impl Triage {
    pub fn new(overrides: KeywordOverride, classifier: AiClassifier) -> Self {
        Self {
            overrides,
            classifier,
        }
    }

    /// Analysis plus the override keyword when one decided the category
    pub async fn analyze(&self, message: &MailMessage) -> Result<(Analysis, Option<String>)> {
        if let Some(hit) = self.overrides.check_message(message) {
            info!(
                "Keyword override triggered by \"{}\" ({})",
                hit.keyword, hit.category
            );
            let keyword = hit.keyword.clone();
            return Ok((hit.into_analysis(), Some(keyword)));
        }

        let analysis = self.classifier.classify(message).await?;
        Ok((analysis, None))
    }
}

pub struct Sweeper {
    client: Arc<dyn MailClient>,
    triage: Triage,
    dispatcher: ActionDispatcher,
    message_limit: usize,
    retry: RetryPolicy,
}

impl Sweeper {
    pub fn new(
        client: Arc<dyn MailClient>,
        triage: Triage,
        dispatcher: ActionDispatcher,
        message_limit: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            triage,
            dispatcher,
            message_limit,
            retry,
        }
    }

    /// Wire the full pipeline from configuration
    pub fn from_config(
        client: Arc<dyn MailClient>,
        llm: Arc<dyn LlmClient>,
        categories: Arc<CategoryTable>,
        config: &Config,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);

        let triage = Triage::new(
            KeywordOverride::new(&categories),
            AiClassifier::new(
                llm.clone(),
                categories.clone(),
                config.llm.classify_temperature,
                retry,
            ),
        );

        let availability = AvailabilityChecker::new(
            client.clone(),
            config.mailbox.availability_calendars.clone(),
        );
        let replies = ReplyGenerator::new(
            llm,
            categories,
            Some(availability),
            config.llm.reply_temperature,
            config.reply.sign_off.clone(),
            retry,
        );

        let review_folder =
            ReviewFolder::new(client.clone(), config.mailbox.review_folder.clone(), retry);
        let action_log = config
            .action_log
            .enabled
            .then(|| ActionLog::new(config.action_log.path.clone()));

        let dispatcher = ActionDispatcher::new(
            client.clone(),
            replies,
            review_folder,
            action_log,
            config.execution.dry_run,
            retry,
        );

        Self::new(client, triage, dispatcher, config.sweep.message_limit, retry)
    }

    /// One sweep over the configured number of messages
    pub async fn run(&self) -> Result<Vec<SweepResult>> {
        self.run_with_limit(self.message_limit).await
    }

    /// One sweep; fails only if the messages cannot be listed
    pub async fn run_with_limit(&self, limit: usize) -> Result<Vec<SweepResult>> {
        let sweep_id = Uuid::new_v4();
        let span = info_span!("sweep", %sweep_id);

        async {
            info!(
                "Sweep started (limit {}{})",
                limit,
                if self.dispatcher.is_dry_run() { ", dry run" } else { "" }
            );

            let ids = with_retry("list_messages", &self.retry, || {
                self.client.list_recent_ids(limit)
            })
            .await?;

            let mut results = Vec::with_capacity(ids.len());
            for id in &ids {
                let result = self
                    .fetch_and_process(id)
                    .instrument(info_span!("message", %id))
                    .await;
                results.push(result);
            }

            let failed = results.iter().filter(|r| !r.success).count();
            info!(
                "Sweep finished: {} processed, {} failed",
                results.len(),
                failed
            );
            Ok(results)
        }
        .instrument(span)
        .await
    }

    async fn fetch_and_process(&self, id: &str) -> SweepResult {
        match with_retry("get_message", &self.retry, || self.client.get_message(id)).await {
            Ok(message) => self.process_message(&message).await,
            Err(e) => {
                error!("Error fetching message {}: {}", id, e);
                SweepResult::fetch_failed(id, &e)
            }
        }
    }

    /// Triage one message; errors become a failed result instead of propagating
    pub async fn process_message(&self, message: &MailMessage) -> SweepResult {
        match self.triage_message(message).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error processing \"{}\": {}", message.subject, e);
                SweepResult::failed(message, &e)
            }
        }
    }

    async fn triage_message(&self, message: &MailMessage) -> Result<SweepResult> {
        let (analysis, keyword) = self.triage.analyze(message).await?;
        info!(
            "Category: {} | {} | {}",
            analysis.category, analysis.summary, analysis.suggested_action
        );

        let action = self.dispatcher.dispatch(message, &analysis).await?;
        Ok(SweepResult::succeeded(message, analysis, keyword, action))
    }

    /// Sweep now and then every `interval` until Ctrl-C
    pub async fn run_forever<F>(&self, interval: Duration, on_sweep: F) -> usize
    where
        F: FnMut(&[SweepResult]),
    {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(interval, shutdown, on_sweep).await
    }

    /// Sweep now and then every `interval` until `shutdown` resolves; returns sweeps run
    ///
    /// Sweeps run back-to-back on this task, so a slow sweep delays the next
    /// tick instead of overlapping it. A failed sweep is logged and the loop continues.
    pub async fn run_until<S, F>(&self, interval: Duration, shutdown: S, mut on_sweep: F) -> usize
    where
        S: Future<Output = ()>,
        F: FnMut(&[SweepResult]),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut sweeps = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping after {} sweeps", sweeps);
                    break;
                }
                _ = ticker.tick() => {
                    sweeps += 1;
                    match self.run().await {
                        Ok(results) => on_sweep(&results),
                        Err(e) => error!("Sweep failed: {}", e),
                    }
                }
            }
        }
        sweeps
    }
}
