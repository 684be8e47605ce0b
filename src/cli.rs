//! Command-line interface

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use crossterm::style::{StyledContent, Stylize};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::categories::CategoryTable;
use crate::config::MAX_MESSAGE_LIMIT;
use crate::models::{ActionOutcome, Category, SweepResult};

#[derive(Parser, Debug)]
#[command(name = "inbox-triage")]
#[command(version = "0.1.0")]
#[command(about = "AI inbox triage: classify, draft, send and file recent email", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".inbox-triage/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail and Google Calendar
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Run one sweep over the most recent messages
    Sweep {
        /// Mailbox to sweep (defaults to mailbox.user_id)
        #[arg(long)]
        mailbox: Option<String>,

        /// Number of messages to process (defaults to sweep.message_limit)
        #[arg(short, long, value_parser = parse_message_limit)]
        limit: Option<usize>,

        /// Classify only; make no changes to the mailbox
        #[arg(long)]
        dry_run: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sweep now and then on a fixed interval until Ctrl-C
    Watch {
        /// Seconds between sweeps (defaults to sweep.interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Number of messages per sweep (defaults to sweep.message_limit)
        #[arg(short, long, value_parser = parse_message_limit)]
        limit: Option<usize>,

        /// Classify only; make no changes to the mailbox
        #[arg(long)]
        dry_run: bool,
    },

    /// Classify a single message without touching the mailbox
    Classify {
        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "")]
        snippet: String,

        /// Sender address
        #[arg(long)]
        from: Option<String>,

        /// Also preview the reply that would be drafted or sent
        #[arg(long)]
        reply: bool,
    },

    /// Show the category table in priority order
    Categories,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// `--limit` accepts 1 to [`MAX_MESSAGE_LIMIT`]
fn parse_message_limit(value: &str) -> Result<usize, String> {
    let limit: usize = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    if (1..=MAX_MESSAGE_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(format!("must be between 1 and {}", MAX_MESSAGE_LIMIT))
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share the MultiProgress that tracing output is routed through
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Colored badge for a category
pub fn category_badge(category: &Category) -> StyledContent<String> {
    let label = format!(" {} ", category);
    match category {
        Category::Emergency | Category::UrgentP0 => label.on_red().white(),
        Category::ActionRequired => label.on_yellow().black(),
        Category::CalendarSync => label.on_blue().white(),
        Category::LowSignal => label.dark_grey(),
        Category::SecurityRisk => label.on_magenta().white(),
        Category::Other(_) => label.white(),
    }
}

/// One-line description of an action outcome
pub fn describe_outcome(outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::DraftSaved { to, .. } => format!("draft saved for {}", to),
        ActionOutcome::ReplySent { to, .. } => format!("reply sent to {}", to),
        ActionOutcome::MovedToFolder { folder_name, .. } => {
            format!("moved to \"{}\"", folder_name)
        }
        ActionOutcome::Flagged => "flagged, no reply".to_string(),
        ActionOutcome::Skipped { reason } => format!("skipped ({})", reason),
        ActionOutcome::NoAction => "no action defined".to_string(),
        ActionOutcome::DryRun { planned } => format!("would {}", planned),
    }
}

/// Category table as printed by the `categories` command
pub fn format_category_table(table: &CategoryTable) -> String {
    let mut out = String::new();
    for category in table.iter() {
        out.push_str(&format!(
            "{:>3}  {:<16} {}\n     keywords: {}\n",
            category.priority,
            category.name,
            category.intent,
            if category.keywords.is_empty() {
                "(none)".to_string()
            } else {
                category.keywords.join(", ")
            }
        ));
    }
    out
}

/// Outcome of one sweep as shown to the user
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub sweep_started_at: DateTime<Utc>,
    pub sweep_completed_at: DateTime<Utc>,
    pub dry_run: bool,
    pub results: Vec<SweepResult>,
}

impl SweepReport {
    pub fn new(
        sweep_started_at: DateTime<Utc>,
        dry_run: bool,
        results: Vec<SweepResult>,
    ) -> Self {
        Self {
            sweep_started_at,
            sweep_completed_at: Utc::now(),
            dry_run,
            results,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Messages decided by a keyword rather than the model
    pub fn overrides(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.override_keyword.is_some())
            .count()
    }

    pub fn drafts(&self) -> usize {
        self.count_outcomes(|o| matches!(o, ActionOutcome::DraftSaved { .. }))
    }

    pub fn sent(&self) -> usize {
        self.count_outcomes(|o| matches!(o, ActionOutcome::ReplySent { .. }))
    }

    pub fn moved(&self) -> usize {
        self.count_outcomes(|o| matches!(o, ActionOutcome::MovedToFolder { .. }))
    }

    fn count_outcomes(&self, predicate: impl Fn(&ActionOutcome) -> bool) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.action.as_ref())
            .filter(|o| predicate(o))
            .count()
    }

    /// Response body of the on-demand sweep surface
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": true,
            "results": self.results,
        })
    }

    /// Colored per-message lines followed by totals
    pub fn print_summary(&self) {
        println!("\n========================================");
        if self.dry_run {
            println!("Sweep Summary (DRY RUN)");
        } else {
            println!("Sweep Summary");
        }
        println!("========================================");

        for (i, result) in self.results.iter().enumerate() {
            let subject = truncate_string(&result.subject, 60);
            match (&result.analysis, &result.error) {
                (Some(analysis), _) => {
                    println!("{:>2}. {} {}", i + 1, category_badge(&analysis.category), subject);
                    println!("    {}", analysis.summary.as_str().cyan());
                    if let Some(keyword) = &result.override_keyword {
                        println!("    override keyword: \"{}\"", keyword);
                    }
                    if let Some(action) = &result.action {
                        println!("    → {}", describe_outcome(action));
                    }
                }
                (None, error) => {
                    println!("{:>2}. {} {}", i + 1, " FAILED ".on_red().white(), subject);
                    println!(
                        "    {}",
                        error.as_deref().unwrap_or("unknown error").red()
                    );
                }
            }
        }

        println!("----------------------------------------");
        println!(
            "Processed: {}  Succeeded: {}  Failed: {}",
            self.results.len(),
            self.succeeded(),
            self.failed()
        );
        println!(
            "Drafts: {}  Sent: {}  Moved: {}  Keyword overrides: {}",
            self.drafts(),
            self.sent(),
            self.moved(),
            self.overrides()
        );
        println!(
            "Duration: {} seconds",
            (self.sweep_completed_at - self.sweep_started_at).num_seconds()
        );
        println!("========================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TriageError;
    use crate::models::{Analysis, MailMessage};

    fn message(id: &str) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            thread_id: None,
            subject: format!("Subject {}", id),
            snippet: String::new(),
            sender: None,
            message_id_header: None,
            received_at: None,
            extra: Default::default(),
        }
    }

    fn analysis(category: Category) -> Analysis {
        Analysis {
            category,
            summary: "s".to_string(),
            suggested_action: "a".to_string(),
        }
    }

    fn report() -> SweepReport {
        SweepReport::new(
            Utc::now(),
            false,
            vec![
                SweepResult::succeeded(
                    &message("1"),
                    analysis(Category::Emergency),
                    Some("critical".to_string()),
                    ActionOutcome::DraftSaved {
                        draft_id: "d1".to_string(),
                        to: "ops@example.com".to_string(),
                    },
                ),
                SweepResult::succeeded(
                    &message("2"),
                    analysis(Category::LowSignal),
                    None,
                    ActionOutcome::MovedToFolder {
                        folder_id: "Label_1".to_string(),
                        folder_name: "Review Later".to_string(),
                    },
                ),
                SweepResult::failed(
                    &message("3"),
                    &TriageError::MalformedResponse("not json".to_string()),
                ),
            ],
        )
    }

    #[test]
    fn test_report_counts() {
        let report = report();
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.drafts(), 1);
        assert_eq!(report.sent(), 0);
        assert_eq!(report.moved(), 1);
        assert_eq!(report.overrides(), 1);
    }

    #[test]
    fn test_report_json_shape() {
        let json = report().to_json();
        assert_eq!(json["success"], true);
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["analysis"]["category"], "Emergency");
        assert_eq!(results[0]["action"]["type"], "draft_saved");
        assert_eq!(results[2]["success"], false);
        assert!(results[2].get("analysis").is_none());
        assert!(results[2]["error"].as_str().unwrap().contains("not json"));
    }

    #[test]
    fn test_describe_outcome() {
        assert_eq!(
            describe_outcome(&ActionOutcome::DryRun {
                planned: "send reply".to_string()
            }),
            "would send reply"
        );
        assert_eq!(
            describe_outcome(&ActionOutcome::Skipped {
                reason: "no sender email address".to_string()
            }),
            "skipped (no sender email address)"
        );
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a very long subject line", 10), "a very ...");
    }

    #[test]
    fn test_format_category_table() {
        let table = CategoryTable::builtin().unwrap();
        let out = format_category_table(&table);
        let first = out.lines().next().unwrap();
        assert!(first.contains("URGENT_P0"));
        assert!(out.contains("keywords: "));
    }

    #[test]
    fn test_parse_sweep_command() {
        let cli = Cli::try_parse_from([
            "inbox-triage",
            "--json-logs",
            "sweep",
            "--limit",
            "10",
            "--dry-run",
            "--json",
        ])
        .unwrap();
        assert!(cli.json_logs);
        match cli.command {
            Commands::Sweep {
                limit,
                dry_run,
                json,
                mailbox,
            } => {
                assert_eq!(limit, Some(10));
                assert!(dry_run);
                assert!(json);
                assert!(mailbox.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_limit_is_bounded() {
        for bad in ["0", "101", "1000", "ten"] {
            assert!(
                Cli::try_parse_from(["inbox-triage", "sweep", "--limit", bad]).is_err(),
                "sweep --limit {} accepted",
                bad
            );
            assert!(Cli::try_parse_from(["inbox-triage", "watch", "--limit", bad]).is_err());
        }

        let cli = Cli::try_parse_from(["inbox-triage", "sweep", "--limit", "100"]).unwrap();
        assert!(matches!(cli.command, Commands::Sweep { limit: Some(100), .. }));
        let cli = Cli::try_parse_from(["inbox-triage", "watch", "-l", "1"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch { limit: Some(1), .. }));
    }

    #[test]
    fn test_parse_classify_requires_subject() {
        assert!(Cli::try_parse_from(["inbox-triage", "classify"]).is_err());
        let cli = Cli::try_parse_from([
            "inbox-triage",
            "classify",
            "--subject",
            "CRITICAL: Database Outage",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Classify { reply: false, .. }));
    }
}
