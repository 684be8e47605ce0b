use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use inbox_triage::auth;
use inbox_triage::categories::CategoryTable;
use inbox_triage::classifier::AiClassifier;
use inbox_triage::cli::{self, Cli, Commands, ProgressReporter, SweepReport};
use inbox_triage::client::{MailClient, ProductionMailClient};
use inbox_triage::config::Config;
use inbox_triage::dispatcher::TriageAction;
use inbox_triage::error::TriageError;
use inbox_triage::llm::{LlmClient, OpenAiCompatibleClient};
use inbox_triage::models::{MailMessage, Participant};
use inbox_triage::overrides::KeywordOverride;
use inbox_triage::reply::ReplyGenerator;
use inbox_triage::retry::RetryPolicy;
use inbox_triage::sweep::{Sweeper, Triage};
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let Ok(mut buffer) = self.buffer.lock() else {
            return Ok(());
        };
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl MultiProgressMakeWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: inbox-triage --help");
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli, multi_progress: Arc<MultiProgress>) {
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("inbox_triage=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("inbox_triage=info,warn"))
    };

    let make_writer = MultiProgressMakeWriter::new(multi_progress);

    // Logs print above progress bars either way
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let multi_progress = Arc::new(MultiProgress::new());
    init_tracing(&cli, Arc::clone(&multi_progress));

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail and Google Calendar...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            if !cli.credentials.exists() {
                auth::write_credentials_from_env(&cli.credentials).await?;
                tracing::info!("Wrote credentials from environment to {:?}", cli.credentials);
            }
            let credentials = auth::load_credentials(&cli.credentials).await?;
            tracing::info!(
                client_id = %credentials.installed.client_id,
                project_id = %credentials.installed.project_id,
                "Using OAuth client"
            );

            let hubs = auth::connect_mailbox(&cli.credentials, &cli.token_cache).await?;
            let client = ProductionMailClient::new(hubs, "me", "in:inbox");

            println!("Successfully authenticated");
            println!("Token cached at: {:?}", cli.token_cache);
            println!("Connected to account: {}", client.account_email().await?);

            Ok(())
        }

        Commands::Sweep {
            mailbox,
            limit,
            dry_run,
            json,
        } => {
            let mut config = Config::load(&cli.config).await?;
            if let Some(mailbox) = mailbox {
                config.mailbox.user_id = mailbox.clone();
            }
            if *dry_run {
                config.execution.dry_run = true;
            }
            if let Some(limit) = limit {
                config.sweep.message_limit = *limit;
            }
            config.validate()?;
            let limit = config.sweep.message_limit;

            let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());
            let sweeper = build_sweeper(&cli, &config, &reporter).await?;

            let started_at = Utc::now();
            let spinner = reporter.add_spinner(&format!("Sweeping {} most recent messages...", limit));
            let results = sweeper.run_with_limit(limit).await?;
            reporter.finish_spinner(&spinner, &format!("Processed {} messages", results.len()));

            let report = SweepReport::new(started_at, config.execution.dry_run, results);
            if *json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                report.print_summary();
            }

            Ok(())
        }

        Commands::Watch {
            interval,
            limit,
            dry_run,
        } => {
            let mut config = Config::load(&cli.config).await?;
            if let Some(interval) = interval {
                config.sweep.interval_secs = *interval;
            }
            if let Some(limit) = limit {
                config.sweep.message_limit = *limit;
            }
            if *dry_run {
                config.execution.dry_run = true;
            }
            config.validate()?;

            let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());
            let sweeper = build_sweeper(&cli, &config, &reporter).await?;

            let interval = Duration::from_secs(config.sweep.interval_secs);
            let _ = reporter.multi_progress().println(format!(
                "Watching inbox every {}s ({} messages per sweep). Press Ctrl-C to stop.",
                interval.as_secs(),
                config.sweep.message_limit
            ));

            let dry_run = config.execution.dry_run;
            let mut last_started = Utc::now();
            let sweeps = sweeper
                .run_forever(interval, |results| {
                    SweepReport::new(last_started, dry_run, results.to_vec()).print_summary();
                    last_started = Utc::now();
                })
                .await;

            println!("Stopped after {} sweeps", sweeps);
            Ok(())
        }

        Commands::Classify {
            subject,
            snippet,
            from,
            reply,
        } => {
            let config = Config::load(&cli.config).await?;
            let categories = Arc::new(
                CategoryTable::load_or_builtin(config.classification.categories_file.as_deref())
                    .await?,
            );
            let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
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

            let message = MailMessage {
                id: "cli".to_string(),
                thread_id: None,
                subject: subject.clone(),
                snippet: snippet.clone(),
                sender: from.as_ref().map(|email| Participant::new(None, email.clone())),
                message_id_header: None,
                received_at: Some(Utc::now()),
                extra: Default::default(),
            };

            let (analysis, keyword) = triage.analyze(&message).await?;
            let action = TriageAction::for_category(&analysis.category);

            println!("Category: {}", cli::category_badge(&analysis.category));
            if let Some(keyword) = keyword {
                println!("Keyword override: \"{}\"", keyword);
            }
            println!("Summary:  {}", analysis.summary);
            println!("Action:   {}", analysis.suggested_action);
            println!("Would:    {}", action);

            if *reply && action.needs_reply() {
                // No mailbox connection here, so calendar replies get the fallback text
                let replies = ReplyGenerator::new(
                    llm,
                    categories,
                    None,
                    config.llm.reply_temperature,
                    config.reply.sign_off.clone(),
                    retry,
                );
                let body = replies.generate(&message, &analysis).await?;
                println!("\n--- {} ---\n{}", message.reply_subject(), body);
            }

            Ok(())
        }

        Commands::Categories => {
            let config = Config::load(&cli.config).await?;
            let table =
                CategoryTable::load_or_builtin(config.classification.categories_file.as_deref())
                    .await?;
            print!("{}", cli::format_category_table(&table));
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(TriageError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - llm.api_base / llm.model: OpenAI-compatible endpoint and model");
            println!("  - llm.api_key_env: environment variable holding the API key");
            println!("  - mailbox.review_folder: where low-signal mail is filed");
            println!("  - reply.sign_off: name used to sign generated replies");
            println!("  - execution.dry_run: classify without touching the mailbox");

            Ok(())
        }
    }
}

/// Connect the mailbox and the model and wire the sweep pipeline
async fn build_sweeper(cli: &Cli, config: &Config, reporter: &ProgressReporter) -> Result<Sweeper> {
    let categories = Arc::new(
        CategoryTable::load_or_builtin(config.classification.categories_file.as_deref()).await?,
    );
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);

    let auth_spinner = reporter.add_spinner("Connecting to mailbox...");
    let hubs = auth::connect_mailbox(&cli.credentials, &cli.token_cache).await?;
    let client: Arc<dyn MailClient> = Arc::new(ProductionMailClient::new(
        hubs,
        config.mailbox.user_id.clone(),
        config.mailbox.query.clone(),
    ));
    reporter.finish_spinner(
        &auth_spinner,
        &format!("Connected ({} categories loaded)", categories.len()),
    );

    Ok(Sweeper::from_config(client, llm, categories, config))
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(triage_err) = error.downcast_ref::<TriageError>() {
        match triage_err {
            TriageError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: inbox-triage auth --force");
            }
            TriageError::LlmError(_) | TriageError::MalformedResponse(_) => {
                eprintln!("\nHint: The model endpoint failed or answered in an unexpected format.");
                eprintln!("      Check llm.api_base and llm.model in your config.");
            }
            TriageError::MailApiError(_) | TriageError::ServerError { .. } => {
                eprintln!("\nHint: This may be a temporary API error.");
                eprintln!("      Try running the command again.");
            }
            TriageError::RateLimited(_) | TriageError::QuotaExceeded(_) => {
                eprintln!("\nHint: A provider rate limit was hit and retries ran out.");
                eprintln!("      Wait a minute, or raise retry.base_delay_ms in config.");
            }
            TriageError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: inbox-triage init-config --force");
            }
            _ => {}
        }
    }
}
