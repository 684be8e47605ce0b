//! Markdown checklist of items that need a human

use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::Analysis;

const HEADER: &str = "# 📬 Inbox Zero - Action Items\n\nGenerated by your triage assistant.\n\n";

/// Append-only action log, deduplicated by exact subject
pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry unless one with the same subject exists; returns whether it was written
    pub async fn record(&self, analysis: &Analysis, subject: &str) -> Result<bool> {
        let entry = format_entry(analysis, subject, &Local::now().format("%Y-%m-%d %H:%M").to_string());

        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            None => {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&self.path, format!("{}{}", HEADER, entry)).await?;
                info!("Created action log {:?}", self.path);
            }
            Some(content) => {
                if logged_subjects(&content).any(|s| s == subject) {
                    debug!("Action log already has \"{}\"", subject);
                    return Ok(false);
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(&self.path)
                    .await?;
                file.write_all(entry.as_bytes()).await?;
                file.flush().await?;
            }
        }

        Ok(true)
    }
}

fn format_entry(analysis: &Analysis, subject: &str, added: &str) -> String {
    format!(
        "- [ ] **{}**: {}\n  - *Summary*: {}\n  - *Action*: {}\n  - *Added*: {}\n\n",
        analysis.category, subject, analysis.summary, analysis.suggested_action, added
    )
}

/// Subjects of `- [ ] **CATEGORY**: subject` lines
fn logged_subjects(content: &str) -> impl Iterator<Item = &str> {
    content.lines().filter_map(|line| {
        let rest = line.strip_prefix("- [")?;
        let rest = rest.get(1..)?.strip_prefix("] **")?;
        let (_, subject) = rest.split_once("**: ")?;
        Some(subject)
    })
}
