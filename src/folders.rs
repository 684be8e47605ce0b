//! Review folder resolution with a per-instance cache

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::client::MailClient;
use crate::error::{Result, TriageError};
use crate::models::FolderInfo;
use crate::retry::{with_retry, RetryPolicy};

/// Finds or creates the review folder once and remembers its id
///
/// The cache lives as long as this value. A failed resolution leaves it
/// empty so the next message tries again.
pub struct ReviewFolder {
    client: Arc<dyn MailClient>,
    name: String,
    retry: RetryPolicy,
    resolved: OnceCell<FolderInfo>,
}

impl ReviewFolder {
    pub fn new(client: Arc<dyn MailClient>, name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            name: name.into(),
            retry,
            resolved: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached folder, if already resolved
    pub fn cached(&self) -> Option<&FolderInfo> {
        self.resolved.get()
    }

    /// Existing folder matched case-insensitively by name, otherwise a new one
    pub async fn resolve(&self) -> Result<&FolderInfo> {
        self.resolved
            .get_or_try_init(|| self.find_or_create())
            .await
            .map_err(|e| {
                TriageError::FolderError(format!("Failed to resolve folder '{}': {}", self.name, e))
            })
    }

    async fn find_or_create(&self) -> Result<FolderInfo> {
        let folders = with_retry("list_folders", &self.retry, || self.client.list_folders()).await?;

        if let Some(existing) = folders
            .into_iter()
            .find(|f| f.name.to_lowercase() == self.name.to_lowercase())
        {
            debug!("Found existing folder '{}' ({})", existing.name, existing.id);
            return Ok(existing);
        }

        info!("Creating \"{}\" folder", self.name);
        let id = with_retry("create_folder", &self.retry, || {
            self.client.create_folder(&self.name)
        })
        .await?;

        Ok(FolderInfo {
            id,
            name: self.name.clone(),
        })
    }
}
