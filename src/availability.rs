//! Free/busy lookup used when drafting scheduling replies

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::MailClient;

/// Prompt context used whenever availability cannot be fetched
pub const AVAILABILITY_UNAVAILABLE: &str = "Availability data unavailable.";

/// Days ahead covered by the free/busy window
const WINDOW_DAYS: i64 = 3;

pub struct AvailabilityChecker {
    client: Arc<dyn MailClient>,
    calendars: Vec<String>,
}

impl AvailabilityChecker {
    pub fn new(client: Arc<dyn MailClient>, calendars: Vec<String>) -> Self {
        Self { client, calendars }
    }

    /// Busy slots for now..now+3 days as JSON, or the fallback string on any failure
    pub async fn availability_context(&self) -> String {
        let start = Utc::now();
        let end = start + Duration::days(WINDOW_DAYS);

        let slots = match self.client.free_busy(&self.calendars, start, end).await {
            Ok(slots) => slots,
            Err(e) => {
                warn!("Calendar check failed, falling back to generic reply: {}", e);
                return AVAILABILITY_UNAVAILABLE.to_string();
            }
        };

        debug!("{} busy slots in the next {} days", slots.len(), WINDOW_DAYS);
        serde_json::to_string(&slots).unwrap_or_else(|e| {
            warn!("Failed to serialize busy slots: {}", e);
            AVAILABILITY_UNAVAILABLE.to_string()
        })
    }
}
