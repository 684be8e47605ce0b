//! OAuth2 mailbox connection for the Gmail and Calendar APIs

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use yup_oauth2::ApplicationSecret;

use crate::error::{Result, TriageError};

/// Scopes needed by the triage pipeline
///
/// - gmail.modify: read messages and move them between labels
/// - gmail.labels: find or create the review folder
/// - gmail.compose: drafts and sends
/// - calendar.freebusy: availability for scheduling replies
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/calendar.freebusy",
];

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<HttpsConnector>;

pub type CalendarHub = google_calendar3::CalendarHub<HttpsConnector>;

/// API hubs for one connected mailbox, sharing a single authenticator
pub struct MailboxHubs {
    pub gmail: GmailHub,
    pub calendar: CalendarHub,
}

/// Connect to a mailbox with the installed-app OAuth2 flow
///
/// Tokens are persisted to `token_cache_path` and refreshed automatically.
/// The first run opens a browser for consent.
pub async fn connect_mailbox(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<MailboxHubs> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to read credentials: {}", e)))?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| TriageError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Request every scope up front so the cached token covers both APIs
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| TriageError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(MailboxHubs {
        gmail: Gmail::new(client.clone(), auth.clone()),
        calendar: google_calendar3::CalendarHub::new(client, auth),
    })
}

/// Credential structure matching Google's OAuth2 credentials JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

/// Installed application credentials (desktop/CLI app)
#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

/// Load OAuth2 credentials from a JSON file
///
/// Only desktop ("installed") clients work with the redirect flow used by
/// [`connect_mailbox`]; anything else is a configuration error.
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content).map_err(|e| {
        TriageError::ConfigError(format!(
            "{} is not a desktop-app OAuth client file: {}",
            path.display(),
            e
        ))
    })
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `INBOX_TRIAGE_CLIENT_ID`: OAuth2 client ID
/// - `INBOX_TRIAGE_CLIENT_SECRET`: OAuth2 client secret
/// - `INBOX_TRIAGE_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("INBOX_TRIAGE_CLIENT_ID")
        .map_err(|_| TriageError::ConfigError("INBOX_TRIAGE_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("INBOX_TRIAGE_CLIENT_SECRET")
        .map_err(|_| TriageError::ConfigError("INBOX_TRIAGE_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("INBOX_TRIAGE_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Write credentials from the environment to `path` in Google's JSON layout
pub async fn write_credentials_from_env(path: &Path) -> Result<()> {
    let secret = load_credentials_from_env()?;
    let creds = Credentials {
        installed: InstalledApp {
            client_id: secret.client_id,
            project_id: String::new(),
            auth_uri: secret.auth_uri,
            token_uri: secret.token_uri,
            client_secret: secret.client_secret,
            redirect_uris: secret.redirect_uris,
        },
    };
    tokio::fs::write(path, serde_json::to_string_pretty(&creds)?).await?;
    Ok(())
}

/// Restrict the token cache to the owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // ACL-based; left to the user profile defaults
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_credentials() {
        let credentials_json = r#"{
            "installed": {
                "client_id": "test-client-id",
                "project_id": "test-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost:8080"]
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let creds = load_credentials(temp_file.path()).await.unwrap();
        assert_eq!(creds.installed.client_id, "test-client-id");
        assert_eq!(creds.installed.client_secret, "test-secret");
    }

    #[tokio::test]
    async fn test_load_credentials_rejects_web_client() {
        let web_json = r#"{
            "web": {
                "client_id": "web-client-id",
                "client_secret": "web-secret"
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), web_json).await.unwrap();

        match load_credentials(temp_file.path()).await {
            Err(TriageError::ConfigError(msg)) => assert!(msg.contains("desktop-app")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_mailbox_missing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let result = connect_mailbox(
            &dir.path().join("missing.json"),
            &dir.path().join("token.json"),
        )
        .await;
        match result {
            Err(TriageError::AuthError(msg)) => assert!(msg.contains("Failed to read credentials")),
            _ => panic!("expected AuthError"),
        }
    }

    #[tokio::test]
    async fn test_secure_token_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "test content")
            .await
            .unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env() {
        env::set_var("INBOX_TRIAGE_CLIENT_ID", "test-id");
        env::set_var("INBOX_TRIAGE_CLIENT_SECRET", "test-secret");
        env::set_var("INBOX_TRIAGE_REDIRECT_URI", "http://localhost:9999");

        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.client_id, "test-id");
        assert_eq!(secret.client_secret, "test-secret");
        assert_eq!(secret.redirect_uris[0], "http://localhost:9999");

        env::remove_var("INBOX_TRIAGE_CLIENT_ID");
        env::remove_var("INBOX_TRIAGE_CLIENT_SECRET");
        env::remove_var("INBOX_TRIAGE_REDIRECT_URI");
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env_missing_id() {
        env::remove_var("INBOX_TRIAGE_CLIENT_ID");
        env::set_var("INBOX_TRIAGE_CLIENT_SECRET", "test-secret");

        let result = load_credentials_from_env();
        assert!(matches!(result, Err(TriageError::ConfigError(_))));

        env::remove_var("INBOX_TRIAGE_CLIENT_SECRET");
    }

    #[tokio::test]
    #[serial]
    async fn test_write_credentials_from_env_round_trips() {
        env::set_var("INBOX_TRIAGE_CLIENT_ID", "env-id");
        env::set_var("INBOX_TRIAGE_CLIENT_SECRET", "env-secret");
        env::remove_var("INBOX_TRIAGE_REDIRECT_URI");

        let temp_file = NamedTempFile::new().unwrap();
        write_credentials_from_env(temp_file.path()).await.unwrap();
        let creds = load_credentials(temp_file.path()).await.unwrap();
        assert_eq!(creds.installed.client_id, "env-id");
        assert_eq!(creds.installed.redirect_uris, vec!["http://localhost:8080"]);

        env::remove_var("INBOX_TRIAGE_CLIENT_ID");
        env::remove_var("INBOX_TRIAGE_CLIENT_SECRET");
    }

    #[test]
    fn test_scopes_constants() {
        assert_eq!(REQUIRED_SCOPES.len(), 4);
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.compose"));
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/calendar.freebusy"));
    }
}
