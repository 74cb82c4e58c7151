use crate::config::TwitchConfig;
use crate::error::{StorageError, TokenError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// A Twitch access token persisted alongside its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Relevant fields of the OAuth token exchange response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Stored-token fetch and refresh-token exchange against the Twitch OAuth
/// endpoint. Tokens are appended to a JSON history file; the newest entry is
/// the current one.
pub struct TwitchTokenService {
    config: TwitchConfig,
    http: reqwest::Client,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl TwitchTokenService {
    pub fn new<P: AsRef<Path>>(config: TwitchConfig, path: P) -> Result<Self, TokenError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            config,
            http,
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Most recently stored access token, if any
    pub async fn current_token(&self) -> Result<Option<StoredToken>, TokenError> {
        let tokens = self.load_tokens().await?;
        Ok(tokens.into_iter().last())
    }

    /// Exchange the configured refresh token for a new access token and
    /// persist it.
    pub async fn refresh(&self) -> Result<StoredToken, TokenError> {
        if self.config.client_id.is_empty()
            || self.config.client_secret.is_empty()
            || self.config.refresh_token.is_empty()
        {
            return Err(TokenError::MissingCredentials);
        }

        debug!("Requesting token refresh from {}", self.config.token_url);

        let response = self
            .http
            .post(&self.config.token_url)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TokenError::Rejected {
                status: response.status().as_u16(),
            });
        }

        let token_data: TokenResponse = response.json().await?;
        let now = Utc::now();
        let token = StoredToken {
            access_token: token_data.access_token,
            expires_at: now + Duration::seconds(token_data.expires_in),
            created_at: now,
        };

        self.append_token(token.clone()).await?;
        info!(expires_at = %token.expires_at, "New access token saved");

        Ok(token)
    }

    async fn load_tokens(&self) -> Result<Vec<StoredToken>, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn append_token(&self, token: StoredToken) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut tokens = self.load_tokens().await?;
        tokens.push(token);
        let json = serde_json::to_vec_pretty(&tokens)?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &json)
            .await
            .map_err(|source| StorageError::Write {
                path: tmp_path.clone(),
                source,
            })?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| StorageError::Write {
                path: self.path.clone(),
                source,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &Path) -> TwitchTokenService {
        TwitchTokenService::new(TwitchConfig::default(), dir.join("tokens.json")).unwrap()
    }

    #[tokio::test]
    async fn test_no_token_before_first_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert_eq!(service.current_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_newest_token_wins() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let now = Utc::now();

        for (i, name) in ["older", "newer"].iter().enumerate() {
            service
                .append_token(StoredToken {
                    access_token: name.to_string(),
                    expires_at: now + Duration::seconds(3600 + i as i64),
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let current = service.current_token().await.unwrap().unwrap();
        assert_eq!(current.access_token, "newer");
    }

    #[tokio::test]
    async fn test_refresh_without_credentials_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let result = service.refresh().await;
        assert!(matches!(result, Err(TokenError::MissingCredentials)));
    }

    #[test]
    fn test_token_response_parsing() {
        let body = r#"{
            "access_token": "abc123",
            "refresh_token": "ignored",
            "expires_in": 14400,
            "token_type": "bearer"
        }"#;

        let parsed: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "abc123");
        assert_eq!(parsed.expires_in, 14400);
    }
}
