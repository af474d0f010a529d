//! Service Account Authentication Module
//!
//! Exchanges a Google service-account key for short-lived bearer tokens
//! using the JWT-bearer grant. Tokens are cached and refreshed on use when
//! they are close to expiry; there is no background refresh timer.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use super::StoreError;

/// Full read/write access to the account's Drive files
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Default token endpoint when the key file does not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion (Google's maximum)
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this many seconds before the reported expiry
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Source of bearer tokens for API requests
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token, refreshing it if needed
    async fn access_token(&self) -> Result<SecretString, StoreError>;
}

/// A pre-issued access token. Never refreshed.
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<SecretString, StoreError> {
        if self.token.expose_secret().is_empty() {
            return Err(StoreError::Authentication("Access token is empty".to_string()));
        }
        Ok(SecretString::from(self.token.expose_secret().to_string()))
    }
}

/// Fields of a service-account JSON key that the token exchange needs
#[derive(Deserialize)]
struct RawServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Parsed service-account key
#[derive(Debug)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key_id: Option<String>,
    pub token_uri: String,
    private_key: SecretString,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let raw: RawServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidConfig(format!("Invalid service account key: {}", e)))?;

        if raw.client_email.trim().is_empty() {
            return Err(StoreError::InvalidConfig(
                "Service account key has no client_email".to_string(),
            ));
        }
        if !raw.private_key.contains("PRIVATE KEY") {
            return Err(StoreError::InvalidConfig(
                "Service account key has no PEM private_key".to_string(),
            ));
        }

        Ok(Self {
            client_email: raw.client_email,
            private_key_id: raw.private_key_id,
            token_uri: raw
                .token_uri
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            private_key: SecretString::from(raw.private_key),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidConfig(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Cached access token
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Unix timestamp
    expires_at: Option<i64>,
}

impl CachedToken {
    /// Check if token is expired (with 5 min buffer)
    fn is_expired(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + EXPIRY_BUFFER_SECS,
            None => false,
        }
    }
}

/// Token source backed by a service-account key
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    scope: String,
    client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            key,
            scope: DRIVE_SCOPE.to_string(),
            client,
            cached: RwLock::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Build the RS256-signed assertion for the token request
    fn signed_assertion(&self, now: i64) -> Result<String, StoreError> {
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let encoding_key =
            jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.expose_secret().as_bytes())
                .map_err(|e| StoreError::Authentication(format!("Unusable private key: {}", e)))?;

        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|e| StoreError::Authentication(format!("JWT encode: {}", e)))
    }

    async fn fetch_token(&self) -> Result<CachedToken, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let assertion = self.signed_assertion(now)?;

        let body = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode(JWT_BEARER_GRANT),
            urlencoding::encode(&assertion)
        );

        let response = self
            .client
            .post(&self.key.token_uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                // invalid_grant, invalid_client, disabled key
                400 | 401 | 403 => StoreError::Authentication(format!(
                    "Token exchange rejected ({}): {}",
                    status, text
                )),
                code => StoreError::Transport {
                    status: Some(code),
                    message: format!("Token endpoint: {}", text),
                },
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Authentication(format!("Invalid token response: {}", e)))?;

        info!("Access token obtained for {}", self.key.client_email);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: token.expires_in.map(|secs| now + secs),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<SecretString, StoreError> {
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = self.cached.read().await.as_ref() {
            if !token.is_expired(now) {
                return Ok(SecretString::from(token.access_token.clone()));
            }
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if !token.is_expired(now) {
                return Ok(SecretString::from(token.access_token.clone()));
            }
        }

        let token = self.fetch_token().await?;
        let secret = SecretString::from(token.access_token.clone());
        *cached = Some(token);
        Ok(secret)
    }
}
