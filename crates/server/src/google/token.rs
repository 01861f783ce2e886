//! Service-account OAuth: a signed JWT assertion exchanged for an access
//! token, cached until shortly before it expires.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{GoogleError, ServiceAccount, check_status};

pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Seconds before expiry at which a cached token is refreshed.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

struct Inner {
    http: reqwest::Client,
    account: ServiceAccount,
    scope: &'static str,
    subject: Option<String>,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

/// Access-token provider for one service account and scope.
#[derive(Clone)]
pub struct TokenSource {
    inner: Arc<Inner>,
}

impl TokenSource {
    /// `subject` impersonates a Workspace user (domain-wide delegation).
    pub fn with_token_url(
        http: reqwest::Client,
        account: ServiceAccount,
        scope: &'static str,
        subject: Option<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                account,
                scope,
                subject,
                token_url: token_url.into(),
                cached: Mutex::new(None),
            }),
        }
    }

    pub async fn access_token(&self) -> Result<String, GoogleError> {
        let mut cached = self.inner.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(hit) = cached
            .as_ref()
            .filter(|c| c.expires_at - REFRESH_MARGIN_SECS > now)
        {
            return Ok(hit.token.clone());
        }

        let assertion = self.sign_assertion(now)?;
        let resp = self
            .inner
            .http
            .post(&self.inner.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let body: TokenResponse = check_status(resp).await?.json().await?;

        tracing::debug!(account = %self.inner.account.client_email, "google access token refreshed");
        *cached = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at: now + body.expires_in,
        });
        Ok(body.access_token)
    }

    fn sign_assertion(&self, now: i64) -> Result<String, GoogleError> {
        let claims = AssertionClaims {
            iss: &self.inner.account.client_email,
            scope: self.inner.scope,
            aud: &self.inner.token_url,
            iat: now,
            exp: now + 3600,
            sub: self.inner.subject.as_deref(),
        };
        let key = EncodingKey::from_rsa_pem(self.inner.account.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &key,
        )?)
    }
}
