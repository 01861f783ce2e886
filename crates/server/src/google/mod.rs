//! Google Workspace clients: service-account tokens, ID-token verification,
//! Calendar and Sheets.

pub mod calendar;
pub mod id_token;
pub mod sheets;
pub mod token;

/// Service-account credentials.
#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("google api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Turn a non-2xx response into [`GoogleError::Api`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GoogleError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GoogleError::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    pub const TEST_KEY: &str = include_str!("../../testdata/google_test_key.pem");
    pub const TEST_JWKS: &str = include_str!("../../testdata/google_test_jwks.json");

    pub fn account() -> super::ServiceAccount {
        super::ServiceAccount {
            client_email: "svc@entrevistes.iam.gserviceaccount.com".into(),
            private_key: TEST_KEY.into(),
        }
    }
}
