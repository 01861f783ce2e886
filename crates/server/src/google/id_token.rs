//! Verification of Google Sign-In ID tokens against Google's published keys.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{GoogleError, check_status};

pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Claims read from a verified ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleClaims {
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub hd: Option<String>,
}

#[derive(Clone)]
pub struct IdTokenVerifier {
    http: reqwest::Client,
    certs_url: String,
    client_id: Option<String>,
    keys: Arc<RwLock<Option<(JwkSet, Instant)>>>,
}

impl IdTokenVerifier {
    pub fn new(http: reqwest::Client, client_id: Option<String>) -> Self {
        Self::with_certs_url(http, client_id, GOOGLE_CERTS_URL)
    }

    pub fn with_certs_url(
        http: reqwest::Client,
        client_id: Option<String>,
        certs_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            certs_url: certs_url.into(),
            client_id,
            keys: Arc::new(RwLock::new(None)),
        }
    }

    /// Check signature, issuer, expiry and (when configured) audience.
    pub async fn verify(&self, token: &str) -> Result<GoogleClaims, GoogleError> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| GoogleError::Unexpected("token without kid".into()))?;

        let jwks = self.jwks().await?;
        let jwk = jwks
            .find(&kid)
            .ok_or_else(|| GoogleError::Unexpected(format!("unknown signing key {kid}")))?;
        let key = DecodingKey::from_jwk(jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&ISSUERS);
        match &self.client_id {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Ok(jsonwebtoken::decode::<GoogleClaims>(token, &key, &validation)?.claims)
    }

    async fn jwks(&self) -> Result<JwkSet, GoogleError> {
        if let Some((set, fetched)) = self.keys.read().await.as_ref() {
            if fetched.elapsed() < JWKS_TTL {
                return Ok(set.clone());
            }
        }
        let resp = self.http.get(&self.certs_url).send().await?;
        let set: JwkSet = check_status(resp).await?.json().await?;
        *self.keys.write().await = Some((set.clone(), Instant::now()));
        tracing::debug!(keys = set.keys.len(), "google signing keys refreshed");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::testing;
    use jsonwebtoken::{EncodingKey, Header};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sign(claims: serde_json::Value, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.into());
        let key = EncodingKey::from_rsa_pem(testing::TEST_KEY.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, &claims, &key).unwrap()
    }

    fn claims(aud: &str) -> serde_json::Value {
        let now = chrono::Utc::now().timestamp();
        serde_json::json!({
            "iss": "https://accounts.google.com",
            "aud": aud,
            "iat": now,
            "exp": now + 600,
            "email": "Tutor@InsBitacola.cat",
            "email_verified": true
        })
    }

    async fn certs_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(testing::TEST_JWKS))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn verifier(server: &MockServer, client_id: Option<&str>) -> IdTokenVerifier {
        IdTokenVerifier::with_certs_url(
            reqwest::Client::new(),
            client_id.map(str::to_string),
            format!("{}/certs", server.uri()),
        )
    }

    #[tokio::test]
    async fn accepts_valid_token_and_caches_keys() {
        let server = certs_server().await;
        let v = verifier(&server, Some("client-123"));
        let token = sign(claims("client-123"), "test-kid");

        let first = v.verify(&token).await.unwrap();
        assert_eq!(first.email.as_deref(), Some("Tutor@InsBitacola.cat"));
        assert!(v.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_wrong_audience() {
        let server = certs_server().await;
        let v = verifier(&server, Some("client-123"));
        let token = sign(claims("someone-else"), "test-kid");
        assert!(matches!(v.verify(&token).await, Err(GoogleError::Jwt(_))));
    }

    #[tokio::test]
    async fn rejects_unknown_kid() {
        let server = certs_server().await;
        let v = verifier(&server, None);
        let token = sign(claims("client-123"), "rotated");
        assert!(matches!(v.verify(&token).await, Err(GoogleError::Unexpected(_))));
    }

    #[tokio::test]
    async fn garbage_is_rejected_without_fetching_keys() {
        let v = IdTokenVerifier::with_certs_url(reqwest::Client::new(), None, "http://127.0.0.1:1/certs");
        assert!(v.verify("not-a-jwt").await.is_err());
    }
}
