use axum::{
    Json,
    extract::{FromRef, FromRequestParts, State},
    http::request::Parts,
};

use entrevistes_api::db;
use entrevistes_api::{AuthStatusResponse, Rol, service};

use crate::config::AppConfig;
use crate::error::ApiErr;
use crate::google::id_token::IdTokenVerifier;
use crate::storage::Db;

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// Authenticated staff member, from a Google ID token in `X-ID-Token` or
/// `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
    pub rol: Rol,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.rol == Rol::Admin
    }

    /// Admins pass every check; other roles must be listed.
    pub fn require(&self, roles: &[Rol]) -> Result<(), ApiErr> {
        if self.is_admin() || roles.contains(&self.rol) {
            Ok(())
        } else {
            Err(ApiErr::forbidden("Permís denegat"))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiErr> {
        self.require(&[Rol::Admin])
    }
}

fn denied(reason: &str) -> ApiErr {
    ApiErr::forbidden(format!("Permís denegat - {reason}"))
}

/// Raw token from the request headers, without any `Bearer ` prefix.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    let raw = parts
        .headers
        .get("x-id-token")
        .or_else(|| parts.headers.get("authorization"))
        .and_then(|v| v.to_str().ok())?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then(|| token.to_string())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
    IdTokenVerifier: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let token = token_from_parts(parts).ok_or_else(|| denied("No hay token"))?;

        let email = if config.disable_auth {
            token
        } else {
            let claims = IdTokenVerifier::from_ref(state)
                .verify(&token)
                .await
                .map_err(|e| {
                    tracing::debug!("id token rejected: {e}");
                    denied("Error de autenticación")
                })?;
            claims.email.ok_or_else(|| denied("Token inválido"))?
        };

        let email = email.trim().to_lowercase();
        if !service::email_in_domain(&email, &config.allowed_domain) {
            tracing::info!(%email, "login from outside {}", config.allowed_domain);
            return Err(denied("Dominio no permitido"));
        }

        let db = Db::from_ref(state);
        let rol = match db.fetch_optional::<(String,)>(db::usuaris::get_rol(&email)).await {
            Ok(row) => row.and_then(|(r,)| Rol::parse(&r)).unwrap_or_default(),
            Err(e) => {
                tracing::warn!("reading role of {email}, defaulting to docent: {e}");
                Rol::Docent
            }
        };

        Ok(AuthUser { email, rol })
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/auth/status: whether development auth is on.
pub async fn auth_status(State(config): State<AppConfig>) -> Json<AuthStatusResponse> {
    let message = if config.disable_auth {
        "Autenticación deshabilitada"
    } else {
        "Autenticación habilitada"
    };
    Json(AuthStatusResponse {
        disabled: config.disable_auth,
        message: message.to_string(),
        allowed_domain: config.allowed_domain.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;
    use axum::http::{Request, StatusCode};

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut req = Request::builder().uri("/");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn token_prefers_id_token_header() {
        let p = parts(&[("x-id-token", "abc"), ("authorization", "Bearer xyz")]);
        assert_eq!(token_from_parts(&p).as_deref(), Some("abc"));
        let p = parts(&[("authorization", "Bearer xyz")]);
        assert_eq!(token_from_parts(&p).as_deref(), Some("xyz"));
        let p = parts(&[("authorization", "Bearer ")]);
        assert_eq!(token_from_parts(&p), None);
    }

    #[test]
    fn admins_pass_every_role_check() {
        let admin = AuthUser { email: "a@insbitacola.cat".into(), rol: Rol::Admin };
        let docent = AuthUser { email: "d@insbitacola.cat".into(), rol: Rol::Docent };
        assert!(admin.require(&[Rol::Docent]).is_ok());
        assert!(docent.require(&[Rol::Docent]).is_ok());
        let err = docent.require_admin().unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Permís denegat");
    }

    #[tokio::test]
    async fn missing_token_is_forbidden() {
        let state = AppState::for_tests(false);
        let mut p = parts(&[]);
        let err = AuthUser::from_request_parts(&mut p, &state).await.unwrap_err();
        assert_eq!(err.message(), "Permís denegat - No hay token");
    }

    #[tokio::test]
    async fn dev_mode_checks_domain() {
        let state = AppState::for_tests(true);
        let mut p = parts(&[("authorization", "Bearer intruder@gmail.com")]);
        let err = AuthUser::from_request_parts(&mut p, &state).await.unwrap_err();
        assert_eq!(err.message(), "Permís denegat - Dominio no permitido");
    }

    #[tokio::test]
    async fn dev_mode_defaults_to_docent_without_database() {
        let state = AppState::for_tests(true);
        let mut p = parts(&[("x-id-token", "Tutor@InsBitacola.cat")]);
        let user = AuthUser::from_request_parts(&mut p, &state).await.unwrap();
        assert_eq!(user.email, "tutor@insbitacola.cat");
        assert_eq!(user.rol, Rol::Docent);
    }

    #[tokio::test]
    async fn invalid_token_is_an_authentication_error() {
        let state = AppState::for_tests(false);
        let mut p = parts(&[("authorization", "Bearer not-a-jwt")]);
        let err = AuthUser::from_request_parts(&mut p, &state).await.unwrap_err();
        assert_eq!(err.message(), "Permís denegat - Error de autenticación");
    }
}
