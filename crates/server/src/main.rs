mod config;
mod cron;
mod email;
mod error;
mod google;
mod routes;
mod sheets_repo;
mod storage;
mod sync;

use std::time::Instant;

use axum::{Router, extract::FromRef, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::AppConfig;
use email::EmailService;
use google::calendar::CalendarClient;
use google::id_token::IdTokenVerifier;
use google::sheets::SheetsClient;
use sheets_repo::SheetsRepo;
use storage::Db;
use sync::SyncService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub verifier: IdTokenVerifier,
    pub sync: SyncService,
    pub sheets: SheetsClient,
    pub email: EmailService,
    pub started_at: Instant,
}

impl AppState {
    /// Repository over one spreadsheet.
    pub fn sheets_repo(&self, spreadsheet_id: &str) -> SheetsRepo {
        let fallback = self
            .config
            .any_actual
            .clone()
            .unwrap_or_else(|| entrevistes_api::service::DEFAULT_ANY_CURS.into());
        SheetsRepo::new(self.sheets.clone(), spreadsheet_id, fallback)
    }

    /// Repository over `SHEETS_SPREADSHEET_ID`, when configured.
    pub fn default_sheets_repo(&self) -> Option<SheetsRepo> {
        self.config
            .sheets_spreadsheet_id
            .as_deref()
            .map(|id| self.sheets_repo(id))
    }

    /// State without credentials or a reachable database.
    #[cfg(test)]
    pub fn for_tests(disable_auth: bool) -> Self {
        let mut config = AppConfig::from_lookup(|_| None);
        config.disable_auth = disable_auth;
        let http = reqwest::Client::new();
        let db = storage::lazy_db();
        let calendar = CalendarClient::new(http.clone(), None, config.calendar_timezone, false);
        Self {
            sync: SyncService::new(db.clone(), calendar),
            db,
            verifier: IdTokenVerifier::with_certs_url(
                http.clone(),
                Some("test-client".into()),
                "http://127.0.0.1:1/certs",
            ),
            sheets: SheetsClient::new(http, None),
            email: EmailService::new(format!("noreply@{}", config.allowed_domain)),
            config,
            started_at: Instant::now(),
        }
    }
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for IdTokenVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

impl FromRef<AppState> for SyncService {
    fn from_ref(state: &AppState) -> Self {
        state.sync.clone()
    }
}

impl FromRef<AppState> for CalendarClient {
    fn from_ref(state: &AppState) -> Self {
        state.sync.calendar().clone()
    }
}

impl FromRef<AppState> for SheetsClient {
    fn from_ref(state: &AppState) -> Self {
        state.sheets.clone()
    }
}

impl FromRef<AppState> for EmailService {
    fn from_ref(state: &AppState) -> Self {
        state.email.clone()
    }
}

/// Full HTTP surface. Every resource router is mounted at the root.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/health", routes::health::router())
        .route("/api/auth/status", get(routes::auth::auth_status))
        .nest("/usuaris", routes::usuaris::router())
        .nest("/alumnes", routes::alumnes::router())
        .nest("/alumnes-db", routes::alumnes_db::router())
        .nest("/entrevistes", routes::entrevistes::router())
        .nest("/cursos", routes::cursos::router())
        .nest("/tutors", routes::tutors::router())
        .nest("/citas", routes::citas::router())
        .nest("/dades-personals", routes::dades_personals::router())
        .nest("/emails", routes::emails::router())
        .nest("/import", routes::import::router())
        .nest("/sheets", routes::sheets::router())
        .nest("/admin", routes::admin::router())
        .nest("/consolidacion", routes::consolidacion::router())
        .nest("/google-calendar-webhook", routes::webhook::router())
        .nest("/calendari-public", routes::calendari_public::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entrevistes_server=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    if config.disable_auth {
        tracing::warn!("DISABLE_AUTH is on: bearer values are trusted as emails");
    }
    if config.google_client_id.is_none() && !config.disable_auth {
        tracing::warn!("GOOGLE_CLIENT_ID not set, ID token audience is not checked");
    }

    let db = storage::init_db(&config.database_url, config.any_actual.clone()).await?;
    tracing::info!("database initialized");

    let http = reqwest::Client::new();
    let calendar = CalendarClient::new(
        http.clone(),
        config.calendar_account.clone(),
        config.calendar_timezone,
        config.calendar_domain_wide,
    );
    let sync = SyncService::new(db.clone(), calendar);
    let email = EmailService::new(format!("noreply@{}", config.allowed_domain));

    let state = AppState {
        db: db.clone(),
        verifier: IdTokenVerifier::new(http.clone(), config.google_client_id.clone()),
        sheets: SheetsClient::new(http, config.sheets_account.clone()),
        sync: sync.clone(),
        email: email.clone(),
        config: config.clone(),
        started_at: Instant::now(),
    };

    // Held for the lifetime of the process; dropping it stops the jobs.
    let _scheduler = if config.enable_cron {
        let ctx = cron::CronContext {
            db,
            sync,
            email,
            timezone: config.calendar_timezone,
        };
        Some(cron::start(ctx, config.sync_interval_minutes).await?)
    } else {
        tracing::info!("cron jobs disabled (ENABLE_CRON=false)");
        None
    };

    let port = config.port;
    tracing::info!("starting server on port {port}");
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
