//! Google Calendar client for appointment events.
//!
//! Without service-account credentials the client runs in simulated mode:
//! creates return a `sim_` id, updates and deletes do nothing, and no
//! conflicts are ever reported.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use entrevistes_api::service;

use super::token::{CALENDAR_SCOPE, TOKEN_URL, TokenSource};
use super::{GoogleError, ServiceAccount, check_status};

const CALENDAR_API_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const CALENDAR_HOME: &str = "https://calendar.google.com";

#[derive(Debug, Clone)]
pub struct Attendee {
    pub email: String,
    pub name: Option<String>,
}

/// Event fields written for an appointment.
#[derive(Debug, Clone)]
pub struct EventDetails {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<Attendee>,
    /// Calendar owner; impersonated when domain-wide delegation is on.
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEvent {
    pub google_event_id: String,
    pub event_url: String,
}

#[derive(Deserialize)]
struct EventResource {
    id: String,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Deserialize, Default)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
}

#[derive(Deserialize)]
struct ListedEvent {
    id: Option<String>,
    #[serde(default)]
    start: EventTime,
    #[serde(default)]
    end: EventTime,
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<ListedEvent>,
}

#[derive(Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    account: Option<ServiceAccount>,
    timezone: Tz,
    domain_wide: bool,
    api_url: String,
    token_url: String,
    tokens: Arc<Mutex<HashMap<String, TokenSource>>>,
}

impl CalendarClient {
    pub fn new(
        http: reqwest::Client,
        account: Option<ServiceAccount>,
        timezone: Tz,
        domain_wide: bool,
    ) -> Self {
        if account.is_none() {
            warn!("Google Calendar not configured, using simulated mode");
        }
        Self {
            http,
            account,
            timezone,
            domain_wide,
            api_url: CALENDAR_API_URL.into(),
            token_url: TOKEN_URL.into(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Point the client at another API host (tests).
    pub fn with_endpoints(mut self, api_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.token_url = token_url.into();
        self
    }

    pub fn is_simulated(&self) -> bool {
        self.account.is_none()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    async fn bearer(&self, owner: Option<&str>) -> Result<Option<String>, GoogleError> {
        let Some(account) = &self.account else {
            return Ok(None);
        };
        let subject = owner.filter(|_| self.domain_wide).map(str::to_string);
        let key = subject.clone().unwrap_or_default();
        let source = {
            let mut tokens = self.tokens.lock().await;
            tokens
                .entry(key)
                .or_insert_with(|| {
                    TokenSource::with_token_url(
                        self.http.clone(),
                        account.clone(),
                        CALENDAR_SCOPE,
                        subject,
                        self.token_url.clone(),
                    )
                })
                .clone()
        };
        Ok(Some(source.access_token().await?))
    }

    fn event_body(&self, ev: &EventDetails) -> Value {
        let tz = self.timezone.name();
        json!({
            "summary": ev.title,
            "description": ev.description,
            "start": {
                "dateTime": ev.start.with_timezone(&self.timezone).to_rfc3339(),
                "timeZone": tz,
            },
            "end": {
                "dateTime": ev.end.with_timezone(&self.timezone).to_rfc3339(),
                "timeZone": tz,
            },
            "attendees": ev.attendees.iter().map(|a| json!({
                "email": a.email,
                "displayName": a.name,
                "responseStatus": "needsAction",
            })).collect::<Vec<_>>(),
            "reminders": {
                "useDefault": false,
                "overrides": [
                    {"method": "email", "minutes": 24 * 60},
                    {"method": "popup", "minutes": 30},
                ],
            },
            "guestsCanModify": false,
            "guestsCanInviteOthers": false,
            "guestsCanSeeOtherGuests": false,
        })
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/primary/events", self.api_url)
    }

    #[instrument(skip_all, fields(owner = ?ev.owner_email))]
    pub async fn create_event(&self, ev: &EventDetails) -> Result<CreatedEvent, GoogleError> {
        let Some(token) = self.bearer(ev.owner_email.as_deref()).await? else {
            let created = CreatedEvent {
                google_event_id: service::new_simulated_event_id(),
                event_url: CALENDAR_HOME.into(),
            };
            info!(event_id = %created.google_event_id, "simulated calendar event created");
            return Ok(created);
        };

        let resp = self
            .http
            .post(self.events_url())
            .query(&[("sendUpdates", "all")])
            .bearer_auth(token)
            .json(&self.event_body(ev))
            .send()
            .await?;
        let event: EventResource = check_status(resp).await?.json().await?;
        info!(event_id = %event.id, "calendar event created");
        Ok(CreatedEvent {
            google_event_id: event.id,
            event_url: event.html_link.unwrap_or_else(|| CALENDAR_HOME.into()),
        })
    }

    #[instrument(skip(self, ev), fields(owner = ?ev.owner_email))]
    pub async fn update_event(&self, event_id: &str, ev: &EventDetails) -> Result<(), GoogleError> {
        let Some(token) = self.bearer(ev.owner_email.as_deref()).await? else {
            return Ok(());
        };
        let resp = self
            .http
            .put(format!("{}/{}", self.events_url(), urlencoding::encode(event_id)))
            .query(&[("sendUpdates", "all")])
            .bearer_auth(token)
            .json(&self.event_body(ev))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Delete an event. Events already gone on Google's side count as deleted.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, event_id: &str, owner_email: Option<&str>) -> Result<(), GoogleError> {
        let Some(token) = self.bearer(owner_email).await? else {
            return Ok(());
        };
        let resp = self
            .http
            .delete(format!("{}/{}", self.events_url(), urlencoding::encode(event_id)))
            .query(&[("sendUpdates", "all")])
            .bearer_auth(token)
            .send()
            .await?;
        match check_status(resp).await {
            Ok(_) | Err(GoogleError::Api { status: 404 | 410, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether the owner's calendar has any timed event in `[start, end)`
    /// other than `exclude`. Lookup failures allow the booking.
    #[instrument(skip(self))]
    pub async fn check_conflicts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        owner_email: &str,
        exclude: Option<&str>,
    ) -> bool {
        match self.list_events(start, end, owner_email).await {
            Ok(events) => events.iter().any(|e| {
                e.id.as_deref() != exclude && e.start.date_time.is_some() && e.end.date_time.is_some()
            }),
            Err(e) => {
                warn!("checking calendar conflicts: {e}");
                false
            }
        }
    }

    async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        owner_email: &str,
    ) -> Result<Vec<ListedEvent>, GoogleError> {
        let Some(token) = self.bearer(Some(owner_email)).await? else {
            return Ok(Vec::new());
        };
        let resp = self
            .http
            .get(self.events_url())
            .query(&[
                ("timeMin", start.to_rfc3339()),
                ("timeMax", end.to_rfc3339()),
                ("singleEvents", "true".into()),
                ("orderBy", "startTime".into()),
            ])
            .bearer_auth(token)
            .send()
            .await?;
        let list: EventList = check_status(resp).await?.json().await?;
        Ok(list.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::testing;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn details() -> EventDetails {
        let start = Utc.with_ymd_and_hms(2025, 10, 20, 8, 0, 0).unwrap();
        EventDetails {
            title: "Cita amb Família Garcia".into(),
            description: "Cita programada".into(),
            start,
            end: start + chrono::Duration::minutes(30),
            attendees: vec![Attendee {
                email: "familia@example.com".into(),
                name: Some("Família Garcia".into()),
            }],
            owner_email: Some("tutor@insbitacola.cat".into()),
        }
    }

    async fn live_client(server: &MockServer) -> CalendarClient {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.cal",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
        CalendarClient::new(
            reqwest::Client::new(),
            Some(testing::account()),
            chrono_tz::Europe::Madrid,
            true,
        )
        .with_endpoints(server.uri(), format!("{}/token", server.uri()))
    }

    #[tokio::test]
    async fn simulated_mode_never_calls_google() {
        let client = CalendarClient::new(reqwest::Client::new(), None, chrono_tz::Europe::Madrid, false);
        assert!(client.is_simulated());

        let created = client.create_event(&details()).await.unwrap();
        assert!(created.google_event_id.starts_with("sim_"));
        assert_eq!(created.event_url, CALENDAR_HOME);
        assert!(client.update_event("sim_1", &details()).await.is_ok());
        assert!(client.delete_event("sim_1", None).await.is_ok());
        let ev = details();
        assert!(!client.check_conflicts(ev.start, ev.end, "tutor@insbitacola.cat", None).await);
    }

    #[test]
    fn event_body_uses_local_time_and_fixed_reminders() {
        let client = CalendarClient::new(reqwest::Client::new(), None, chrono_tz::Europe::Madrid, false);
        let body = client.event_body(&details());
        assert_eq!(body["start"]["dateTime"], "2025-10-20T10:00:00+02:00");
        assert_eq!(body["start"]["timeZone"], "Europe/Madrid");
        assert_eq!(body["reminders"]["overrides"][0]["minutes"], 1440);
        assert_eq!(body["reminders"]["overrides"][1]["method"], "popup");
        assert_eq!(body["attendees"][0]["responseStatus"], "needsAction");
        assert_eq!(body["guestsCanSeeOtherGuests"], false);
    }

    #[tokio::test]
    async fn create_event_posts_to_primary_calendar() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(query_param("sendUpdates", "all"))
            .and(header("authorization", "Bearer ya29.cal"))
            .and(body_partial_json(json!({"summary": "Cita amb Família Garcia"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "evt123",
                "htmlLink": "https://calendar.google.com/event?eid=evt123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client.create_event(&details()).await.unwrap();
        assert_eq!(created.google_event_id, "evt123");
        assert_eq!(created.event_url, "https://calendar.google.com/event?eid=evt123");
    }

    #[tokio::test]
    async fn conflicts_ignore_excluded_and_all_day_events() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "self", "start": {"dateTime": "2025-10-20T10:00:00+02:00"}, "end": {"dateTime": "2025-10-20T10:30:00+02:00"}},
                    {"id": "holiday", "start": {"date": "2025-10-20"}, "end": {"date": "2025-10-21"}}
                ]
            })))
            .mount(&server)
            .await;

        let ev = details();
        assert!(!client.check_conflicts(ev.start, ev.end, "tutor@insbitacola.cat", Some("self")).await);
        assert!(client.check_conflicts(ev.start, ev.end, "tutor@insbitacola.cat", None).await);
    }

    #[tokio::test]
    async fn conflict_lookup_errors_allow_booking() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ev = details();
        assert!(!client.check_conflicts(ev.start, ev.end, "tutor@insbitacola.cat", None).await);
    }

    #[tokio::test]
    async fn deleting_missing_event_succeeds() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        assert!(client.delete_event("gone", Some("tutor@insbitacola.cat")).await.is_ok());
    }
}
