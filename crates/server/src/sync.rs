//! Two-way sync between `cites_calendari` and Google Calendar. Every push
//! and pull is recorded in `sync_log`.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use entrevistes_api::db::{cites, sync_log};
use entrevistes_api::{Cita, EstatCita, SyncAllResponse, SyncLogEntry, service};

use crate::google::GoogleError;
use crate::google::calendar::{Attendee, CalendarClient, EventDetails};
use crate::storage::Db;

const PUSH: &str = "push";
const PULL: &str = "pull";
const TO_GOOGLE: &str = "to_google";
const FROM_GOOGLE: &str = "from_google";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Cita {0} no trobada")]
    NotFound(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Google(#[from] GoogleError),
}

/// Calendar event mirroring an appointment.
pub fn event_details(cita: &Cita) -> EventDetails {
    EventDetails {
        title: format!("Cita amb {}", cita.nom_familia),
        description: service::cita_event_description(
            &cita.nom_familia,
            &cita.email_familia,
            &cita.telefon_familia,
            cita.notes.as_deref(),
        ),
        start: cita.data_cita,
        end: cita.end(),
        attendees: vec![
            Attendee {
                email: cita.tutor_email.clone(),
                name: Some("Tutor".into()),
            },
            Attendee {
                email: cita.email_familia.clone(),
                name: Some(cita.nom_familia.clone()),
            },
        ],
        owner_email: Some(cita.tutor_email.clone()),
    }
}

#[derive(Clone)]
pub struct SyncService {
    db: Db,
    calendar: CalendarClient,
}

impl SyncService {
    pub fn new(db: Db, calendar: CalendarClient) -> Self {
        Self { db, calendar }
    }

    pub fn calendar(&self) -> &CalendarClient {
        &self.calendar
    }

    /// Record a sync outcome. Failures are logged and dropped.
    pub async fn log_sync(&self, entry: sync_log::NouLog<'_>) {
        if let Err(e) = self.db.execute(sync_log::insert(&entry)).await {
            warn!("writing sync_log: {e}");
        }
    }

    async fn load(&self, id: &str) -> Result<Cita, SyncError> {
        self.db
            .fetch_optional::<Cita>(cites::get(id))
            .await?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    /// Create or update the appointment's event and store its id and link.
    pub async fn sync_cita_to_google(&self, cita_id: &str) -> Result<(), SyncError> {
        let result = self.push(cita_id).await;
        match &result {
            Ok(event_id) => {
                self.log_sync(sync_log::NouLog {
                    action: PUSH,
                    entity_type: "cita",
                    entity_id: Some(cita_id),
                    google_event_id: Some(event_id.as_str()),
                    status: "success",
                    sync_direction: Some(TO_GOOGLE),
                    ..Default::default()
                })
                .await;
            }
            Err(e) => {
                error!("syncing cita {cita_id}: {e}");
                let message = e.to_string();
                self.log_sync(sync_log::NouLog {
                    action: PUSH,
                    entity_type: "cita",
                    entity_id: Some(cita_id),
                    status: "error",
                    error_message: Some(message.as_str()),
                    sync_direction: Some(TO_GOOGLE),
                    ..Default::default()
                })
                .await;
            }
        }
        result.map(|_| ())
    }

    async fn push(&self, cita_id: &str) -> Result<String, SyncError> {
        let cita = self.load(cita_id).await?;
        let details = event_details(&cita);
        if let Some(event_id) = &cita.google_event_id {
            self.calendar.update_event(event_id, &details).await?;
            return Ok(event_id.clone());
        }
        let created = self.calendar.create_event(&details).await?;
        self.db
            .execute(cites::set_event(cita_id, &created.google_event_id, &created.event_url))
            .await?;
        info!(cita = cita_id, event = %created.google_event_id, "cita pushed to Google Calendar");
        Ok(created.google_event_id)
    }

    /// Apply a time change made in Google Calendar to the matching appointment.
    pub async fn sync_event_from_google(
        &self,
        google_event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let result = self.pull(google_event_id, start, end).await;
        if let Err(e) = &result {
            error!("syncing event {google_event_id}: {e}");
            let message = e.to_string();
            self.log_sync(sync_log::NouLog {
                action: PULL,
                entity_type: "event",
                entity_id: Some(google_event_id),
                google_event_id: Some(google_event_id),
                status: "error",
                error_message: Some(message.as_str()),
                sync_direction: Some(FROM_GOOGLE),
            })
            .await;
        }
        result
    }

    async fn pull(&self, google_event_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), SyncError> {
        let Some(cita) = self.db.fetch_optional::<Cita>(cites::by_event(google_event_id)).await? else {
            self.log_sync(sync_log::NouLog {
                action: PULL,
                entity_type: "event",
                entity_id: Some(google_event_id),
                google_event_id: Some(google_event_id),
                status: "pending",
                error_message: Some("No hay cita asociada en BD local"),
                sync_direction: Some(FROM_GOOGLE),
            })
            .await;
            return Ok(());
        };

        let notes = cites::notes_from_google(&cita);
        self.db
            .execute(cites::update_schedule(
                &cita.id,
                start,
                service::duration_minutes(start, end),
                &notes,
            ))
            .await?;
        self.log_sync(sync_log::NouLog {
            action: PULL,
            entity_type: "cita",
            entity_id: Some(cita.id.as_str()),
            google_event_id: Some(google_event_id),
            status: "success",
            sync_direction: Some(FROM_GOOGLE),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Handle a push notification. Only deletions change local state.
    pub async fn process_webhook_notification(
        &self,
        resource_state: &str,
        resource_id: &str,
    ) -> Result<(), SyncError> {
        match resource_state {
            "sync" => {
                debug!("calendar channel sync handshake");
                Ok(())
            }
            "exists" | "update" => {
                info!(resource_id, "calendar resource changed");
                Ok(())
            }
            "not_exists" => self.handle_deleted_event(resource_id).await,
            other => {
                warn!(resource_id, "unknown resource state {other}");
                Ok(())
            }
        }
    }

    async fn handle_deleted_event(&self, google_event_id: &str) -> Result<(), SyncError> {
        let Some(cita) = self.db.fetch_optional::<Cita>(cites::by_event(google_event_id)).await? else {
            return Ok(());
        };
        self.db
            .execute(cites::set_estat(&cita.id, EstatCita::Cancelada.as_str()))
            .await?;
        info!(cita = %cita.id, "cita cancelled after event deletion in Google Calendar");
        self.log_sync(sync_log::NouLog {
            action: PULL,
            entity_type: "cita",
            entity_id: Some(cita.id.as_str()),
            google_event_id: Some(google_event_id),
            status: "success",
            sync_direction: Some(FROM_GOOGLE),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Delete the appointment's event, if any. Failures are logged only.
    pub async fn delete_cita_event(&self, cita: &Cita) {
        let Some(event_id) = cita.google_event_id.as_deref() else {
            return;
        };
        let (status, message) = match self.calendar.delete_event(event_id, Some(cita.tutor_email.as_str())).await {
            Ok(()) => ("success", None),
            Err(e) => {
                warn!("deleting event {event_id}: {e}");
                ("error", Some(e.to_string()))
            }
        };
        self.log_sync(sync_log::NouLog {
            action: "delete",
            entity_type: "cita",
            entity_id: Some(cita.id.as_str()),
            google_event_id: Some(event_id),
            status,
            error_message: message.as_deref(),
            sync_direction: Some(TO_GOOGLE),
        })
        .await;
    }

    /// Newest entries first; empty when the log can't be read.
    pub async fn get_sync_log(&self, limit: u64) -> Vec<SyncLogEntry> {
        self.db
            .fetch_all::<SyncLogEntry>(sync_log::recent(limit))
            .await
            .inspect_err(|e| warn!("reading sync_log: {e}"))
            .unwrap_or_default()
    }

    /// Push every appointment without an event or changed in the last hour.
    pub async fn sync_all_pending_citas(&self) -> SyncAllResponse {
        let mut result = SyncAllResponse::default();
        let pending = match sqlx::query_as::<_, Cita>(cites::PENDING_SYNC)
            .fetch_all(self.db.pool())
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("loading citas pending sync: {e}");
                return result;
            }
        };
        for cita in pending {
            match self.sync_cita_to_google(&cita.id).await {
                Ok(()) => result.success += 1,
                Err(_) => result.errors += 1,
            }
        }
        result
    }

    /// Drop `sync_log` rows older than `days`.
    pub async fn cleanup_log(&self, days: i32) -> Result<u64, sqlx::Error> {
        self.db.execute(sync_log::delete_older_than(days)).await
    }
}
