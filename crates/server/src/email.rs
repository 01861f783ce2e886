//! Outgoing email. Delivery is simulated: every message is written to the
//! log instead of being handed to an SMTP relay.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::info;

use entrevistes_api::{Cita, TipusNotificacio};

/// Appointment details rendered into a notification.
#[derive(Debug, Clone)]
pub struct CitaNotification {
    pub tipus: TipusNotificacio,
    pub cita_id: String,
    pub tutor_email: String,
    pub familia_email: String,
    pub familia_nom: String,
    pub fecha: String,
    pub hora: String,
    pub durada_minuts: i32,
    pub notes: Option<String>,
    pub google_event_url: Option<String>,
}

impl CitaNotification {
    pub fn from_cita(cita: &Cita, tipus: TipusNotificacio, tz: Tz) -> Self {
        let local = cita.data_cita.with_timezone(&tz);
        Self {
            tipus,
            cita_id: cita.id.clone(),
            tutor_email: cita.tutor_email.clone(),
            familia_email: cita.email_familia.clone(),
            familia_nom: cita.nom_familia.clone(),
            fecha: local.format("%Y-%m-%d").to_string(),
            hora: local.format("%H:%M").to_string(),
            durada_minuts: cita.durada_minuts,
            notes: cita.notes.clone(),
            google_event_url: cita.google_event_url.clone(),
        }
    }

    pub fn subject(&self) -> String {
        let when = format!("{} {}", self.fecha, self.hora);
        match self.tipus {
            TipusNotificacio::Nueva => format!("Nova cita programada - {when}"),
            TipusNotificacio::Confirmada => format!("Cita confirmada - {when}"),
            TipusNotificacio::Cancelada => format!("Cita cancel·lada - {when}"),
            TipusNotificacio::Recordatorio => format!("Recordatori de cita - {when}"),
            TipusNotificacio::SolicitudAprobacion => {
                format!("Nova sol·licitud de cita de {} - {when}", self.familia_nom)
            }
        }
    }

    pub fn body(&self) -> String {
        let intro = match self.tipus {
            TipusNotificacio::Nueva => "S'ha programat una nova cita.",
            TipusNotificacio::Confirmada => "La cita ha estat confirmada.",
            TipusNotificacio::Cancelada => "La cita ha estat cancel·lada.",
            TipusNotificacio::Recordatorio => "Us recordem que teniu una cita en les properes 24 hores.",
            TipusNotificacio::SolicitudAprobacion => "Una família ha sol·licitat una cita i cal aprovar-la.",
        };
        let mut body = format!(
            "Hola {},\n\n{intro}\n\nData: {}\nHora: {}\nDurada: {} minuts\nTutor/a: {}",
            self.familia_nom, self.fecha, self.hora, self.durada_minuts, self.tutor_email
        );
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            body.push_str(&format!("\nNotes: {notes}"));
        }
        if let Some(url) = &self.google_event_url {
            body.push_str(&format!("\nCalendari: {url}"));
        }
        body
    }

    /// Families hear about their appointment; tutors get approval requests
    /// and cancellations.
    pub fn recipients(&self) -> Vec<&str> {
        match self.tipus {
            TipusNotificacio::SolicitudAprobacion => vec![self.tutor_email.as_str()],
            TipusNotificacio::Cancelada => vec![self.familia_email.as_str(), self.tutor_email.as_str()],
            _ => vec![self.familia_email.as_str()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailService {
    from: String,
}

impl EmailService {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }

    /// Record a message as sent and return when it was "delivered".
    pub fn send(&self, to: &str, subject: &str, body: &str) -> DateTime<Utc> {
        info!(
            from = %self.from,
            to,
            subject,
            body_len = body.len(),
            "email sent (simulated)"
        );
        tracing::debug!(to, body, "email body");
        Utc::now()
    }

    /// Returns the number of messages sent.
    pub fn send_cita_notification(&self, n: &CitaNotification) -> usize {
        let subject = n.subject();
        let body = n.body();
        let recipients: Vec<&str> = n.recipients().into_iter().filter(|r| !r.trim().is_empty()).collect();
        for to in &recipients {
            self.send(to, &subject, &body);
        }
        info!(cita = %n.cita_id, tipus = n.tipus.as_str(), sent = recipients.len(), "cita notification");
        recipients.len()
    }
}
