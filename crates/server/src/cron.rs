//! Periodic jobs: calendar re-sync, `sync_log` cleanup and appointment
//! reminders.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use entrevistes_api::db::cites;
use entrevistes_api::{Cita, TipusNotificacio};

use crate::email::{CitaNotification, EmailService};
use crate::storage::Db;
use crate::sync::SyncService;

const JOB_TIMEOUT: Duration = Duration::from_secs(300);
const LOG_RETENTION_DAYS: i32 = 30;
const CLEANUP_CRON: &str = "0 0 3 * * *";
const REMINDER_CRON: &str = "0 0 * * * *";

/// Every `minutes` minutes, on the minute.
pub fn sync_cron(minutes: u32) -> String {
    format!("0 */{minutes} * * * *")
}

/// Everything the jobs need, cloned into each run.
#[derive(Clone)]
pub struct CronContext {
    pub db: Db,
    pub sync: SyncService,
    pub email: EmailService,
    pub timezone: Tz,
}

async fn run_with_timeout<F>(name: &'static str, job: F)
where
    F: std::future::Future<Output = ()>,
{
    if tokio::time::timeout(JOB_TIMEOUT, job).await.is_err() {
        warn!(timeout_secs = JOB_TIMEOUT.as_secs(), "cron job {name} timed out");
    }
}

async fn resync(ctx: CronContext) {
    info!("[CRON] periodic calendar sync");
    let result = ctx.sync.sync_all_pending_citas().await;
    info!(success = result.success, errors = result.errors, "[CRON] calendar sync done");
}

async fn cleanup(ctx: CronContext) {
    match ctx.sync.cleanup_log(LOG_RETENTION_DAYS).await {
        Ok(n) => info!(deleted = n, "[CRON] old sync_log entries removed"),
        Err(e) => error!("[CRON] cleaning sync_log: {e}"),
    }
}

/// Remind families of confirmed appointments in the next 24 hours, once.
pub async fn send_reminders(ctx: &CronContext) -> usize {
    let due = match sqlx::query_as::<_, Cita>(cites::REMINDERS_DUE)
        .fetch_all(ctx.db.pool())
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("[CRON] loading due reminders: {e}");
            return 0;
        }
    };
    let mut sent = 0;
    for cita in &due {
        let n = CitaNotification::from_cita(cita, TipusNotificacio::Recordatorio, ctx.timezone);
        ctx.email.send_cita_notification(&n);
        match ctx.db.execute(cites::mark_reminder_sent(&cita.id)).await {
            Ok(_) => sent += 1,
            Err(e) => error!("[CRON] marking reminder for {}: {e}", cita.id),
        }
    }
    info!(sent, "[CRON] reminders checked");
    sent
}

/// A job whose cron expression is read in the school's time zone.
fn job<F, Fut>(cron: &str, ctx: &CronContext, name: &'static str, run: F) -> Result<Job>
where
    F: Fn(CronContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let ctx = ctx.clone();
    Job::new_async_tz(cron, ctx.timezone, move |_id, _lock| {
        let ctx = ctx.clone();
        let run = run.clone();
        Box::pin(async move { run_with_timeout(name, run(ctx)).await })
    })
    .with_context(|| format!("registering {name} job ({cron})"))
}

/// Register and start the three jobs.
pub async fn start(ctx: CronContext, sync_interval_minutes: u32) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await.context("creating scheduler")?;

    let sync_expr = sync_cron(sync_interval_minutes);
    scheduler.add(job(&sync_expr, &ctx, "calendar-sync", resync)?).await?;
    scheduler.add(job(CLEANUP_CRON, &ctx, "sync-log-cleanup", cleanup)?).await?;
    scheduler
        .add(job(REMINDER_CRON, &ctx, "reminders", |ctx: CronContext| async move {
            send_reminders(&ctx).await;
        })?)
        .await?;

    scheduler.start().await.context("starting scheduler")?;
    debug!(sync = %sync_expr, cleanup = CLEANUP_CRON, reminders = REMINDER_CRON, "cron jobs registered");
    info!("Cron jobs started: sync every {sync_interval_minutes} min, cleanup daily 03:00, reminders hourly");
    Ok(scheduler)
}
