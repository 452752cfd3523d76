// src/database.rs
mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::DatabaseConfig,
    detector::{IdentityLookup, WatchStore},
    errors::{EtaTrackerError, Result},
    models::{ChangeNotification, NotificationId, ObservedEta, VesselEvent, Watch},
    normalize::normalize_vessel_name,
    terminals::Terminal,
    timestamps::{parse_iso, parse_terminal_datetime, utc_to_iso},
};
use models::{LatestEtaRow, WatchRow};

/// Outcome of one datastore sync; never an error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub ok: bool,
    pub eurogate_synced: usize,
    pub hhla_synced: usize,
    pub total_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncSummary {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Postgres datastore, constructed once and passed by reference
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect and bring the schema up to date
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("[sync] Connecting to database");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Self::new(pool).await
    }

    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert or rename a vessel by normalized name, returning its id
    pub async fn upsert_vessel(&self, name: &str) -> Result<Uuid> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO vessels (name, name_normalized)
            VALUES ($1, $2)
            ON CONFLICT (name_normalized) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name.trim())
        .bind(normalize_vessel_name(name))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Upsert schedule rows for one terminal's events.
    ///
    /// Events without any parseable ETA or ETD are skipped; a failing event
    /// is logged and skipped. Returns the number of rows written.
    pub async fn sync_events(&self, events: &[VesselEvent], source: Terminal) -> usize {
        let mut count = 0;
        for event in events {
            match self.sync_event(event, source).await {
                Ok(true) => count += 1,
                Ok(false) => debug!("[sync] Skipping {}: no ETA or ETD", event.vessel_name),
                Err(e) => warn!("[sync] Failed to sync vessel {:?}: {}", event.vessel_name, e),
            }
        }
        count
    }

    async fn sync_event(&self, event: &VesselEvent, source: Terminal) -> Result<bool> {
        let eta = event.eta.as_deref().and_then(parse_terminal_datetime);
        let etd = event.etd.as_deref().and_then(parse_terminal_datetime);
        if eta.is_none() && etd.is_none() {
            return Ok(false);
        }

        let vessel_id = self.upsert_vessel(&event.vessel_name).await?;
        sqlx::query(
            r#"
            INSERT INTO schedule_events (vessel_id, source, eta, etd, terminal, scraped_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (vessel_id, source, eta, terminal)
            DO UPDATE SET etd = EXCLUDED.etd, scraped_at = EXCLUDED.scraped_at
            "#,
        )
        .bind(vessel_id)
        .bind(source.key())
        .bind(eta.map(|t| t.with_timezone(&Utc)))
        .bind(etd.map(|t| t.with_timezone(&Utc)))
        .bind(event.terminal.as_str())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    /// Sync both terminals' raw events
    pub async fn sync_all(&self, eurogate: &[VesselEvent], hhla: &[VesselEvent]) -> SyncSummary {
        if let Err(e) = sqlx::query("SELECT 1").execute(&self.pool).await {
            error!("[sync] Sync failed: {}", e);
            return SyncSummary::failed(e);
        }

        let eurogate_synced = self.sync_events(eurogate, Terminal::Eurogate).await;
        let hhla_synced = self.sync_events(hhla, Terminal::Hhla).await;
        let summary = SyncSummary {
            ok: true,
            eurogate_synced,
            hhla_synced,
            total_synced: eurogate_synced + hhla_synced,
            error: None,
        };
        info!(
            "[sync] Synced {} events ({} Eurogate + {} HHLA)",
            summary.total_synced, eurogate_synced, hhla_synced
        );
        summary
    }
}

/// ISO string at the store boundary to a stored instant
fn iso_to_utc(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            parse_iso(raw)
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| EtaTrackerError::InvalidTimestamp(raw.to_string()))
        })
        .transpose()
}

/// Day count saturated to the column's `INTEGER` range
fn clamp_days(days: i64) -> i32 {
    days.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[async_trait]
impl WatchStore for Database {
    async fn active_watches(&self) -> Result<Vec<Watch>> {
        let rows: Vec<WatchRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, vessel_name, vessel_name_normalized,
                   shipment_reference, last_known_eta, notification_enabled
            FROM vessel_watches
            WHERE notification_enabled
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Watch::from).collect())
    }

    async fn latest_eta(&self, vessel_name_normalized: &str) -> Result<Option<ObservedEta>> {
        let row: Option<LatestEtaRow> = sqlx::query_as(
            r#"
            SELECT eta FROM latest_schedule
            WHERE name_normalized = $1
            ORDER BY scraped_at DESC
            LIMIT 1
            "#,
        )
        .bind(vessel_name_normalized)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| ObservedEta {
            eta: row.eta.as_ref().map(utc_to_iso),
        }))
    }

    async fn insert_notification(&self, notification: &ChangeNotification) -> Result<NotificationId> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO eta_change_notifications
                (watch_id, vessel_name, shipment_reference, old_eta, new_eta,
                 delay_days, notification_sent, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(notification.watch_id)
        .bind(&notification.vessel_name)
        .bind(&notification.shipment_reference)
        .bind(iso_to_utc(notification.old_eta.as_deref())?)
        .bind(iso_to_utc(notification.new_eta.as_deref())?)
        .bind(clamp_days(notification.delay_days))
        .bind(notification.notification_sent)
        .bind(notification.sent_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn mark_notification_sent(&self, id: NotificationId, sent_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE eta_change_notifications SET notification_sent = TRUE, sent_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_eta(&self, watch_id: Uuid, eta: Option<&str>, notified_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE vessel_watches SET last_known_eta = $2, last_notified_at = $3 WHERE id = $1",
        )
        .bind(watch_id)
        .bind(iso_to_utc(eta)?)
        .bind(notified_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityLookup for Database {
    async fn email_for_user(&self, user_id: Uuid) -> Result<Option<String>> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM auth.users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(email.flatten().filter(|e| !e.trim().is_empty()))
    }
}
