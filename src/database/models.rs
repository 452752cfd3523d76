// src/database/models.rs
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{models::Watch, timestamps::utc_to_iso};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct WatchRow {
    id: Uuid,
    user_id: Uuid,
    vessel_name: String,
    vessel_name_normalized: String,
    shipment_reference: Option<String>,
    last_known_eta: Option<DateTime<Utc>>,
    notification_enabled: bool,
}

impl From<WatchRow> for Watch {
    fn from(row: WatchRow) -> Self {
        Watch {
            id: row.id,
            vessel_name: row.vessel_name,
            vessel_name_normalized: row.vessel_name_normalized,
            last_known_eta: row.last_known_eta.as_ref().map(utc_to_iso),
            notification_enabled: row.notification_enabled,
            shipment_reference: row.shipment_reference,
            user_id: row.user_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct LatestEtaRow {
    pub eta: Option<DateTime<Utc>>,
}
