//! Data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::EtaTrackerError;
use crate::normalize::normalize_vessel_name;
use serde_helpers::*;

/// One observed schedule entry from one terminal.
///
/// Optional text fields are `None` when the source cell was blank. In the
/// JSON interchange format they are written as empty strings, so snapshots
/// stay a flat list of string-valued objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VesselEventRecord")]
pub struct VesselEvent {
    /// Vessel name as scraped, never empty
    pub vessel_name: String,
    /// Comparison key, see [`normalize_vessel_name`]
    pub vessel_name_key: String,
    /// Source-formatted arrival, e.g. `13.02.2026 05:30`
    #[serde(serialize_with = "serialize_blank")]
    pub eta: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub etd: Option<String>,
    /// Human readable terminal / berth label
    pub terminal: String,
    #[serde(serialize_with = "serialize_blank")]
    pub callsign: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub berth: Option<String>,
    /// Load / discharge direction flag (Eurogate "Lö/La")
    #[serde(serialize_with = "serialize_blank")]
    pub cargo_operation: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub status: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub broker: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub eta_actual: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub etd_actual: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub vessel_type: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub voyage_import: Option<String>,
    #[serde(serialize_with = "serialize_blank")]
    pub voyage_export: Option<String>,
}

impl VesselEvent {
    /// Create an event, or `None` when the name is blank.
    pub fn new(vessel_name: &str, terminal: impl Into<String>) -> Option<Self> {
        let vessel_name = vessel_name.trim();
        if vessel_name.is_empty() {
            return None;
        }
        Some(Self {
            vessel_name: vessel_name.to_string(),
            vessel_name_key: normalize_vessel_name(vessel_name),
            eta: None,
            etd: None,
            terminal: terminal.into(),
            callsign: None,
            berth: None,
            cargo_operation: None,
            status: None,
            broker: None,
            eta_actual: None,
            etd_actual: None,
            vessel_type: None,
            voyage_import: None,
            voyage_export: None,
        })
    }

    pub fn with_eta(mut self, eta: &str) -> Self {
        self.eta = non_blank(eta);
        self
    }

    pub fn with_etd(mut self, etd: &str) -> Self {
        self.etd = non_blank(etd);
        self
    }

    /// Fill every blank field of `self` from `other`; fields already set win.
    ///
    /// Name, key and terminal are left alone.
    pub(crate) fn backfill_from(&mut self, other: &VesselEvent) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.eta, &other.eta);
        fill(&mut self.etd, &other.etd);
        fill(&mut self.callsign, &other.callsign);
        fill(&mut self.berth, &other.berth);
        fill(&mut self.cargo_operation, &other.cargo_operation);
        fill(&mut self.status, &other.status);
        fill(&mut self.broker, &other.broker);
        fill(&mut self.eta_actual, &other.eta_actual);
        fill(&mut self.etd_actual, &other.etd_actual);
        fill(&mut self.vessel_type, &other.vessel_type);
        fill(&mut self.voyage_import, &other.voyage_import);
        fill(&mut self.voyage_export, &other.voyage_export);
    }
}

/// Trimmed value, `None` when blank
pub(crate) fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// On-disk shape of a [`VesselEvent`]; the name key is always recomputed.
#[derive(Deserialize)]
struct VesselEventRecord {
    #[serde(default)]
    vessel_name: String,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    eta: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    etd: Option<String>,
    #[serde(default)]
    terminal: String,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    callsign: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    berth: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    cargo_operation: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    broker: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    eta_actual: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    etd_actual: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    vessel_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    voyage_import: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    voyage_export: Option<String>,
}

impl TryFrom<VesselEventRecord> for VesselEvent {
    type Error = EtaTrackerError;

    fn try_from(r: VesselEventRecord) -> Result<Self, Self::Error> {
        let event = VesselEvent::new(&r.vessel_name, r.terminal.trim())
            .ok_or_else(|| EtaTrackerError::InvalidVesselEvent("empty vessel_name".to_string()))?;
        Ok(VesselEvent {
            eta: r.eta,
            etd: r.etd,
            callsign: r.callsign,
            berth: r.berth,
            cargo_operation: r.cargo_operation,
            status: r.status,
            broker: r.broker,
            eta_actual: r.eta_actual,
            etd_actual: r.etd_actual,
            vessel_type: r.vessel_type,
            voyage_import: r.voyage_import,
            voyage_export: r.voyage_export,
            ..event
        })
    }
}

/// A vessel event after cross-matching.
///
/// `match_score` is 0 for records seen by a single terminal, otherwise the
/// name similarity of the pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedEvent {
    #[serde(flatten)]
    pub event: VesselEvent,
    pub match_score: u8,
}

impl MatchedEvent {
    pub fn unmatched(event: VesselEvent) -> Self {
        Self {
            event,
            match_score: 0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.match_score > 0
    }
}

/// A user's subscription to ETA changes of one vessel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watch {
    pub id: Uuid,
    pub vessel_name: String,
    /// Same key as [`VesselEvent::vessel_name_key`]
    pub vessel_name_normalized: String,
    /// ISO 8601, `None` until the first observation
    pub last_known_eta: Option<String>,
    pub notification_enabled: bool,
    pub shipment_reference: Option<String>,
    pub user_id: Uuid,
}

/// One detected ETA transition for one watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeNotification {
    pub watch_id: Uuid,
    pub vessel_name: String,
    pub shipment_reference: Option<String>,
    pub old_eta: Option<String>,
    pub new_eta: Option<String>,
    /// Signed whole days, positive when the vessel is later
    pub delay_days: i64,
    /// Only ever flips from false to true
    pub notification_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Identifier assigned by the store to a persisted [`ChangeNotification`]
pub type NotificationId = Uuid;

/// Newest ETA the datastore holds for a vessel.
///
/// A row can exist with no ETA (departure only), which is distinct from
/// having no schedule row at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEta {
    pub eta: Option<String>,
}

/// Custom (de)serializers
mod serde_helpers {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        Ok(s.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }))
    }

    pub fn serialize_blank<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_deref().unwrap_or(""))
    }
}
