//! Terminal schedule sources.
//!
//! The set of terminals is closed: [`Terminal`] names them and each has a
//! [`ScheduleSource`] that knows how to fetch and parse its page.

mod eurogate;
mod hhla;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::{errors::Result, fetch::HttpFetcher, models::VesselEvent};

pub use eurogate::{parse_schedule, EurogateSource};
pub use hhla::{normalize_header, parse_report, HhlaSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    Eurogate,
    Hhla,
}

impl Terminal {
    /// Stable key used for snapshot file names and the `source` column
    pub fn key(&self) -> &'static str {
        match self {
            Terminal::Eurogate => "eurogate",
            Terminal::Hhla => "hhla",
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Result of parsing one terminal page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found(Vec<VesselEvent>),
    /// The expected table is not on the page; the markup is kept for
    /// offline diagnosis.
    TableNotFound { reason: String, markup: String },
}

impl Extraction {
    pub fn not_found(reason: impl Into<String>, markup: &str) -> Self {
        Extraction::TableNotFound {
            reason: reason.into(),
            markup: markup.to_string(),
        }
    }

    /// Events found, empty when the table was missing
    pub fn into_events(self) -> Vec<VesselEvent> {
        match self {
            Extraction::Found(events) => events,
            Extraction::TableNotFound { .. } => Vec::new(),
        }
    }
}

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    fn terminal(&self) -> Terminal;

    /// Fetch the schedule page markup
    async fn fetch(&self, fetcher: &HttpFetcher) -> Result<String>;

    /// Extract vessel events from fetched markup
    fn parse(&self, markup: &str) -> Extraction;
}
