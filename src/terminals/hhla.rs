//! HHLA sailing list report.
//!
//! Header text and column order change between releases of the report,
//! so columns are located by normalized header token instead of position.

use std::collections::HashMap;

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::{
    config::HhlaConfig,
    errors::Result,
    fetch::{fetch_with_escalation, CommandRenderer, HttpFetcher, PageRenderer},
    html::{cell_text, data_cells, row_cells, table_rows, tables},
    models::{non_blank, VesselEvent},
};

use super::{Extraction, ScheduleSource, Terminal};

pub const FALLBACK_TERMINAL_LABEL: &str = "HHLA Hamburg";
const BRAND: &str = "HHLA";

const TOKEN_VESSEL_NAME: &str = "schiffsname";
const TOKEN_PLANNED_ARRIVAL: &str = "ankunftsoll";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    EtaPlanned,
    EtaActual,
    Terminal,
    Callsign,
    VesselName,
    VoyageImport,
    VoyageExport,
    EtdPlanned,
    EtdActual,
    VesselType,
}

/// Known header tokens, longest first so substring fallback prefers the
/// most specific key.
const HEADER_FIELDS: &[(&str, Field)] = &[
    ("ankunftsoll", Field::EtaPlanned),
    ("abfahrtsoll", Field::EtdPlanned),
    ("schiffsname", Field::VesselName),
    ("importreise", Field::VoyageImport),
    ("exportreise", Field::VoyageExport),
    ("schiffstyp", Field::VesselType),
    ("terminal", Field::Terminal),
    ("funkcode", Field::Callsign),
    ("ankunft", Field::EtaActual),
    ("abfahrt", Field::EtdActual),
];

pub struct HhlaSource {
    config: HhlaConfig,
    renderer: Option<Box<dyn PageRenderer>>,
}

impl HhlaSource {
    pub fn new(config: HhlaConfig) -> Self {
        let renderer = CommandRenderer::from_argv(&config.render_command)
            .map(|r| Box::new(r) as Box<dyn PageRenderer>);
        Self { config, renderer }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }
}

#[async_trait]
impl ScheduleSource for HhlaSource {
    fn terminal(&self) -> Terminal {
        Terminal::Hhla
    }

    async fn fetch(&self, fetcher: &HttpFetcher) -> Result<String> {
        info!("[hhla] Fetching report...");
        fetch_with_escalation(
            fetcher,
            self.renderer.as_deref(),
            &self.config.url,
            self.config.timeout,
            "hhla",
        )
        .await
    }

    fn parse(&self, markup: &str) -> Extraction {
        parse_report(markup)
    }
}

/// Stable token for a header cell.
///
/// Lower-cases, spells out umlauts and sharp s, turns `(soll)` into a
/// plain suffix and drops everything that is not alphanumeric, so
/// `"Ankunft (Soll)"` and `"ANKUNFT(SOLL)"` both become `ankunftsoll`.
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .replace('ä', "ae")
        .replace('ö', "oe")
        .replace('ü', "ue")
        .replace('ß', "ss")
        .replace("(soll)", "soll")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Map header tokens to column indexes.
///
/// An exact token match is tried first, then a substring match; a field
/// keeps the first (leftmost) column it was assigned.
fn build_field_map(tokens: &[String]) -> HashMap<Field, usize> {
    let mut map = HashMap::new();

    for (idx, token) in tokens.iter().enumerate() {
        let exact = HEADER_FIELDS
            .iter()
            .find(|(key, field)| key == token && !map.contains_key(field));
        let chosen = exact.or_else(|| {
            HEADER_FIELDS
                .iter()
                .find(|(key, field)| token.contains(key) && !map.contains_key(field))
        });
        if let Some((_, field)) = chosen {
            map.insert(*field, idx);
        }
    }

    map
}

fn terminal_label(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        FALLBACK_TERMINAL_LABEL.to_string()
    } else if raw.to_uppercase().starts_with(BRAND) {
        raw.to_string()
    } else {
        format!("{} {}", BRAND, raw)
    }
}

/// Extract events from a rendered report page.
pub fn parse_report(markup: &str) -> Extraction {
    let document = Html::parse_document(markup);

    for table in tables(&document) {
        let rows = table_rows(table);
        let header = rows.iter().enumerate().find_map(|(idx, row)| {
            let tokens: Vec<String> = row_cells(*row)
                .into_iter()
                .map(|cell| normalize_header(&cell_text(cell)))
                .collect();
            let is_header = tokens.iter().any(|t| t == TOKEN_VESSEL_NAME)
                && tokens.iter().any(|t| t == TOKEN_PLANNED_ARRIVAL);
            is_header.then_some((idx, tokens))
        });
        let Some((header_idx, tokens)) = header else {
            continue;
        };

        let fields = build_field_map(&tokens);
        debug!("[hhla] Headers: {:?}", tokens);
        debug!("[hhla] Column mapping: {:?}", fields);

        let events: Vec<VesselEvent> = rows[header_idx + 1..]
            .iter()
            .filter_map(|row| {
                let texts: Vec<String> = data_cells(*row).into_iter().map(cell_text).collect();
                event_from_row(&texts, &fields)
            })
            .collect();

        info!("[hhla] Parsed {} vessels", events.len());
        return Extraction::Found(events);
    }

    warn!("[hhla] No table with vessel name and planned arrival headers");
    Extraction::not_found(
        format!(
            "no table with '{}' and '{}' header tokens",
            TOKEN_VESSEL_NAME, TOKEN_PLANNED_ARRIVAL
        ),
        markup,
    )
}

fn event_from_row(texts: &[String], fields: &HashMap<Field, usize>) -> Option<VesselEvent> {
    if texts.is_empty() {
        return None;
    }
    let get = |field: Field| {
        fields
            .get(&field)
            .and_then(|&idx| texts.get(idx))
            .map(|s| s.as_str())
            .unwrap_or("")
    };

    let event = VesselEvent::new(get(Field::VesselName), terminal_label(get(Field::Terminal)))?;

    Some(VesselEvent {
        eta_actual: non_blank(get(Field::EtaActual)),
        etd_actual: non_blank(get(Field::EtdActual)),
        callsign: non_blank(get(Field::Callsign)),
        vessel_type: non_blank(get(Field::VesselType)),
        voyage_import: non_blank(get(Field::VoyageImport)),
        voyage_export: non_blank(get(Field::VoyageExport)),
        ..event
            .with_eta(get(Field::EtaPlanned))
            .with_etd(get(Field::EtdPlanned))
    })
}
