//! Consolidated schedule export as CSV

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use chrono_tz::Europe::Berlin;
use tracing::info;

use crate::{
    config::ensure_directory_exists,
    errors::Result,
    matcher::DATE_RE,
    models::{MatchedEvent, VesselEvent},
};

const SEPARATOR: char = ',';
const UNDATED: &str = "9999";

type Field = fn(&VesselEvent) -> Option<&str>;

/// Columns always written, in order
const LEADING: &[(&str, Field)] = &[
    ("vessel_name", |e| Some(e.vessel_name.as_str())),
    ("eta", |e| e.eta.as_deref()),
    ("etd", |e| e.etd.as_deref()),
    ("terminal", |e| Some(e.terminal.as_str())),
];

/// Columns written only when at least one record has a value
const OPTIONAL: &[(&str, Field)] = &[
    ("callsign", |e| e.callsign.as_deref()),
    ("berth", |e| e.berth.as_deref()),
    ("cargo_operation", |e| e.cargo_operation.as_deref()),
    ("status", |e| e.status.as_deref()),
    ("broker", |e| e.broker.as_deref()),
    ("eta_actual", |e| e.eta_actual.as_deref()),
    ("etd_actual", |e| e.etd_actual.as_deref()),
    ("vessel_type", |e| e.vessel_type.as_deref()),
    ("voyage_import", |e| e.voyage_import.as_deref()),
    ("voyage_export", |e| e.voyage_export.as_deref()),
];

/// `YYYY-MM-DD HH:MM` from the first date in `eta` and the time after it;
/// undated values sort last.
pub fn sort_key(eta: Option<&str>) -> String {
    let Some((eta, caps)) = eta.and_then(|eta| DATE_RE.captures(eta).map(|caps| (eta, caps))) else {
        return UNDATED.to_string();
    };
    let (day, month, year) = (&caps[1], &caps[2], &caps[3]);

    let end = caps.get(0).map_or(eta.len(), |m| m.end());
    let rest = eta[end..].trim();
    let time = if rest.contains(':') {
        rest.get(..5).unwrap_or(rest)
    } else {
        "00:00"
    };
    format!("{}-{}-{} {}", year, month, day, time)
}

fn needs_quotes(field: &str) -> bool {
    field.contains(SEPARATOR) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(mut w: W, row: &[&str]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, "{}", SEPARATOR)?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

/// Write `records` sorted by ETA, stamping every row with `last_updated`.
pub fn write_csv<W: Write>(mut w: W, records: &[MatchedEvent], last_updated: &str) -> io::Result<()> {
    let optional: Vec<&(&str, Field)> = OPTIONAL
        .iter()
        .filter(|(_, get)| records.iter().any(|r| get(&r.event).is_some()))
        .collect();
    let columns: Vec<&(&str, Field)> = LEADING.iter().chain(optional).collect();

    let mut header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    header.extend(["match_score", "last_updated"]);
    write_row(&mut w, &header)?;

    let mut sorted: Vec<&MatchedEvent> = records.iter().collect();
    sorted.sort_by_cached_key(|r| sort_key(r.event.eta.as_deref()));

    for record in sorted {
        let score = record.match_score.to_string();
        let mut row: Vec<&str> = columns
            .iter()
            .map(|(_, get)| get(&record.event).unwrap_or(""))
            .collect();
        row.extend([score.as_str(), last_updated]);
        write_row(&mut w, &row)?;
    }
    Ok(())
}

/// Export to `path`, creating its directory if needed.
pub fn export_csv(records: &[MatchedEvent], path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory_exists(parent)?;
    }

    let last_updated = Utc::now().with_timezone(&Berlin).format("%Y-%m-%d %H:%M").to_string();
    let mut out = BufWriter::new(File::create(path)?);
    write_csv(&mut out, records, &last_updated)?;
    out.flush()?;

    info!("[export] CSV exported: {} ({} rows)", path.display(), records.len());
    Ok(path.to_path_buf())
}
