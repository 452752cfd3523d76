//! On-disk snapshots of scraped events and diagnostic pages.
//!
//! Snapshots are named `<source>_<YYYYmmdd_HHMMSS>.json`, so the newest one
//! per source is the lexicographically greatest name.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::{ensure_directory_exists, StorageConfig},
    errors::Result,
    models::VesselEvent,
    terminals::Terminal,
};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub struct SnapshotStore {
    scraped_dir: PathBuf,
    debug_dir: PathBuf,
}

/// Files removed (or that would be) by [`SnapshotStore::clean`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub files: Vec<PathBuf>,
    pub bytes: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryStatus {
    pub label: &'static str,
    pub path: PathBuf,
    /// `None` when the directory does not exist yet
    pub files: Option<usize>,
}

impl SnapshotStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            scraped_dir: storage.scraped_dir(),
            debug_dir: storage.debug_dir(),
        }
    }

    /// Save a terminal's events as pretty JSON
    pub fn save(&self, source: Terminal, events: &[VesselEvent]) -> Result<PathBuf> {
        ensure_directory_exists(&self.scraped_dir)?;
        let path = self.scraped_dir.join(format!("{}_{}.json", source.key(), timestamp()));
        fs::write(&path, serde_json::to_string_pretty(events)?)?;
        info!("[{}] Saved {} vessels -> {}", source, events.len(), file_name(&path));
        Ok(path)
    }

    /// Newest snapshot of `source`, empty when there is none.
    pub fn load_latest(&self, source: Terminal) -> Result<Vec<VesselEvent>> {
        let Some(path) = self.latest_path(source)? else {
            warn!("[pipeline] No JSON found for {}", source);
            return Ok(Vec::new());
        };
        let events: Vec<VesselEvent> = serde_json::from_str(&fs::read_to_string(&path)?)?;
        info!("[pipeline] Loaded {}: {} vessels", file_name(&path), events.len());
        Ok(events)
    }

    pub fn latest_path(&self, source: Terminal) -> Result<Option<PathBuf>> {
        if !self.scraped_dir.is_dir() {
            return Ok(None);
        }
        let prefix = format!("{}_", source.key());
        let mut latest: Option<PathBuf> = None;
        for entry in fs::read_dir(&self.scraped_dir)? {
            let path = entry?.path();
            let name = file_name(&path);
            if !(name.starts_with(&prefix) && name.ends_with(".json")) {
                continue;
            }
            if latest.as_ref().map_or(true, |l| file_name(l) < name) {
                latest = Some(path);
            }
        }
        Ok(latest)
    }

    /// Keep markup that could not be parsed for later inspection
    pub fn save_debug(&self, source: Terminal, markup: &str) -> Result<PathBuf> {
        ensure_directory_exists(&self.debug_dir)?;
        let path = self.debug_dir.join(format!("error_{}_{}.html", source.key(), timestamp()));
        fs::write(&path, markup)?;
        debug!("[{}] Debug saved -> {}", source, file_name(&path));
        Ok(path)
    }

    /// Delete snapshot and debug files last modified more than `max_age` ago.
    pub fn clean(&self, max_age: Duration, dry_run: bool) -> Result<CleanReport> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = CleanReport {
            dry_run,
            ..Default::default()
        };

        for dir in [&self.scraped_dir, &self.debug_dir] {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let metadata = entry.metadata()?;
                if !metadata.is_file() || metadata.modified()? >= cutoff {
                    continue;
                }
                let path = entry.path();
                if dry_run {
                    info!("Would delete: {} ({} bytes)", file_name(&path), metadata.len());
                } else {
                    fs::remove_file(&path)?;
                    info!("Deleted: {}", file_name(&path));
                }
                report.bytes += metadata.len();
                report.files.push(path);
            }
        }
        Ok(report)
    }

    pub fn status(&self) -> Vec<DirectoryStatus> {
        [
            ("Scraped JSONs", &self.scraped_dir),
            ("Debug files", &self.debug_dir),
        ]
        .into_iter()
        .map(|(label, dir)| directory_status(label, dir))
        .collect()
    }
}

pub fn directory_status(label: &'static str, dir: &Path) -> DirectoryStatus {
    let files = fs::read_dir(dir).ok().map(|entries| {
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .count()
    });
    DirectoryStatus {
        label,
        path: dir.to_path_buf(),
        files,
    }
}

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
