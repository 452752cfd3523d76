//! Cross-terminal reconciliation of vessel events.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::models::{MatchedEvent, VesselEvent};

pub const DEFAULT_THRESHOLD: u8 = 85;

const TERMINAL_JOINER: &str = " + ";

/// Similarity of two strings on a 0–100 scale.
///
/// Indel ratio: `2 * lcs / (len(a) + len(b))`, where `lcs` is the length of
/// the longest common subsequence of characters. Symmetric; 0 when either
/// side is empty.
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // Single-row LCS table
    let mut row = vec![0usize; b.len() + 1];
    for &ca in &a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    let lcs = row[b.len()];

    (200.0 * lcs as f64 / total as f64).round() as u8
}

/// `DD.MM.YYYY` with day, month and year captured
pub(crate) static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{2})\.([0-9]{2})\.([0-9]{4})").expect("static pattern"));

/// First `DD.MM.YYYY` substring of `value`.
pub fn extract_event_date(value: &str) -> Option<&str> {
    DATE_RE.find(value).map(|m| m.as_str())
}

/// Pair events of terminal `a` with events of terminal `b`.
///
/// For every `a` event the best scoring unconsumed `b` event at or above
/// `threshold` is chosen; candidates whose event date differs are skipped
/// when both dates are known. Ties keep the earliest candidate. Output is
/// every `a` event in order (merged when paired) followed by the unpaired
/// `b` events in order.
pub fn cross_match(a: &[VesselEvent], b: &[VesselEvent], threshold: u8) -> Vec<MatchedEvent> {
    let mut consumed = vec![false; b.len()];
    let mut output = Vec::with_capacity(a.len() + b.len());
    let mut pairs = 0;

    for event_a in a {
        let date_a = event_a.eta.as_deref().and_then(extract_event_date);

        let mut best: Option<(usize, u8)> = None;
        for (idx, event_b) in b.iter().enumerate() {
            if consumed[idx] {
                continue;
            }
            let score = ratio(&event_a.vessel_name_key, &event_b.vessel_name_key);
            if score < threshold {
                continue;
            }
            let date_b = event_b.eta.as_deref().and_then(extract_event_date);
            if let (Some(da), Some(db)) = (date_a, date_b) {
                if da != db {
                    debug!(
                        "[matcher] {} ~ {} ({}) rejected, dates {} / {}",
                        event_a.vessel_name, event_b.vessel_name, score, da, db
                    );
                    continue;
                }
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) => {
                consumed[idx] = true;
                pairs += 1;
                debug!(
                    "[matcher] {} <-> {} (score {})",
                    event_a.vessel_name, b[idx].vessel_name, score
                );
                output.push(MatchedEvent {
                    event: merge(event_a, &b[idx]),
                    match_score: score,
                });
            }
            None => output.push(MatchedEvent::unmatched(event_a.clone())),
        }
    }

    output.extend(
        b.iter()
            .zip(consumed)
            .filter(|(_, used)| !used)
            .map(|(event, _)| MatchedEvent::unmatched(event.clone())),
    );

    info!(
        "[matcher] {} + {} events -> {} records ({} matched pairs)",
        a.len(),
        b.len(),
        output.len(),
        pairs
    );
    output
}

/// New event from `a` with blanks filled from `b` and both terminal labels.
fn merge(a: &VesselEvent, b: &VesselEvent) -> VesselEvent {
    let mut merged = a.clone();
    merged.backfill_from(b);
    merged.terminal = merge_terminals(&a.terminal, &b.terminal);
    merged
}

fn merge_terminals(a: &str, b: &str) -> String {
    let mut labels: Vec<&str> = [a.trim(), b.trim()]
        .into_iter()
        .filter(|label| !label.is_empty())
        .collect();
    labels.sort_unstable();
    labels.dedup();
    labels.join(TERMINAL_JOINER)
}
