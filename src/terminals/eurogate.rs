//! EUROGATE Hamburg sailing list.
//!
//! The schedule table spans date, time and vessel columns over several
//! rows (one row per load/discharge leg), so it goes through the grid
//! resolver before columns are mapped by position.

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::{
    config::EurogateConfig,
    errors::{EtaTrackerError, Result},
    fetch::HttpFetcher,
    html::{cell_text, resolve_grid, row_cells, table_rows, tables},
    models::{non_blank, VesselEvent},
};

use super::{Extraction, ScheduleSource, Terminal};

pub const TERMINAL_LABEL: &str = "EUROGATE Hamburg";

const HEADER_DATE: &str = "Datum";
const HEADER_VESSEL: &str = "Schiffsname";
const MIN_COLUMNS: usize = 10;

// 0=Datum 1=Zeit 2=Abfahrt(Etd) 3=Schiffsname 4=Callsign 5=Liegeplatz
// 6=Lö/La 7=SchiffNr 8=ReiseNr 9=Auslieferbeg. 10=Annahmebeginn
// 11=Status 12=Makler
const COL_DATE: usize = 0;
const COL_TIME: usize = 1;
const COL_ETD: usize = 2;
const COL_VESSEL: usize = 3;
const COL_CALLSIGN: usize = 4;
const COL_BERTH: usize = 5;
const COL_LOAD_DISCHARGE: usize = 6;
const COL_STATUS: usize = 11;
const COL_BROKER: usize = 12;

const SCHEDULE_LINK: &str = "segelliste";
const LOCATION_PARAM: &str = "locationCode=HAM";
const FOUR_WEEK_LINK: &str = "segelliste.period3";

pub struct EurogateSource {
    config: EurogateConfig,
}

impl EurogateSource {
    pub fn new(config: EurogateConfig) -> Self {
        Self { config }
    }

    fn absolute(&self, href: &str) -> String {
        Url::parse(&self.config.base_url)
            .and_then(|base| base.join(href))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.config.base_url, href))
    }
}

#[async_trait]
impl ScheduleSource for EurogateSource {
    fn terminal(&self) -> Terminal {
        Terminal::Eurogate
    }

    /// Start a session, follow the Hamburg sailing list link, then switch
    /// to the four-week view when the page offers it.
    async fn fetch(&self, fetcher: &HttpFetcher) -> Result<String> {
        info!("[eurogate] Starting session...");
        let start_page = fetcher.get(&self.config.start_url, self.config.timeout).await?;

        let Some(href) = find_link(&start_page, |href| {
            href.to_lowercase().contains(SCHEDULE_LINK) && href.contains(LOCATION_PARAM)
        }) else {
            return Err(EtaTrackerError::LinkNotFound {
                terminal: "eurogate",
                pattern: format!("{} + {}", SCHEDULE_LINK, LOCATION_PARAM),
                markup: start_page,
            });
        };

        info!("[eurogate] Fetching Segelliste...");
        let schedule_page = fetcher.get(&self.absolute(&href), self.config.timeout).await?;

        let page = match find_link(&schedule_page, |href| href.contains(FOUR_WEEK_LINK)) {
            Some(href) => {
                info!("[eurogate] Switching to 4-week view...");
                fetcher.get(&self.absolute(&href), self.config.timeout).await?
            }
            None => {
                warn!("[eurogate] 4-week link not found, using default period");
                schedule_page
            }
        };

        info!("[eurogate] OK - {} bytes received", page.len());
        Ok(page)
    }

    fn parse(&self, markup: &str) -> Extraction {
        parse_schedule(markup)
    }
}

/// Extract events from a sailing list page.
pub fn parse_schedule(markup: &str) -> Extraction {
    let document = Html::parse_document(markup);

    let Some(table) = tables(&document).into_iter().find(|table| {
        let Some(first_row) = table_rows(*table).into_iter().next() else {
            return false;
        };
        let headers: Vec<String> = row_cells(first_row).into_iter().map(cell_text).collect();
        headers.len() >= MIN_COLUMNS
            && headers.iter().any(|h| h == HEADER_DATE)
            && headers.iter().any(|h| h == HEADER_VESSEL)
    }) else {
        warn!("[eurogate] No vessel table found");
        return Extraction::not_found(
            format!("no table with '{}' and '{}' header cells", HEADER_DATE, HEADER_VESSEL),
            markup,
        );
    };

    let grid = resolve_grid(table);
    let columns = grid.first().map_or(0, Vec::len);
    info!("[eurogate] Vessel table: {} rows x {} cols (incl. header)", grid.len(), columns);

    let events: Vec<VesselEvent> = grid.iter().skip(1).filter_map(|row| event_from_row(row)).collect();

    info!("[eurogate] Parsed {} vessels", events.len());
    Extraction::Found(events)
}

fn event_from_row(row: &[String]) -> Option<VesselEvent> {
    let cell = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");

    let event = VesselEvent::new(cell(COL_VESSEL), TERMINAL_LABEL)?;

    let (date, time) = (cell(COL_DATE), cell(COL_TIME));
    let eta = if !date.is_empty() && !time.is_empty() {
        format!("{} {}", date, time)
    } else {
        String::new()
    };

    Some(VesselEvent {
        callsign: non_blank(cell(COL_CALLSIGN)),
        berth: non_blank(cell(COL_BERTH)),
        cargo_operation: non_blank(cell(COL_LOAD_DISCHARGE)),
        status: non_blank(cell(COL_STATUS)),
        broker: non_blank(cell(COL_BROKER)),
        ..event.with_eta(&eta).with_etd(cell(COL_ETD))
    })
}

/// First `href` among the page's anchors accepted by `accept`
fn find_link(markup: &str, accept: impl Fn(&str) -> bool) -> Option<String> {
    let document = Html::parse_document(markup);
    let selector = Selector::parse("a[href]").expect("static selector");
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| accept(href))
        .map(str::to_string)
}
