//! HTML table helpers and rowspan resolution.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Selector};

/// Logical table: row 0 is the header row.
pub type Grid = Vec<Vec<String>>;

/// All `<table>` elements in document order, nested ones included.
pub fn tables(document: &Html) -> Vec<ElementRef<'_>> {
    let selector = Selector::parse("table").expect("static selector");
    document.select(&selector).collect()
}

/// Whether the markup contains any table at all.
pub fn has_table_markup(markup: &str) -> bool {
    markup.to_ascii_lowercase().contains("<table")
}

/// Rows that belong to `table` itself, not to tables nested in its cells.
///
/// The parser wraps rows in `<tbody>` even when the source omits it, so row
/// groups are descended into.
pub fn table_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows = Vec::new();
    for child in child_elements(table) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(child_elements(child).filter(|e| e.value().name() == "tr"));
            }
            _ => {}
        }
    }
    rows
}

/// Direct `<th>`/`<td>` children of a row.
pub fn row_cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    child_elements(row)
        .filter(|e| matches!(e.value().name(), "th" | "td"))
        .collect()
}

/// Direct `<td>` children of a row.
pub fn data_cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    child_elements(row)
        .filter(|e| e.value().name() == "td")
        .collect()
}

/// Cell text with every text node trimmed and the pieces joined.
pub fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}

/// Largest rowspan browsers honour
const MAX_ROWSPAN: usize = 65_534;

/// Declared rowspan; missing or malformed values count as 1.
fn rowspan(cell: ElementRef<'_>) -> usize {
    cell.value()
        .attr("rowspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .map_or(1, |n| n.min(MAX_ROWSPAN))
}

/// Resolve rowspans into a grid where every row carries every column.
///
/// Rows are walked top to bottom. A cell spanning N rows injects its text
/// into the same column of the next N-1 rows; at each column position an
/// injected value is consumed before the next physical cell. A row made
/// up only of injected values is still emitted. Spans are cut off at the
/// last row of the table.
pub fn resolve_grid(table: ElementRef<'_>) -> Grid {
    let rows = table_rows(table);
    let row_count = rows.len();
    let mut injected: HashMap<(usize, usize), String> = HashMap::new();
    let mut grid = Vec::with_capacity(row_count);

    for (row_idx, row) in rows.into_iter().enumerate() {
        let mut cells = row_cells(row).into_iter();
        let mut logical = Vec::new();
        let mut col_idx = 0;

        loop {
            if let Some(text) = injected.remove(&(row_idx, col_idx)) {
                logical.push(text);
            } else if let Some(cell) = cells.next() {
                let text = cell_text(cell);
                let span = rowspan(cell).min(row_count - row_idx);
                for offset in 1..span {
                    injected.insert((row_idx + offset, col_idx), text.clone());
                }
                logical.push(text);
            } else {
                break;
            }
            col_idx += 1;
        }

        grid.push(logical);
    }

    grid
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}
