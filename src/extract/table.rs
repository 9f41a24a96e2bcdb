// src/extract/table.rs
use crate::extract::fragment::keyword_selector;
use crate::extract::Unit;
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to compile TABLE"));
static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("Failed to compile TR"));
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("Failed to compile TD"));

// Cells that carry no information and would shift column indices.
const NOISE_CELLS: &[&str] = &["", "円"];
// Header cells marking the footnote column, not a period.
const ANNOTATION_MARKER: &str = "注記";

/// One line item: label plus raw prior/current values as printed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementLine {
    pub label: String,
    pub prior_value: Option<String>,
    pub current_value: Option<String>,
}

/// A recognized statement table with its amount unit resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementTable {
    pub unit: Unit,
    pub lines: Vec<StatementLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodOrder {
    PriorFirst,
    CurrentFirst,
}

/// Parses the statement table under `keyword` in `path` into labeled rows.
///
/// The table is reduced to a grid of non-blank cells; the amount unit must
/// be declared somewhere in the table text, and multi-period layouts must
/// resolve which column is the current period, otherwise extraction fails
/// for this statement.
pub fn extract_statement(path: &Path, keyword: &str) -> Result<StatementTable, ExtractError> {
    let body = std::fs::read_to_string(path)?;
    let doc = Html::parse_document(&body);
    let selector = keyword_selector(path, keyword)?;

    let unit = detect_unit(&doc, &selector).ok_or_else(|| ExtractError::UnknownUnit {
        path: path.to_path_buf(),
    })?;

    let mut grid = build_grid(&doc, &selector, true);
    if grid.is_empty() {
        return Err(ExtractError::MalformedLayout {
            path: path.to_path_buf(),
            detail: "no table rows under keyword".to_string(),
        });
    }
    if let Some(header) = grid.get_mut(1) {
        header.retain(|cell| !cell.contains(ANNOTATION_MARKER));
    }

    if grid.iter().all(|row| row.len() <= 2) {
        // current period only
        let lines = grid
            .iter()
            .filter(|row| row.len() == 2)
            .map(|row| StatementLine {
                label: row[0].clone(),
                prior_value: None,
                current_value: Some(row[1].clone()),
            })
            .collect();
        return Ok(StatementTable { unit, lines });
    }

    if grid.iter().any(|row| row.len() > 4) {
        return Err(ExtractError::MalformedLayout {
            path: path.to_path_buf(),
            detail: "table has more than four columns".to_string(),
        });
    }

    let header = grid.get(1).cloned().unwrap_or_default();
    let order = resolve_period_order(&header).map_err(|detail| ExtractError::MalformedLayout {
        path: path.to_path_buf(),
        detail,
    })?;

    let lines = grid
        .iter()
        .filter_map(|row| match row.len() {
            2 => Some(StatementLine {
                label: row[0].clone(),
                prior_value: None,
                current_value: Some(row[1].clone()),
            }),
            3 => Some(match order {
                PeriodOrder::PriorFirst => StatementLine {
                    label: row[0].clone(),
                    prior_value: Some(row[1].clone()),
                    current_value: Some(row[2].clone()),
                },
                PeriodOrder::CurrentFirst => StatementLine {
                    label: row[0].clone(),
                    prior_value: Some(row[2].clone()),
                    current_value: Some(row[1].clone()),
                },
            }),
            _ => None,
        })
        .collect();

    Ok(StatementTable { unit, lines })
}

/// Builds the cell grid for every table under the keyword elements. With
/// `drop_noise`, blank and unit-only cells are removed and empty rows are
/// discarded so that column positions stay meaningful.
pub(crate) fn build_grid(doc: &Html, selector: &Selector, drop_noise: bool) -> Vec<Vec<String>> {
    let mut grid = Vec::new();
    for keyword_el in doc.select(selector) {
        for table in keyword_el.select(&TABLE) {
            for tr in table.select(&TR) {
                let row: Vec<String> = tr
                    .select(&TD)
                    .map(|td| cell_text(&td))
                    .filter(|cell| !drop_noise || !NOISE_CELLS.contains(&cell.as_str()))
                    .collect();
                if !drop_noise || !row.is_empty() {
                    grid.push(row);
                }
            }
        }
    }
    grid
}

fn cell_text(el: &ElementRef) -> String {
    let mut text = String::new();
    for piece in el.text() {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(piece);
    }
    text
}

fn detect_unit(doc: &Html, selector: &Selector) -> Option<Unit> {
    let table_texts: Vec<String> = doc
        .select(selector)
        .flat_map(|el| el.select(&TABLE))
        .map(|table| table.text().collect::<String>())
        .collect();
    for unit in [Unit::ThousandsOfYen, Unit::MillionsOfYen] {
        if table_texts
            .iter()
            .any(|text| unit.markers().iter().any(|marker| text.contains(marker)))
        {
            return Some(unit);
        }
    }
    None
}

/// Decides which period column comes first, from the two period cells of
/// the header row. The rules run in priority order and each either gives a
/// definite answer, passes, or reports the header as unreadable; if every
/// rule passes the layout is non-standard and extraction must stop.
fn resolve_period_order(header: &[String]) -> Result<PeriodOrder, String> {
    let (first, second) = match header.len() {
        2 => (&header[0], &header[1]),
        3 => (&header[0], &header[2]),
        n => {
            return Err(format!(
                "header row has {} period cells, cannot resolve period order: {:?}",
                n, header
            ))
        }
    };

    let rules: &[fn(&str, &str) -> Result<Option<PeriodOrder>, String>] =
        &[marker_rule, term_number_rule, fiscal_year_rule];
    for rule in rules {
        if let Some(order) = rule(first, second)? {
            return Ok(order);
        }
    }
    Err(format!(
        "period order not resolvable from '{}' and '{}'",
        first, second
    ))
}

/// Explicit previous/current markers.
fn marker_rule(first: &str, second: &str) -> Result<Option<PeriodOrder>, String> {
    if first.contains('前') && second.contains('当') {
        return Ok(Some(PeriodOrder::PriorFirst));
    }
    if first.contains('当') && second.contains('前') {
        return Ok(Some(PeriodOrder::CurrentFirst));
    }
    Ok(None)
}

/// "No. N term" numerals, e.g. 第101期 vs 第102期.
fn term_number_rule(first: &str, second: &str) -> Result<Option<PeriodOrder>, String> {
    if !(first.contains('第') && first.contains('期')) {
        return Ok(None);
    }
    let a = term_number(first)?;
    let b = term_number(second)?;
    Ok(compare_numbers(a, b))
}

fn term_number(cell: &str) -> Result<i64, String> {
    let start = cell
        .find('第')
        .ok_or_else(|| format!("no term marker in header cell '{}'", cell))?;
    let end = cell
        .find('期')
        .ok_or_else(|| format!("no term marker in header cell '{}'", cell))?;
    let digits = cell
        .get(start + '第'.len_utf8()..end)
        .ok_or_else(|| format!("inverted term markers in header cell '{}'", cell))?;
    digits
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("unreadable term numeral in header cell '{}'", cell))
}

/// Four-digit fiscal-year numerals, e.g. 2021年度 vs 2022年度.
fn fiscal_year_rule(first: &str, second: &str) -> Result<Option<PeriodOrder>, String> {
    if !first.contains("年度") {
        return Ok(None);
    }
    let a = fiscal_year_number(first)?;
    let b = fiscal_year_number(second)?;
    Ok(compare_numbers(a, b))
}

fn fiscal_year_number(cell: &str) -> Result<i64, String> {
    let end = cell
        .find("年度")
        .ok_or_else(|| format!("no fiscal year in header cell '{}'", cell))?;
    cell[..end]
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("unreadable fiscal year in header cell '{}'", cell))
}

fn compare_numbers(a: i64, b: i64) -> Option<PeriodOrder> {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => Some(PeriodOrder::PriorFirst),
        std::cmp::Ordering::Greater => Some(PeriodOrder::CurrentFirst),
        std::cmp::Ordering::Equal => None,
    }
}
