// src/markets/models.rs
//
// Typed views over the three stock-price pages. Parsing is lenient on
// purpose: these hosts render placeholders like "--" for halted stocks and
// decorate numbers with units and labels, so every numeric field is an
// Option and a value that will not parse becomes None with a warning.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;

static NIKKEI_PRICE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".m-stockPriceElm dd").expect("Failed to compile NIKKEI_PRICE")
});
static NIKKEI_DATE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".m-stockInfo_date").expect("Failed to compile NIKKEI_DATE")
});
static NIKKEI_DETAIL_LEFT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".m-stockInfo_detail_left li").expect("Failed to compile NIKKEI_DETAIL_LEFT")
});
static NIKKEI_DETAIL_RIGHT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".m-stockInfo_detail_right li").expect("Failed to compile NIKKEI_DETAIL_RIGHT")
});

static MINKABU_PRICE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.stock_price").expect("Failed to compile MINKABU_PRICE")
});
static MINKABU_DATE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.md_stockBoard_stockTable span.fsm").expect("Failed to compile MINKABU_DATE")
});
static MINKABU_SECTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.ly_content_wrapper").expect("Failed to compile MINKABU_SECTION")
});
static MINKABU_SECTION_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.md_index h2").expect("Failed to compile MINKABU_SECTION_TITLE")
});
static MINKABU_GOAL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("span.fsxxxl").expect("Failed to compile MINKABU_GOAL")
});
static MINKABU_DIAGNOSIS_COL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.ly_colsize_4").expect("Failed to compile MINKABU_DIAGNOSIS_COL")
});
static MINKABU_DIAGNOSIS_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.md_sub_index a").expect("Failed to compile MINKABU_DIAGNOSIS_TITLE")
});
static MINKABU_DIAGNOSIS_VALUE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("span.fsxl").expect("Failed to compile MINKABU_DIAGNOSIS_VALUE")
});

static TABLE_ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table tr").expect("Failed to compile TABLE_ROW"));
static TH: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect("Failed to compile TH"));
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("Failed to compile TD"));

static JAPANESE_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日").expect("Failed to compile JAPANESE_DATE_RE")
});

/// Quote scraped from the Nikkei company page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NikkeiQuote {
    pub price: Option<f64>,
    pub target_date: Option<String>,
    pub opening_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub volume: Option<i64>,
    pub per: Option<String>,
    pub pbr: Option<String>,
}

impl NikkeiQuote {
    pub fn from_html(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let left = |label: &str| labeled_text(&doc, &NIKKEI_DETAIL_LEFT, label);
        let right = |label: &str| labeled_text(&doc, &NIKKEI_DETAIL_RIGHT, label);
        Self {
            price: first_text(&doc, &NIKKEI_PRICE).as_deref().and_then(parse_decorated_number),
            target_date: first_text(&doc, &NIKKEI_DATE),
            opening_price: left("始値").as_deref().and_then(parse_decorated_number),
            high_price: left("高値").as_deref().and_then(parse_decorated_number),
            low_price: left("安値").as_deref().and_then(parse_decorated_number),
            volume: right("売買高")
                .as_deref()
                .and_then(|v| strip_label(v, "売買高"))
                .and_then(parse_volume),
            per: right("PER").map(strip_spaces),
            pbr: left("PBR").map(strip_spaces),
        }
    }

    /// The page's quote date, e.g. "2023/6/1".
    pub fn trade_date(&self) -> Option<NaiveDate> {
        self.target_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y/%m/%d").ok())
    }
}

/// Quote and analyst forecast scraped from the Minkabu stock page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinkabuQuote {
    pub price: Option<f64>,
    pub target_date: Option<String>,
    pub goal_price: Option<f64>,
    pub theoretical_price: Option<f64>,
}

impl MinkabuQuote {
    pub fn from_html(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let forecast = doc.select(&MINKABU_SECTION).find(|section| {
            section
                .select(&MINKABU_SECTION_TITLE)
                .next()
                .map(|h| element_text(&h) == "目標株価")
                .unwrap_or(false)
        });

        let goal_price = forecast
            .and_then(|section| section.select(&MINKABU_GOAL).next())
            .map(|el| element_text(&el))
            .as_deref()
            .and_then(parse_lenient_price);

        let theoretical_price = forecast
            .and_then(|section| {
                section.select(&MINKABU_DIAGNOSIS_COL).find(|col| {
                    col.select(&MINKABU_DIAGNOSIS_TITLE)
                        .next()
                        .map(|a| element_text(&a) == "株価診断")
                        .unwrap_or(false)
                })
            })
            .and_then(|col| col.select(&MINKABU_DIAGNOSIS_VALUE).next())
            .map(|el| element_text(&el))
            .as_deref()
            .and_then(parse_lenient_price);

        Self {
            price: first_text(&doc, &MINKABU_PRICE).as_deref().and_then(parse_lenient_price),
            target_date: first_text(&doc, &MINKABU_DATE)
                .map(|d| d.replace(['(', ')', '（', '）'], "")),
            goal_price,
            theoretical_price,
        }
    }

    /// The board's quote date, printed as "(23/06/01)".
    pub fn trade_date(&self) -> Option<NaiveDate> {
        self.target_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%y/%m/%d").ok())
    }
}

/// One daily row from the Yahoo Finance price-history table.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyQuote {
    pub target_date: NaiveDate,
    pub opening_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub closing_price: Option<f64>,
    pub volume: Option<i64>,
    pub adjusted_closing_price: Option<f64>,
}

impl DailyQuote {
    /// Parses every complete 7-column row of the history table. The header
    /// row decides column order, so a reordered table still maps correctly.
    pub fn rows_from_html(html: &str) -> Vec<Self> {
        let doc = Html::parse_document(html);

        let mut th_order: HashMap<String, usize> = HashMap::new();
        if let Some(header) = doc.select(&TABLE_ROW).next() {
            for (i, th) in header.select(&TH).enumerate() {
                th_order.insert(element_text(&th), i);
            }
        }
        let col = |cells: &[String], name: &str| -> Option<String> {
            th_order.get(name).and_then(|i| cells.get(*i)).cloned()
        };

        doc.select(&TABLE_ROW)
            .filter_map(|tr| {
                // data rows carry the date in a th and the prices in tds
                let mut cells: Vec<String> =
                    tr.select(&TH).take(1).map(|el| element_text(&el)).collect();
                cells.extend(tr.select(&TD).map(|el| element_text(&el)));
                if cells.len() != 7 {
                    return None;
                }
                let target_date = col(&cells, "日付").as_deref().and_then(parse_japanese_date)?;
                Some(Self {
                    target_date,
                    opening_price: col(&cells, "始値").as_deref().and_then(parse_plain_number),
                    high_price: col(&cells, "高値").as_deref().and_then(parse_plain_number),
                    low_price: col(&cells, "安値").as_deref().and_then(parse_plain_number),
                    closing_price: col(&cells, "終値").as_deref().and_then(parse_plain_number),
                    volume: col(&cells, "出来高").as_deref().and_then(parse_volume),
                    adjusted_closing_price: col(&cells, "調整後終値")
                        .as_deref()
                        .and_then(parse_plain_number),
                })
            })
            .collect()
    }
}

/// A persisted daily price point for one company, tagged with the host it
/// came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StockPriceRecord {
    pub code: String,
    pub target_date: NaiveDate,
    pub opening_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub closing_price: Option<f64>,
    pub volume: Option<i64>,
    pub source: String,
}

/// A persisted analyst forecast for one company, from the Minkabu page.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub code: String,
    pub target_date: NaiveDate,
    pub goal_price: Option<f64>,
    pub theoretical_price: Option<f64>,
}

fn element_text(el: &scraper::ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector).next().map(|el| element_text(&el))
}

fn labeled_text(doc: &Html, selector: &Selector, label: &str) -> Option<String> {
    doc.select(selector)
        .map(|el| element_text(&el))
        .find(|text| text.contains(label))
}

fn strip_spaces(value: String) -> String {
    value.replace([' ', '\u{3000}'], "")
}

fn strip_label(value: &str, label: &str) -> Option<String> {
    value.find(label).map(|i| value[i + label.len()..].to_string())
}

/// Parses values like "始値 (9:00) 1,234円": everything before the closing
/// paren is a label, the trailing unit character is dropped.
fn parse_decorated_number(value: &str) -> Option<f64> {
    let after_label = match value.rfind([')', '）']) {
        Some(i) => {
            let paren_len = value[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            &value[i + paren_len..]
        }
        None => value,
    };
    parse_lenient_price(after_label)
}

/// Strips currency/share decorations and commas; "--" and friends are None.
fn parse_lenient_price(value: &str) -> Option<f64> {
    let cleaned = value
        .replace(". ", ".")
        .replace(['円', '株', '倍', '%'], "")
        .replace([' ', '\u{3000}', ','], "");
    if cleaned.is_empty() || cleaned == "--" || cleaned == "---" {
        return None;
    }
    match cleaned.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("could not parse price value '{}', keeping it absent", value);
            None
        }
    }
}

fn parse_plain_number(value: &str) -> Option<f64> {
    parse_lenient_price(value)
}

fn parse_volume(value: impl AsRef<str>) -> Option<i64> {
    parse_lenient_price(value.as_ref()).map(|v| v as i64)
}

fn parse_japanese_date(value: &str) -> Option<NaiveDate> {
    let caps = JAPANESE_DATE_RE.captures(value)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
