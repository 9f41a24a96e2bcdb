// src/store/mod.rs
//
// Persistence contract. The pipeline only depends on this trait; the
// bundled implementation is the in-memory store, which enforces the same
// uniqueness and referential-integrity rules a relational backend would.

pub mod memory;

use crate::markets::models::{ForecastRecord, StockPriceRecord};
use crate::registry::{Document, StatementKind};
use crate::utils::error::StoreError;
use chrono::{DateTime, NaiveDate, Utc};

/// A filer. Placeholder rows carry no securities code until master data
/// fills them in.
#[derive(Debug, Clone, PartialEq)]
pub struct Company {
    pub edinet_code: String,
    pub code: Option<String>,
    pub name: String,
}

impl Company {
    /// Self-healing row inserted when a filing references an unknown filer.
    pub fn placeholder(edinet_code: &str) -> Self {
        Self {
            edinet_code: edinet_code.to_string(),
            code: None,
            name: format!("UNKNOWN ({})", edinet_code),
        }
    }
}

/// One extracted line-item value.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord {
    pub edinet_code: String,
    pub kind: StatementKind,
    pub subject_id: String,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    /// Year key for the uniqueness constraint, taken from the document's
    /// derived fiscal period.
    pub fiscal_year: Option<i32>,
    pub value: Option<i64>,
    pub doc_id: String,
    pub created_at: DateTime<Utc>,
}

/// Canonical line item and the label texts that map onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementSubject {
    pub id: String,
    pub kind: StatementKind,
    pub labels: Vec<String>,
}

// Balance-sheet subject ids used by the supplement rules.
pub const BS_TOTAL_CURRENT_LIABILITIES: &str = "8";
pub const BS_TOTAL_FIXED_LIABILITIES: &str = "9";
pub const BS_TOTAL_LIABILITIES: &str = "10";
// The share-count table has a single synthetic subject.
pub const NS_TOTAL_SHARES: &str = "0";

/// Keyed insert/update/select over the persisted entities. Inserts enforce
/// uniqueness and referential integrity and surface violations as typed
/// [`StoreError`] values the pipeline can branch on.
pub trait Store: Send + Sync {
    fn insert_company(&self, company: Company) -> Result<(), StoreError>;
    fn company_by_edinet_code(&self, edinet_code: &str) -> Option<Company>;

    /// Fails with `DuplicateKey` when the document id exists, and with
    /// `ForeignKey` when the referenced company does not.
    fn insert_document(&self, document: Document) -> Result<(), StoreError>;
    fn document(&self, doc_id: &str) -> Option<Document>;
    fn documents_for_date(&self, submit_date: NaiveDate) -> Vec<Document>;
    fn all_documents(&self) -> Vec<Document>;
    fn update_document(&self, document: Document) -> Result<(), StoreError>;

    fn subject_by_label(&self, kind: StatementKind, label: &str) -> Option<StatementSubject>;

    /// Fails with `DuplicateKey` when a record already exists for the same
    /// company, statement kind, subject and fiscal year.
    fn insert_statement(&self, record: StatementRecord) -> Result<(), StoreError>;
    fn statement_value(
        &self,
        doc_id: &str,
        kind: StatementKind,
        subject_id: &str,
    ) -> Option<i64>;
    fn has_statements_for_year(
        &self,
        edinet_code: &str,
        kind: StatementKind,
        fiscal_year: Option<i32>,
    ) -> bool;

    fn insert_stock_price(&self, record: StockPriceRecord) -> Result<(), StoreError>;
    /// Fails with `DuplicateKey` when a forecast for the same company and
    /// date already exists.
    fn insert_forecast(&self, record: ForecastRecord) -> Result<(), StoreError>;
}

/// The subject taxonomy the extraction labels are matched against. A real
/// deployment loads this from master data; the defaults cover the totals
/// the pipeline itself depends on plus the common headline items.
pub fn default_subjects() -> Vec<StatementSubject> {
    let bs = |id: &str, labels: &[&str]| StatementSubject {
        id: id.to_string(),
        kind: StatementKind::BalanceSheet,
        labels: labels.iter().map(|l| l.to_string()).collect(),
    };
    let pl = |id: &str, labels: &[&str]| StatementSubject {
        id: id.to_string(),
        kind: StatementKind::IncomeStatement,
        labels: labels.iter().map(|l| l.to_string()).collect(),
    };
    vec![
        bs("1", &["流動資産合計"]),
        bs("4", &["投資その他の資産合計"]),
        bs("7", &["資産合計", "総資産"]),
        bs(BS_TOTAL_CURRENT_LIABILITIES, &["流動負債合計"]),
        bs(BS_TOTAL_FIXED_LIABILITIES, &["固定負債合計"]),
        bs(BS_TOTAL_LIABILITIES, &["負債合計"]),
        bs("14", &["純資産合計"]),
        bs("16", &["新株予約権"]),
        pl("3", &["営業利益", "営業利益又は営業損失（△）"]),
        pl("11", &["当期純利益", "当期純利益又は当期純損失（△）"]),
        StatementSubject {
            id: NS_TOTAL_SHARES.to_string(),
            kind: StatementKind::ShareCount,
            labels: vec!["計".to_string()],
        },
    ]
}
