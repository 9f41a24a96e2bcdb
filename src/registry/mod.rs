// src/registry/mod.rs
//
// Per-document processing status. A document carries five independent
// status axes (download, decode, and one per extracted statement) plus a
// permanent exclusion flag; the registry owns every transition so the
// rules live in one place.

use crate::store::Store;
use crate::utils::clock::Clock;
use crate::utils::error::StoreError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Status of one processing axis. Stored as single-character codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCode {
    #[default]
    NotYet,
    Done,
    /// Set by an operator on a Done axis to force one re-extraction.
    HalfWay,
    Error,
}

impl StatusCode {
    pub fn code(&self) -> &'static str {
        match self {
            StatusCode::NotYet => "0",
            StatusCode::Done => "1",
            StatusCode::HalfWay => "5",
            StatusCode::Error => "9",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(StatusCode::NotYet),
            "1" => Some(StatusCode::Done),
            "5" => Some(StatusCode::HalfWay),
            "9" => Some(StatusCode::Error),
            _ => None,
        }
    }
}

/// The three extracted statement types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    BalanceSheet,
    IncomeStatement,
    ShareCount,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::BalanceSheet,
        StatementKind::IncomeStatement,
        StatementKind::ShareCount,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "1",
            StatementKind::IncomeStatement => "2",
            StatementKind::ShareCount => "4",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "balance sheet",
            StatementKind::IncomeStatement => "income statement",
            StatementKind::ShareCount => "share count",
        }
    }
}

/// One tracked filing document and its processing state.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub doc_id: String,
    pub edinet_code: Option<String>,
    pub doc_type_code: Option<String>,
    pub submit_date: NaiveDate,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    /// Derived fiscal period (Jan 1 of the fiscal year). Absent for filing
    /// types that carry no period.
    pub document_period: Option<NaiveDate>,
    pub downloaded: StatusCode,
    pub decoded: StatusCode,
    pub scraped_balance_sheet: StatusCode,
    pub scraped_income_statement: StatusCode,
    pub scraped_share_count: StatusCode,
    pub balance_sheet_path: Option<PathBuf>,
    pub income_statement_path: Option<PathBuf>,
    pub share_count_path: Option<PathBuf>,
    pub removed: bool,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(doc_id: &str, submit_date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            edinet_code: None,
            doc_type_code: None,
            submit_date,
            period_start: None,
            period_end: None,
            document_period: None,
            downloaded: StatusCode::NotYet,
            decoded: StatusCode::NotYet,
            scraped_balance_sheet: StatusCode::NotYet,
            scraped_income_statement: StatusCode::NotYet,
            scraped_share_count: StatusCode::NotYet,
            balance_sheet_path: None,
            income_statement_path: None,
            share_count_path: None,
            removed: false,
            updated_at: now,
        }
    }

    pub fn extraction_status(&self, kind: StatementKind) -> StatusCode {
        match kind {
            StatementKind::BalanceSheet => self.scraped_balance_sheet,
            StatementKind::IncomeStatement => self.scraped_income_statement,
            StatementKind::ShareCount => self.scraped_share_count,
        }
    }

    fn extraction_status_mut(&mut self, kind: StatementKind) -> &mut StatusCode {
        match kind {
            StatementKind::BalanceSheet => &mut self.scraped_balance_sheet,
            StatementKind::IncomeStatement => &mut self.scraped_income_statement,
            StatementKind::ShareCount => &mut self.scraped_share_count,
        }
    }

    fn set_extraction_path(&mut self, kind: StatementKind, path: Option<PathBuf>) {
        match kind {
            StatementKind::BalanceSheet => self.balance_sheet_path = path,
            StatementKind::IncomeStatement => self.income_statement_path = path,
            StatementKind::ShareCount => self.share_count_path = path,
        }
    }

    /// Three independent hard failures mean an unrecoverable input.
    pub fn all_extraction_error(&self) -> bool {
        StatementKind::ALL
            .iter()
            .all(|kind| self.extraction_status(*kind) == StatusCode::Error)
    }

    /// Fiscal year of the derived document period.
    pub fn fiscal_year(&self) -> Option<i32> {
        self.document_period
            .map(|d| d.year())
            .or_else(|| self.period_end.map(|d| d.year()))
    }

    /// Eligible for pipeline processing: a known company and not excluded.
    pub fn is_target(&self) -> bool {
        !self.removed && self.edinet_code.is_some()
    }
}

/// Applies status transitions and persists them. Every mutation loads the
/// current record, so concurrent tasks see each other's updates through
/// the store rather than through shared memory.
pub struct DocumentRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl DocumentRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn mark_downloaded(&self, doc_id: &str) -> Result<(), StoreError> {
        self.transition(doc_id, |doc| doc.downloaded = StatusCode::Done)
    }

    pub fn mark_download_failed(&self, doc_id: &str) -> Result<(), StoreError> {
        self.transition(doc_id, |doc| doc.downloaded = StatusCode::Error)
    }

    pub fn mark_decoded(&self, doc_id: &str) -> Result<(), StoreError> {
        self.transition(doc_id, |doc| doc.decoded = StatusCode::Done)
    }

    pub fn mark_decode_failed(&self, doc_id: &str) -> Result<(), StoreError> {
        self.transition(doc_id, |doc| doc.decoded = StatusCode::Error)
    }

    pub fn mark_extraction_done(
        &self,
        doc_id: &str,
        kind: StatementKind,
        path: PathBuf,
    ) -> Result<(), StoreError> {
        self.transition(doc_id, |doc| {
            *doc.extraction_status_mut(kind) = StatusCode::Done;
            doc.set_extraction_path(kind, Some(path.clone()));
        })
    }

    pub fn mark_extraction_failed(
        &self,
        doc_id: &str,
        kind: StatementKind,
    ) -> Result<(), StoreError> {
        self.transition(doc_id, |doc| {
            *doc.extraction_status_mut(kind) = StatusCode::Error;
            doc.set_extraction_path(kind, None);
        })
    }

    /// Permanently excludes the document from processing.
    pub fn exclude(&self, doc_id: &str) -> Result<(), StoreError> {
        self.transition(doc_id, |doc| doc.removed = true)
    }

    /// Sets `removed` when every extraction axis reads Error. Returns
    /// whether the document is now excluded.
    pub fn apply_terminal_exclusion(&self, doc_id: &str) -> Result<bool, StoreError> {
        let mut excluded = false;
        self.transition(doc_id, |doc| {
            if doc.all_extraction_error() {
                doc.removed = true;
            }
            excluded = doc.removed;
        })?;
        if excluded {
            tracing::warn!("document {} permanently excluded from processing", doc_id);
        }
        Ok(excluded)
    }

    /// Makes failed and half-way axes of non-removed documents eligible
    /// again. Returns the number of documents touched.
    pub fn reset_for_retry(&self) -> Result<usize, StoreError> {
        let mut touched = 0;
        for doc in self.store.all_documents() {
            if doc.removed {
                continue;
            }
            let mut updated = doc.clone();
            let mut changed = false;
            for status in [
                &mut updated.downloaded,
                &mut updated.decoded,
                &mut updated.scraped_balance_sheet,
                &mut updated.scraped_income_statement,
                &mut updated.scraped_share_count,
            ] {
                if matches!(*status, StatusCode::Error | StatusCode::HalfWay) {
                    *status = StatusCode::NotYet;
                    changed = true;
                }
            }
            if changed {
                updated.updated_at = self.clock.now_utc();
                self.store.update_document(updated)?;
                touched += 1;
            }
        }
        tracing::info!("reset {} documents for retry", touched);
        Ok(touched)
    }

    /// Forces one re-extraction of a Done axis. Axes in any other state are
    /// left alone; returns whether the axis was changed.
    pub fn mark_half_way(&self, doc_id: &str, kind: StatementKind) -> Result<bool, StoreError> {
        let mut changed = false;
        self.transition(doc_id, |doc| {
            if doc.extraction_status(kind) == StatusCode::Done {
                *doc.extraction_status_mut(kind) = StatusCode::HalfWay;
                changed = true;
            }
        })?;
        Ok(changed)
    }

    /// The fiscal-year guard: statement records for this company and kind
    /// already exist for the given year.
    pub fn is_duplicate_fiscal_year(
        &self,
        edinet_code: &str,
        kind: StatementKind,
        fiscal_year: Option<i32>,
    ) -> bool {
        self.store.has_statements_for_year(edinet_code, kind, fiscal_year)
    }

    fn transition<F>(&self, doc_id: &str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Document),
    {
        let mut doc = self
            .store
            .document(doc_id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", doc_id)))?;
        mutate(&mut doc);
        doc.updated_at = self.clock.now_utc();
        self.store.update_document(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::utils::clock::test_support::ManualClock;
    use chrono::TimeZone;

    fn setup() -> (DocumentRegistry, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2023, 6, 1, 9, 0, 0).unwrap(),
        ));
        let registry = DocumentRegistry::new(store.clone(), clock.clone());
        (registry, store, clock)
    }

    fn seed_document(store: &MemoryStore, doc_id: &str) {
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let now = Utc.with_ymd_and_hms(2023, 6, 1, 9, 0, 0).unwrap();
        store.insert_document(Document::new(doc_id, date, now)).unwrap();
    }

    #[test]
    fn terminal_exclusion_requires_all_three_axes_in_error() {
        let (registry, store, _clock) = setup();
        seed_document(&store, "S100AAAA");

        registry.mark_extraction_failed("S100AAAA", StatementKind::BalanceSheet).unwrap();
        registry
            .mark_extraction_done("S100AAAA", StatementKind::IncomeStatement, PathBuf::from("pl.htm"))
            .unwrap();
        registry.mark_extraction_failed("S100AAAA", StatementKind::ShareCount).unwrap();
        assert!(!registry.apply_terminal_exclusion("S100AAAA").unwrap());

        registry.mark_extraction_failed("S100AAAA", StatementKind::IncomeStatement).unwrap();
        assert!(registry.apply_terminal_exclusion("S100AAAA").unwrap());
        assert!(store.document("S100AAAA").unwrap().removed);
    }

    #[test]
    fn reset_skips_removed_documents_and_done_axes() {
        let (registry, store, clock) = setup();
        seed_document(&store, "S100AAAA");
        seed_document(&store, "S100BBBB");

        registry.mark_downloaded("S100AAAA").unwrap();
        registry.mark_extraction_failed("S100AAAA", StatementKind::BalanceSheet).unwrap();
        registry.mark_extraction_failed("S100BBBB", StatementKind::BalanceSheet).unwrap();
        registry.exclude("S100BBBB").unwrap();

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(registry.reset_for_retry().unwrap(), 1);

        let doc = store.document("S100AAAA").unwrap();
        assert_eq!(doc.downloaded, StatusCode::Done);
        assert_eq!(doc.scraped_balance_sheet, StatusCode::NotYet);
        assert_eq!(doc.updated_at, clock.now_utc());

        let removed = store.document("S100BBBB").unwrap();
        assert_eq!(removed.scraped_balance_sheet, StatusCode::Error);
    }

    #[test]
    fn half_way_is_only_reachable_from_done() {
        let (registry, store, _clock) = setup();
        seed_document(&store, "S100AAAA");

        assert!(!registry.mark_half_way("S100AAAA", StatementKind::BalanceSheet).unwrap());
        registry
            .mark_extraction_done("S100AAAA", StatementKind::BalanceSheet, PathBuf::from("bs.htm"))
            .unwrap();
        assert!(registry.mark_half_way("S100AAAA", StatementKind::BalanceSheet).unwrap());
        assert_eq!(
            store.document("S100AAAA").unwrap().scraped_balance_sheet,
            StatusCode::HalfWay
        );

        // half-way axes become eligible again on the next reset
        registry.reset_for_retry().unwrap();
        assert_eq!(
            store.document("S100AAAA").unwrap().scraped_balance_sheet,
            StatusCode::NotYet
        );
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [StatusCode::NotYet, StatusCode::Done, StatusCode::HalfWay, StatusCode::Error] {
            assert_eq!(StatusCode::from_code(status.code()), Some(status));
        }
        assert_eq!(StatusCode::from_code("7"), None);
    }
}
