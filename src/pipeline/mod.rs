// src/pipeline/mod.rs
//
// End-to-end orchestration: list filings for a date, register them,
// download/decode archives, run the three extractions per document and
// keep the status registry current. Failures stay local to one document;
// the batch always runs to completion.

use crate::edinet::models::{EdinetResponse, FilingResult, ListMode};
use crate::edinet::FilingApi;
use crate::extract::normalize::{normalize_scaled, normalize_value};
use crate::extract::table::StatementTable;
use crate::extract::{fragment, shares, statement_keywords, table};
use crate::markets::client::MarketClient;
use crate::markets::models::{ForecastRecord, MinkabuQuote, NikkeiQuote, StockPriceRecord};
use crate::registry::{Document, DocumentRegistry, StatementKind, StatusCode};
use crate::store::{
    Company, StatementRecord, Store, BS_TOTAL_CURRENT_LIABILITIES, BS_TOTAL_FIXED_LIABILITIES,
    BS_TOTAL_LIABILITIES, NS_TOTAL_SHARES,
};
use crate::utils::clock::Clock;
use crate::utils::error::{AppError, ExtractError, StoreError};
use chrono::{Datelike, NaiveDate};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Filing types that carry a fiscal period: annual and quarterly reports
// plus their amendments.
const TARGET_DOC_TYPES: &[&str] = &["120", "130", "140", "150"];

// Sentinel period for filings whose fiscal period cannot be derived.
const EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1970, 1, 1) {
    Some(d) => d,
    None => panic!("invalid epoch date"),
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Downloaded archives land here, partitioned by date.
    pub archive_dir: PathBuf,
    /// Unpacked filing trees, mirroring the archive partitioning.
    pub decode_dir: PathBuf,
    /// Documents processed concurrently per date.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("data/archive"),
            decode_dir: PathBuf::from("data/decoded"),
            concurrency: 4,
        }
    }
}

/// Batch counts reported after a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub excluded: usize,
    pub failed: usize,
}

enum DocOutcome {
    Processed,
    Skipped,
    Excluded,
    Failed,
}

pub struct Pipeline {
    api: Arc<dyn FilingApi>,
    store: Arc<dyn Store>,
    registry: DocumentRegistry,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        api: Arc<dyn FilingApi>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        let registry = DocumentRegistry::new(store.clone(), clock.clone());
        Self {
            api,
            store,
            registry,
            clock,
            config,
        }
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Processes every eligible filing submitted on `date`.
    pub async fn process_date(&self, date: NaiveDate) -> Result<RunSummary, AppError> {
        let metadata = self.api.list(date, ListMode::MetadataOnly).await?;
        if metadata.result_count() == "0" {
            tracing::info!("no filings submitted on {}", date);
            return Ok(RunSummary::default());
        }

        let full = self.api.list(date, ListMode::Full).await?;
        self.register_filings(date, &full)?;

        let targets: Vec<Document> = self
            .store
            .documents_for_date(date)
            .into_iter()
            .filter(Document::is_target)
            .collect();
        tracing::info!("processing {} documents submitted on {}", targets.len(), date);

        let outcomes: Vec<DocOutcome> = stream::iter(targets)
            .map(|doc| self.process_document(doc))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for outcome in outcomes {
            match outcome {
                DocOutcome::Processed => summary.processed += 1,
                DocOutcome::Skipped => summary.skipped += 1,
                DocOutcome::Excluded => summary.excluded += 1,
                DocOutcome::Failed => summary.failed += 1,
            }
        }
        tracing::info!(
            "run for {} finished: {} processed, {} skipped, {} excluded, {} failed",
            date,
            summary.processed,
            summary.skipped,
            summary.excluded,
            summary.failed
        );
        Ok(summary)
    }

    /// Processes one already-registered document by id.
    pub async fn process_document_id(&self, doc_id: &str) -> Result<(), AppError> {
        let doc = self
            .store
            .document(doc_id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", doc_id)))?;
        if !doc.is_target() {
            tracing::info!("document {} is not a processing target", doc_id);
            return Ok(());
        }
        self.scrape_document(&doc).await?;
        Ok(())
    }

    /// Inserts filing and document records, skipping duplicates and
    /// self-healing a missing company reference with a placeholder row.
    pub fn register_filings(&self, date: NaiveDate, response: &EdinetResponse) -> Result<(), AppError> {
        for result in &response.results {
            let doc = self.document_from_filing(date, result);
            match self.store.insert_document(doc.clone()) {
                Ok(()) => {}
                Err(StoreError::DuplicateKey(_)) => {
                    tracing::debug!("document {} already registered, skipping", doc.doc_id);
                }
                Err(StoreError::ForeignKey(_)) => {
                    let edinet_code = doc.edinet_code.clone().unwrap_or_default();
                    tracing::info!(
                        "filer {} unknown, inserting placeholder company",
                        edinet_code
                    );
                    match self.store.insert_company(Company::placeholder(&edinet_code)) {
                        Ok(()) | Err(StoreError::DuplicateKey(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    self.store.insert_document(doc)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn document_from_filing(&self, date: NaiveDate, result: &FilingResult) -> Document {
        let mut doc = Document::new(&result.doc_id, date, self.clock.now_utc());
        doc.edinet_code = result.edinet_code.clone();
        doc.doc_type_code = result.doc_type_code.clone();
        doc.period_start = result.period_start.as_deref().and_then(parse_date);
        doc.period_end = result.period_end.as_deref().and_then(parse_date);
        doc.document_period = self.parse_document_period(result);
        doc
    }

    /// Derives the fiscal period of a filing: Jan 1 of the period-end year,
    /// falling back to the parent filing's period for amendments, and to a
    /// sentinel epoch when neither is known. Filing types without a fiscal
    /// period get none.
    fn parse_document_period(&self, result: &FilingResult) -> Option<NaiveDate> {
        let is_target = result
            .doc_type_code
            .as_deref()
            .map(|code| TARGET_DOC_TYPES.contains(&code))
            .unwrap_or(false);
        if !is_target {
            return None;
        }

        if let Some(end) = result.period_end.as_deref().and_then(parse_date) {
            return NaiveDate::from_ymd_opt(end.year(), 1, 1);
        }
        if let Some(parent_id) = &result.parent_doc_id {
            if let Some(period) = self.store.document(parent_id).and_then(|d| d.document_period) {
                return Some(period);
            }
        }
        Some(EPOCH)
    }

    async fn process_document(&self, doc: Document) -> DocOutcome {
        let doc_id = doc.doc_id.clone();
        match self.scrape_document(&doc).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("processing document {} failed: {}", doc_id, e);
                DocOutcome::Failed
            }
        }
    }

    async fn scrape_document(&self, doc: &Document) -> Result<DocOutcome, AppError> {
        let decoded_dir = self.decoded_dir_for(doc);

        if doc.downloaded != StatusCode::Done || doc.decoded != StatusCode::Done {
            if !self.ensure_decoded(doc, &decoded_dir).await? {
                return Ok(DocOutcome::Failed);
            }
        }

        // reload: download/decode transitions have been persisted
        let doc = self
            .store
            .document(&doc.doc_id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", doc.doc_id)))?;
        let Some(edinet_code) = doc.edinet_code.clone() else {
            return Ok(DocOutcome::Skipped);
        };

        let mut attempted = false;
        for kind in StatementKind::ALL {
            if doc.extraction_status(kind) != StatusCode::NotYet {
                continue;
            }
            attempted = true;

            if self
                .registry
                .is_duplicate_fiscal_year(&edinet_code, kind, doc.fiscal_year())
            {
                tracing::info!(
                    "{} records for {} already cover fiscal year {:?}, excluding document {}",
                    kind.name(),
                    edinet_code,
                    doc.fiscal_year(),
                    doc.doc_id
                );
                self.registry.exclude(&doc.doc_id)?;
                // the document is removed now; the remaining axes must not
                // extract from it
                break;
            }

            if let Err(e) = self.extract_axis(&doc, &edinet_code, kind, &decoded_dir) {
                tracing::warn!(
                    "{} extraction failed for document {}: {}",
                    kind.name(),
                    doc.doc_id,
                    e
                );
                self.registry.mark_extraction_failed(&doc.doc_id, kind)?;
            }
        }

        let excluded = self.registry.apply_terminal_exclusion(&doc.doc_id)?;
        if excluded {
            Ok(DocOutcome::Excluded)
        } else if attempted {
            Ok(DocOutcome::Processed)
        } else {
            Ok(DocOutcome::Skipped)
        }
    }

    /// Brings the document to downloaded+decoded, reusing an existing
    /// decoded tree from an earlier run. Returns false when the document
    /// cannot be made ready.
    async fn ensure_decoded(&self, doc: &Document, decoded_dir: &Path) -> Result<bool, AppError> {
        if decoded_dir.is_dir() {
            tracing::debug!(
                "decoded tree for {} already present at {}",
                doc.doc_id,
                decoded_dir.display()
            );
            self.registry.mark_downloaded(&doc.doc_id)?;
            self.registry.mark_decoded(&doc.doc_id)?;
            return Ok(true);
        }

        let archive_dir = self.partitioned(&self.config.archive_dir, doc.submit_date);
        let zip_path = match self.api.acquire(&doc.doc_id, &archive_dir).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("download of document {} failed: {}", doc.doc_id, e);
                self.registry.mark_download_failed(&doc.doc_id)?;
                return Ok(false);
            }
        };
        self.registry.mark_downloaded(&doc.doc_id)?;

        if let Err(e) = unpack_archive(&zip_path, decoded_dir) {
            tracing::warn!("decoding archive for {} failed: {}", doc.doc_id, e);
            self.registry.mark_decode_failed(&doc.doc_id)?;
            return Ok(false);
        }
        self.registry.mark_decoded(&doc.doc_id)?;
        Ok(true)
    }

    fn extract_axis(
        &self,
        doc: &Document,
        edinet_code: &str,
        kind: StatementKind,
        decoded_dir: &Path,
    ) -> Result<(), AppError> {
        let (path, keyword) = match self.find_statement_file(decoded_dir, kind) {
            Ok(found) => found,
            // soft miss: the filing simply has no such statement
            Err(e) if e.is_soft() => {
                tracing::info!(
                    "no {} fragment for document {}: {}",
                    kind.name(),
                    doc.doc_id,
                    e
                );
                self.registry.mark_extraction_failed(&doc.doc_id, kind)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match kind {
            StatementKind::BalanceSheet | StatementKind::IncomeStatement => {
                let table = table::extract_statement(&path, keyword)?;
                self.persist_statement_lines(doc, edinet_code, kind, &table)?;
                if kind == StatementKind::BalanceSheet {
                    self.supplement_fixed_liabilities(doc, edinet_code)?;
                }
            }
            StatementKind::ShareCount => {
                let raw = shares::extract_share_count(&path, keyword)?;
                self.insert_record(doc, edinet_code, kind, NS_TOTAL_SHARES, normalize_value(&raw))?;
            }
        }

        self.registry.mark_extraction_done(&doc.doc_id, kind, path)?;
        Ok(())
    }

    /// Tries the statement's fragment keywords in priority order.
    fn find_statement_file(
        &self,
        decoded_dir: &Path,
        kind: StatementKind,
    ) -> Result<(PathBuf, &'static str), ExtractError> {
        let keywords = statement_keywords(kind);
        for keyword in keywords {
            if let Some(path) = fragment::find_fragment(decoded_dir, keyword)? {
                return Ok((path, keyword));
            }
        }
        Err(ExtractError::NotFound {
            keyword: keywords.join(", "),
        })
    }

    fn persist_statement_lines(
        &self,
        doc: &Document,
        edinet_code: &str,
        kind: StatementKind,
        table: &StatementTable,
    ) -> Result<(), AppError> {
        for line in &table.lines {
            let Some(subject) = self.store.subject_by_label(kind, &line.label) else {
                continue;
            };
            let value = line
                .current_value
                .as_deref()
                .and_then(|raw| normalize_scaled(raw, table.unit));
            self.insert_record(doc, edinet_code, kind, &subject.id, value)?;
        }
        Ok(())
    }

    /// When current liabilities equal total liabilities the filing has no
    /// fixed-liabilities line at all; record an explicit zero so downstream
    /// consumers see a complete set of totals.
    fn supplement_fixed_liabilities(&self, doc: &Document, edinet_code: &str) -> Result<(), AppError> {
        let kind = StatementKind::BalanceSheet;
        let current = self
            .store
            .statement_value(&doc.doc_id, kind, BS_TOTAL_CURRENT_LIABILITIES);
        let total = self.store.statement_value(&doc.doc_id, kind, BS_TOTAL_LIABILITIES);
        let fixed = self
            .store
            .statement_value(&doc.doc_id, kind, BS_TOTAL_FIXED_LIABILITIES);

        if let (Some(current), Some(total), None) = (current, total, fixed) {
            if current == total {
                tracing::info!(
                    "no fixed-liabilities total in document {}, recording zero",
                    doc.doc_id
                );
                self.insert_record(doc, edinet_code, kind, BS_TOTAL_FIXED_LIABILITIES, Some(0))?;
            }
        }
        Ok(())
    }

    fn insert_record(
        &self,
        doc: &Document,
        edinet_code: &str,
        kind: StatementKind,
        subject_id: &str,
        value: Option<i64>,
    ) -> Result<(), AppError> {
        let record = StatementRecord {
            edinet_code: edinet_code.to_string(),
            kind,
            subject_id: subject_id.to_string(),
            period_start: doc.period_start,
            period_end: doc.period_end,
            fiscal_year: doc.fiscal_year(),
            value,
            doc_id: doc.doc_id.clone(),
            created_at: self.clock.now_utc(),
        };
        match self.store.insert_statement(record) {
            Ok(()) => Ok(()),
            // a concurrent task won the race; the constraint did its job
            Err(StoreError::DuplicateKey(detail)) => {
                tracing::debug!("statement already present, skipping: {}", detail);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches and persists stock prices for each company code: the Nikkei
    /// and Minkabu spot quotes plus the Yahoo Finance daily history. A
    /// failing host only costs that host's rows for that code.
    pub async fn import_stock_prices(
        &self,
        market: &MarketClient,
        codes: &[String],
    ) -> Result<usize, AppError> {
        let inserted: Vec<usize> = stream::iter(codes)
            .map(|code| self.import_prices_for(market, code))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let total = inserted.iter().sum();
        tracing::info!("imported {} price rows for {} companies", total, codes.len());
        Ok(total)
    }

    async fn import_prices_for(&self, market: &MarketClient, code: &str) -> usize {
        let mut inserted = 0;
        match market.nikkei(code).await {
            Ok(quote) => inserted += self.persist_nikkei(code, &quote),
            Err(e) => tracing::warn!("nikkei quote for {} failed: {}", code, e),
        }
        match market.minkabu(code).await {
            Ok(quote) => inserted += self.persist_minkabu(code, &quote),
            Err(e) => tracing::warn!("minkabu quote for {} failed: {}", code, e),
        }
        match market.yahoo_daily(code).await {
            Ok(rows) => inserted += self.persist_price_rows(code, rows),
            Err(e) => tracing::warn!("price history for {} failed: {}", code, e),
        }
        inserted
    }

    /// Stores the Nikkei spot quote as one price row for its trade date.
    fn persist_nikkei(&self, code: &str, quote: &NikkeiQuote) -> usize {
        let Some(target_date) = quote.trade_date() else {
            tracing::warn!("nikkei quote for {} carries no readable date, skipping", code);
            return 0;
        };
        self.insert_price(StockPriceRecord {
            code: code.to_string(),
            target_date,
            opening_price: quote.opening_price,
            high_price: quote.high_price,
            low_price: quote.low_price,
            closing_price: quote.price,
            volume: quote.volume,
            source: "nikkei".to_string(),
        })
    }

    /// Stores the Minkabu quote as a closing-price row plus the analyst
    /// forecast attached to it.
    fn persist_minkabu(&self, code: &str, quote: &MinkabuQuote) -> usize {
        let Some(target_date) = quote.trade_date() else {
            tracing::warn!("minkabu quote for {} carries no readable date, skipping", code);
            return 0;
        };
        let inserted = self.insert_price(StockPriceRecord {
            code: code.to_string(),
            target_date,
            opening_price: None,
            high_price: None,
            low_price: None,
            closing_price: quote.price,
            volume: None,
            source: "minkabu".to_string(),
        });
        let forecast = ForecastRecord {
            code: code.to_string(),
            target_date,
            goal_price: quote.goal_price,
            theoretical_price: quote.theoretical_price,
        };
        match self.store.insert_forecast(forecast) {
            Ok(()) | Err(StoreError::DuplicateKey(_)) => {}
            Err(e) => tracing::warn!("forecast for {} not stored: {}", code, e),
        }
        inserted
    }

    fn persist_price_rows(&self, code: &str, rows: Vec<crate::markets::models::DailyQuote>) -> usize {
        rows.into_iter()
            .map(|row| {
                self.insert_price(StockPriceRecord {
                    code: code.to_string(),
                    target_date: row.target_date,
                    opening_price: row.opening_price,
                    high_price: row.high_price,
                    low_price: row.low_price,
                    closing_price: row.closing_price,
                    volume: row.volume,
                    source: "yahoo-finance".to_string(),
                })
            })
            .sum()
    }

    fn insert_price(&self, record: StockPriceRecord) -> usize {
        let code = record.code.clone();
        match self.store.insert_stock_price(record) {
            Ok(()) => 1,
            Err(StoreError::DuplicateKey(_)) => 0,
            Err(e) => {
                tracing::warn!("price row for {} not stored: {}", code, e);
                0
            }
        }
    }

    fn decoded_dir_for(&self, doc: &Document) -> PathBuf {
        self.partitioned(&self.config.decode_dir, doc.submit_date)
            .join(&doc.doc_id)
    }

    fn partitioned(&self, base: &Path, date: NaiveDate) -> PathBuf {
        base.join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn unpack_archive(zip_path: &Path, dest: &Path) -> Result<(), AppError> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| AppError::Archive(e.to_string()))?;
    archive
        .extract(dest)
        .map_err(|e| AppError::Archive(e.to_string()))?;
    tracing::debug!("unpacked {} into {}", zip_path.display(), dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edinet::models::{Metadata, ResultSet};
    use crate::store::memory::MemoryStore;
    use crate::utils::clock::test_support::ManualClock;
    use crate::utils::error::ClientError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockApi {
        responses: Mutex<Vec<EdinetResponse>>,
        list_calls: AtomicUsize,
        acquire_calls: AtomicUsize,
    }

    impl MockApi {
        fn new(responses: Vec<EdinetResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                list_calls: AtomicUsize::new(0),
                acquire_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FilingApi for MockApi {
        async fn list(&self, _date: NaiveDate, _mode: ListMode) -> Result<EdinetResponse, ClientError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("unexpected list call");
            }
            Ok(responses.remove(0))
        }

        async fn acquire(&self, doc_id: &str, dest_dir: &Path) -> Result<PathBuf, AppError> {
            self.acquire_calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(dest_dir)?;
            let path = dest_dir.join(format!("{}.zip", doc_id));
            std::fs::write(&path, b"not a real archive")?;
            Ok(path)
        }
    }

    fn response(count: &str, results: Vec<FilingResult>) -> EdinetResponse {
        EdinetResponse {
            metadata: Metadata {
                resultset: ResultSet {
                    count: count.to_string(),
                },
            },
            results,
        }
    }

    fn filing(doc_id: &str, edinet_code: Option<&str>) -> FilingResult {
        FilingResult {
            doc_id: doc_id.to_string(),
            edinet_code: edinet_code.map(str::to_string),
            filer_name: Some("Example Industries".to_string()),
            doc_type_code: Some("120".to_string()),
            parent_doc_id: None,
            period_start: Some("2022-04-01".to_string()),
            period_end: Some("2023-03-31".to_string()),
            doc_description: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
    }

    struct Setup {
        pipeline: Pipeline,
        api: Arc<MockApi>,
        store: Arc<MemoryStore>,
        _dirs: tempfile::TempDir,
    }

    fn setup(responses: Vec<EdinetResponse>) -> Setup {
        let dirs = tempfile::tempdir().unwrap();
        let api = Arc::new(MockApi::new(responses));
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2023, 6, 1, 9, 0, 0).unwrap(),
        ));
        let pipeline = Pipeline::new(
            api.clone(),
            store.clone(),
            clock,
            PipelineConfig {
                archive_dir: dirs.path().join("archive"),
                decode_dir: dirs.path().join("decoded"),
                concurrency: 2,
            },
        );
        Setup {
            pipeline,
            api,
            store,
            _dirs: dirs,
        }
    }

    #[test]
    fn registration_self_heals_missing_company_once() {
        let s = setup(vec![]);
        let resp = response("1", vec![filing("S100AAAA", Some("E99999"))]);

        s.pipeline.register_filings(date(), &resp).unwrap();

        let company = s.store.company_by_edinet_code("E99999").unwrap();
        assert!(company.name.contains("E99999"));
        let doc = s.store.document("S100AAAA").unwrap();
        assert_eq!(doc.fiscal_year(), Some(2023));
        assert_eq!(
            doc.document_period,
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );

        // registering the same response again is a no-op
        s.pipeline.register_filings(date(), &resp).unwrap();
        assert_eq!(s.store.all_documents().len(), 1);
    }

    #[test]
    fn amendment_inherits_period_from_parent_filing() {
        let s = setup(vec![]);
        s.pipeline
            .register_filings(date(), &response("1", vec![filing("S100AAAA", Some("E99999"))]))
            .unwrap();

        let mut amendment = filing("S100BBBB", Some("E99999"));
        amendment.doc_type_code = Some("130".to_string());
        amendment.period_start = None;
        amendment.period_end = None;
        amendment.parent_doc_id = Some("S100AAAA".to_string());
        s.pipeline
            .register_filings(date(), &response("1", vec![amendment]))
            .unwrap();

        assert_eq!(
            s.store.document("S100BBBB").unwrap().document_period,
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );

        // no period and no parent falls back to the sentinel
        let mut orphan = filing("S100CCCC", Some("E99999"));
        orphan.period_end = None;
        orphan.parent_doc_id = None;
        s.pipeline
            .register_filings(date(), &response("1", vec![orphan]))
            .unwrap();
        assert_eq!(s.store.document("S100CCCC").unwrap().document_period, Some(EPOCH));

        // non-target filing types carry no period
        let mut other = filing("S100DDDD", Some("E99999"));
        other.doc_type_code = Some("030".to_string());
        s.pipeline
            .register_filings(date(), &response("1", vec![other]))
            .unwrap();
        assert_eq!(s.store.document("S100DDDD").unwrap().document_period, None);
    }

    #[tokio::test]
    async fn empty_submission_day_short_circuits() {
        let s = setup(vec![response("0", vec![])]);
        let summary = s.pipeline.process_date(date()).await.unwrap();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(s.api.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fully_processed_date_makes_no_download_calls() {
        let listing = vec![filing("S100AAAA", Some("E00001"))];
        let s = setup(vec![
            response("1", listing.clone()),
            response("1", listing),
        ]);
        s.store.insert_company(Company::placeholder("E00001")).unwrap();

        // already fully processed in an earlier run
        let mut doc = s
            .pipeline
            .document_from_filing(date(), &filing("S100AAAA", Some("E00001")));
        doc.downloaded = StatusCode::Done;
        doc.decoded = StatusCode::Done;
        doc.scraped_balance_sheet = StatusCode::Done;
        doc.scraped_income_statement = StatusCode::Done;
        doc.scraped_share_count = StatusCode::Done;
        s.store.insert_document(doc).unwrap();

        let summary = s.pipeline.process_date(date()).await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 0);
        assert_eq!(s.api.acquire_calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.store.statement_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_fiscal_year_excludes_document_instead_of_extracting() {
        let s = setup(vec![]);
        s.store.insert_company(Company::placeholder("E00001")).unwrap();
        let doc = s
            .pipeline
            .document_from_filing(date(), &filing("S100AAAA", Some("E00001")));
        s.store.insert_document(doc.clone()).unwrap();

        // records from a sibling filing already cover fiscal 2023
        s.store
            .insert_statement(StatementRecord {
                edinet_code: "E00001".to_string(),
                kind: StatementKind::BalanceSheet,
                subject_id: "7".to_string(),
                period_start: None,
                period_end: None,
                fiscal_year: Some(2023),
                value: Some(1),
                doc_id: "S100ZZZZ".to_string(),
                created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            })
            .unwrap();

        // decoded tree already on disk so no download happens
        let decoded = s.pipeline.decoded_dir_for(&doc);
        std::fs::create_dir_all(&decoded).unwrap();

        s.pipeline.process_document_id("S100AAAA").await.unwrap();

        let stored = s.store.document("S100AAAA").unwrap();
        assert!(stored.removed);
        // the guarded axis was skipped, not failed, and extraction stopped
        // with it: the removed document gets no further axes this pass
        assert_eq!(stored.scraped_balance_sheet, StatusCode::NotYet);
        assert_eq!(stored.scraped_income_statement, StatusCode::NotYet);
        assert_eq!(stored.scraped_share_count, StatusCode::NotYet);
        assert_eq!(s.api.acquire_calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.store.statement_count(), 1);
    }

    #[tokio::test]
    async fn three_hard_failures_permanently_exclude_the_document() {
        let s = setup(vec![]);
        s.store.insert_company(Company::placeholder("E00001")).unwrap();
        let doc = s
            .pipeline
            .document_from_filing(date(), &filing("S100AAAA", Some("E00001")));
        s.store.insert_document(doc.clone()).unwrap();

        // decoded tree exists but holds no matching fragments
        let decoded = s.pipeline.decoded_dir_for(&doc);
        std::fs::create_dir_all(&decoded).unwrap();

        s.pipeline.process_document_id("S100AAAA").await.unwrap();

        let stored = s.store.document("S100AAAA").unwrap();
        assert_eq!(stored.scraped_balance_sheet, StatusCode::Error);
        assert_eq!(stored.scraped_income_statement, StatusCode::Error);
        assert_eq!(stored.scraped_share_count, StatusCode::Error);
        assert!(stored.removed);

        // removed documents are never picked up again
        assert!(!stored.is_target());
    }

    #[test]
    fn price_rows_are_persisted_once_per_day_and_source() {
        let s = setup(vec![]);
        let row = crate::markets::models::DailyQuote {
            target_date: date(),
            opening_price: Some(2500.0),
            high_price: Some(2550.0),
            low_price: Some(2480.0),
            closing_price: Some(2530.0),
            volume: Some(1_200_000),
            adjusted_closing_price: Some(2530.0),
        };

        assert_eq!(s.pipeline.persist_price_rows("7203", vec![row.clone()]), 1);
        // a second import of the same day is a no-op
        assert_eq!(s.pipeline.persist_price_rows("7203", vec![row.clone()]), 0);
        // another company on the same day is its own row
        assert_eq!(s.pipeline.persist_price_rows("6758", vec![row]), 1);
        assert_eq!(s.store.price_count(), 2);
    }

    #[test]
    fn spot_quotes_persist_price_and_forecast_rows() {
        let s = setup(vec![]);
        let nikkei = NikkeiQuote {
            price: Some(2530.0),
            target_date: Some("2023/6/1".to_string()),
            opening_price: Some(2500.0),
            high_price: Some(2550.0),
            low_price: Some(2480.0),
            volume: Some(1_200_000),
            per: None,
            pbr: None,
        };
        assert_eq!(s.pipeline.persist_nikkei("7203", &nikkei), 1);
        // same day again: the uniqueness constraint keeps one row
        assert_eq!(s.pipeline.persist_nikkei("7203", &nikkei), 0);

        let minkabu = MinkabuQuote {
            price: Some(2531.0),
            target_date: Some("23/06/01".to_string()),
            goal_price: Some(2600.0),
            theoretical_price: Some(2580.0),
        };
        // same day, different source: its own price row
        assert_eq!(s.pipeline.persist_minkabu("7203", &minkabu), 1);
        assert_eq!(s.pipeline.persist_minkabu("7203", &minkabu), 0);

        let sources: Vec<String> = s
            .store
            .prices_for("7203")
            .into_iter()
            .map(|r| r.source)
            .collect();
        assert_eq!(sources, vec!["nikkei", "minkabu"]);
        assert_eq!(s.store.forecast_count(), 1);

        // a quote without a readable date is not stored
        let undated = NikkeiQuote {
            target_date: None,
            ..nikkei
        };
        assert_eq!(s.pipeline.persist_nikkei("7203", &undated), 0);
        assert_eq!(s.store.price_count(), 2);
    }

    #[tokio::test]
    async fn extraction_persists_matched_subjects_and_supplements_fixed_liabilities() {
        let s = setup(vec![]);
        s.store.insert_company(Company::placeholder("E00001")).unwrap();
        let doc = s
            .pipeline
            .document_from_filing(date(), &filing("S100AAAA", Some("E00001")));
        s.store.insert_document(doc.clone()).unwrap();

        let decoded = s.pipeline.decoded_dir_for(&doc);
        std::fs::create_dir_all(&decoded).unwrap();
        std::fs::write(
            decoded.join("0105010_honbun_x.htm"),
            r#"<html><body><div name="jpcrp_cor:ConsolidatedBalanceSheetTextBlock"><table>
                <tr><td>（単位：百万円）</td></tr>
                <tr><td> </td><td>前連結会計年度</td><td>当連結会計年度</td></tr>
                <tr><td>流動負債合計</td><td>400</td><td>500</td></tr>
                <tr><td>負債合計</td><td>400</td><td>500</td></tr>
            </table></div></body></html>"#,
        )
        .unwrap();

        s.pipeline.process_document_id("S100AAAA").await.unwrap();

        let stored = s.store.document("S100AAAA").unwrap();
        assert_eq!(stored.scraped_balance_sheet, StatusCode::Done);
        assert!(stored.balance_sheet_path.is_some());
        assert_eq!(
            s.store
                .statement_value("S100AAAA", StatementKind::BalanceSheet, BS_TOTAL_CURRENT_LIABILITIES),
            Some(500_000_000)
        );
        // current == total and no fixed-liabilities line: zero recorded
        assert_eq!(
            s.store
                .statement_value("S100AAAA", StatementKind::BalanceSheet, BS_TOTAL_FIXED_LIABILITIES),
            Some(0)
        );
    }
}
