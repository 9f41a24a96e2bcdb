// src/store/memory.rs
use crate::markets::models::{ForecastRecord, StockPriceRecord};
use crate::registry::{Document, StatementKind};
use crate::store::{default_subjects, Company, StatementRecord, StatementSubject, Store};
use crate::utils::error::StoreError;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    companies: HashMap<String, Company>,
    documents: HashMap<String, Document>,
    statements: Vec<StatementRecord>,
    prices: Vec<StockPriceRecord>,
    forecasts: Vec<ForecastRecord>,
}

/// In-memory [`Store`] with the same constraint behavior as a relational
/// backend. A single mutex is enough here: every operation is a short
/// critical section with no I/O inside.
pub struct MemoryStore {
    subjects: Vec<StatementSubject>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            subjects: default_subjects(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn statement_count(&self) -> usize {
        self.inner.lock().unwrap().statements.len()
    }

    pub fn price_count(&self) -> usize {
        self.inner.lock().unwrap().prices.len()
    }

    pub fn forecast_count(&self) -> usize {
        self.inner.lock().unwrap().forecasts.len()
    }

    pub fn prices_for(&self, code: &str) -> Vec<StockPriceRecord> {
        self.inner
            .lock()
            .unwrap()
            .prices
            .iter()
            .filter(|r| r.code == code)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn insert_company(&self, company: Company) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.companies.contains_key(&company.edinet_code) {
            return Err(StoreError::DuplicateKey(format!(
                "company {}",
                company.edinet_code
            )));
        }
        inner.companies.insert(company.edinet_code.clone(), company);
        Ok(())
    }

    fn company_by_edinet_code(&self, edinet_code: &str) -> Option<Company> {
        self.inner.lock().unwrap().companies.get(edinet_code).cloned()
    }

    fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.documents.contains_key(&document.doc_id) {
            return Err(StoreError::DuplicateKey(format!(
                "document {}",
                document.doc_id
            )));
        }
        if let Some(edinet_code) = &document.edinet_code {
            if !inner.companies.contains_key(edinet_code) {
                return Err(StoreError::ForeignKey(format!(
                    "document {} references unknown company {}",
                    document.doc_id, edinet_code
                )));
            }
        }
        inner.documents.insert(document.doc_id.clone(), document);
        Ok(())
    }

    fn document(&self, doc_id: &str) -> Option<Document> {
        self.inner.lock().unwrap().documents.get(doc_id).cloned()
    }

    fn documents_for_date(&self, submit_date: NaiveDate) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .inner
            .lock()
            .unwrap()
            .documents
            .values()
            .filter(|d| d.submit_date == submit_date)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        docs
    }

    fn all_documents(&self) -> Vec<Document> {
        let mut docs: Vec<Document> =
            self.inner.lock().unwrap().documents.values().cloned().collect();
        docs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        docs
    }

    fn update_document(&self, document: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.documents.contains_key(&document.doc_id) {
            return Err(StoreError::NotFound(format!("document {}", document.doc_id)));
        }
        inner.documents.insert(document.doc_id.clone(), document);
        Ok(())
    }

    fn subject_by_label(&self, kind: StatementKind, label: &str) -> Option<StatementSubject> {
        self.subjects
            .iter()
            .find(|s| s.kind == kind && s.labels.iter().any(|l| l == label))
            .cloned()
    }

    fn insert_statement(&self, record: StatementRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner.statements.iter().any(|r| {
            r.edinet_code == record.edinet_code
                && r.kind == record.kind
                && r.subject_id == record.subject_id
                && r.fiscal_year == record.fiscal_year
        });
        if duplicate {
            return Err(StoreError::DuplicateKey(format!(
                "statement {}/{}/{} year {:?}",
                record.edinet_code,
                record.kind.id(),
                record.subject_id,
                record.fiscal_year
            )));
        }
        inner.statements.push(record);
        Ok(())
    }

    fn statement_value(
        &self,
        doc_id: &str,
        kind: StatementKind,
        subject_id: &str,
    ) -> Option<i64> {
        self.inner
            .lock()
            .unwrap()
            .statements
            .iter()
            .find(|r| r.doc_id == doc_id && r.kind == kind && r.subject_id == subject_id)
            .and_then(|r| r.value)
    }

    fn has_statements_for_year(
        &self,
        edinet_code: &str,
        kind: StatementKind,
        fiscal_year: Option<i32>,
    ) -> bool {
        self.inner.lock().unwrap().statements.iter().any(|r| {
            r.edinet_code == edinet_code && r.kind == kind && r.fiscal_year == fiscal_year
        })
    }

    fn insert_stock_price(&self, record: StockPriceRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner.prices.iter().any(|r| {
            r.code == record.code && r.target_date == record.target_date && r.source == record.source
        });
        if duplicate {
            return Err(StoreError::DuplicateKey(format!(
                "stock price {} {} {}",
                record.code, record.target_date, record.source
            )));
        }
        inner.prices.push(record);
        Ok(())
    }

    fn insert_forecast(&self, record: ForecastRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner
            .forecasts
            .iter()
            .any(|r| r.code == record.code && r.target_date == record.target_date);
        if duplicate {
            return Err(StoreError::DuplicateKey(format!(
                "forecast {} {}",
                record.code, record.target_date
            )));
        }
        inner.forecasts.push(record);
        Ok(())
    }
}
