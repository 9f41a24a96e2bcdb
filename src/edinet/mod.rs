// src/edinet/mod.rs
pub mod client;
pub mod models;

use crate::utils::error::{AppError, ClientError};
use async_trait::async_trait;
use chrono::NaiveDate;
use models::{EdinetResponse, ListMode};
use std::path::{Path, PathBuf};

/// The filing API surface the pipeline depends on. Production code uses
/// [`client::EdinetClient`]; pipeline tests substitute an in-memory fake.
#[async_trait]
pub trait FilingApi: Send + Sync {
    /// Lists filings submitted on `date`.
    async fn list(&self, date: NaiveDate, mode: ListMode) -> Result<EdinetResponse, ClientError>;

    /// Downloads the filing archive for `doc_id` into `dest_dir` and returns
    /// the path of the written zip.
    async fn acquire(&self, doc_id: &str, dest_dir: &Path) -> Result<PathBuf, AppError>;
}
