// src/edinet/models.rs
use serde::Deserialize;

/// Which shape of the document list endpoint to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Metadata only: just the result count for the day.
    MetadataOnly,
    /// Metadata plus the full filing results array.
    Full,
}

impl ListMode {
    pub fn query_type(&self) -> &'static str {
        match self {
            ListMode::MetadataOnly => "1",
            ListMode::Full => "2",
        }
    }
}

/// Top-level response from the document list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EdinetResponse {
    pub metadata: Metadata,
    #[serde(default)]
    pub results: Vec<FilingResult>,
}

impl EdinetResponse {
    /// Filing count for the requested day, as reported by the metadata.
    pub fn result_count(&self) -> &str {
        &self.metadata.resultset.count
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub resultset: ResultSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultSet {
    // the API reports the count as a string
    pub count: String,
}

/// One filing entry from the list endpoint. Field names follow the API's
/// JSON keys; most are nullable upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingResult {
    #[serde(rename = "docID")]
    pub doc_id: String,
    #[serde(rename = "edinetCode")]
    pub edinet_code: Option<String>,
    #[serde(rename = "filerName")]
    pub filer_name: Option<String>,
    #[serde(rename = "docTypeCode")]
    pub doc_type_code: Option<String>,
    #[serde(rename = "parentDocID")]
    pub parent_doc_id: Option<String>,
    #[serde(rename = "periodStart")]
    pub period_start: Option<String>,
    #[serde(rename = "periodEnd")]
    pub period_end: Option<String>,
    #[serde(rename = "docDescription")]
    pub doc_description: Option<String>,
}
