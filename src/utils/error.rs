// src/utils/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the outbound HTTP layer (EDINET API and the stock-price
/// hosts). Every variant carries the upstream name so that callers and the
/// circuit breaker can branch on classification instead of raw transport
/// errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{upstream}: transport failure: {message}")]
    TransientNetwork { upstream: String, message: String },

    #[error("{upstream}: server error status {status}")]
    UpstreamServer { upstream: String, status: u16 },

    #[error("{upstream}: request rejected with status {status}")]
    ClientRequest { upstream: String, status: u16 },

    #[error("{upstream}: circuit breaker is open")]
    CircuitOpen { upstream: String },

    #[error("{upstream}: rate limit exhausted")]
    RateLimited { upstream: String },

    #[error("{upstream}: failed to parse response: {message}")]
    Parse { upstream: String, message: String },
}

impl ClientError {
    pub fn upstream(&self) -> &str {
        match self {
            ClientError::TransientNetwork { upstream, .. }
            | ClientError::UpstreamServer { upstream, .. }
            | ClientError::ClientRequest { upstream, .. }
            | ClientError::CircuitOpen { upstream }
            | ClientError::RateLimited { upstream }
            | ClientError::Parse { upstream, .. } => upstream,
        }
    }

    /// Transient failures are worth another attempt; 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::TransientNetwork { .. } | ClientError::UpstreamServer { .. }
        )
    }

    /// Only failures that indicate a sick upstream count toward opening the
    /// breaker. Client-caused 4xx errors do not.
    pub fn is_breaker_worthy(&self) -> bool {
        matches!(
            self,
            ClientError::TransientNetwork { .. } | ClientError::UpstreamServer { .. }
        )
    }
}

/// Errors raised by the table-extraction engine.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// No candidate file matched the keyword. Soft: the caller proceeds with
    /// absent data.
    #[error("no fragment matched keyword '{keyword}'")]
    NotFound { keyword: String },

    /// More than one candidate file matched. The layout is not
    /// self-consistent and must not be guessed.
    #[error("keyword '{keyword}' matched {} files: {candidates:?}", candidates.len())]
    Ambiguous {
        keyword: String,
        candidates: Vec<PathBuf>,
    },

    #[error("no amount-unit marker found in {path}")]
    UnknownUnit { path: PathBuf },

    #[error("unrecognized table layout in {path}: {detail}")]
    MalformedLayout { path: PathBuf, detail: String },

    #[error("I/O error reading fragment: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Soft failures let the surrounding document continue with partial data.
    pub fn is_soft(&self) -> bool {
        matches!(self, ExtractError::NotFound { .. })
    }
}

/// Typed conditions surfaced by the persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    DuplicateKey(String),

    #[error("referential integrity violated: {0}")]
    ForeignKey(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream call failed: {0}")]
    Client(#[from] ClientError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Archive error: {0}")]
    Archive(String),
}
