// src/edinet/client.rs
use crate::edinet::models::{EdinetResponse, ListMode};
use crate::edinet::FilingApi;
use crate::resilience::UpstreamRegistry;
use crate::utils::error::{AppError, ClientError};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const UPSTREAM: &str = "edinet";
const USER_AGENT: &str = "edinet_extractor/0.1 (research tool)";

/// Client for the EDINET document API: the daily filing list and the
/// filing archive download. Every request goes through the shared
/// retry/breaker/limiter policy for the "edinet" upstream.
pub struct EdinetClient {
    http: reqwest::Client,
    base_url: String,
    registry: Arc<UpstreamRegistry>,
}

impl EdinetClient {
    pub fn new(base_url: &str, registry: Arc<UpstreamRegistry>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            registry,
        })
    }

    /// Sends a GET and classifies the outcome: transport failures are
    /// transient, 4xx is our fault and final, 5xx is the server's and
    /// retryable.
    async fn get(&self, url: &str) -> Result<reqwest::Response, ClientError> {
        let response = self.http.get(url).send().await.map_err(|e| {
            ClientError::TransientNetwork {
                upstream: UPSTREAM.to_string(),
                message: e.to_string(),
            }
        })?;
        classify_status(UPSTREAM, response.status())?;
        Ok(response)
    }
}

pub(crate) fn classify_status(
    upstream: &str,
    status: reqwest::StatusCode,
) -> Result<(), ClientError> {
    if status.is_client_error() {
        return Err(ClientError::ClientRequest {
            upstream: upstream.to_string(),
            status: status.as_u16(),
        });
    }
    if status.is_server_error() {
        return Err(ClientError::UpstreamServer {
            upstream: upstream.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[async_trait]
impl FilingApi for EdinetClient {
    async fn list(&self, date: NaiveDate, mode: ListMode) -> Result<EdinetResponse, ClientError> {
        let url = format!(
            "{}/api/v1/documents.json?date={}&type={}",
            self.base_url,
            date.format("%Y-%m-%d"),
            mode.query_type()
        );
        tracing::debug!("fetching filing list: {}", url);

        self.registry
            .upstream(UPSTREAM)
            .call(|| async {
                let response = self.get(&url).await?;
                response
                    .json::<EdinetResponse>()
                    .await
                    .map_err(|e| ClientError::Parse {
                        upstream: UPSTREAM.to_string(),
                        message: format!("invalid filing list body: {}", e),
                    })
            })
            .await
    }

    async fn acquire(&self, doc_id: &str, dest_dir: &Path) -> Result<PathBuf, AppError> {
        let url = format!("{}/api/v1/documents/{}?type=1", self.base_url, doc_id);
        tracing::debug!("downloading filing archive: {}", url);

        let bytes = self
            .registry
            .upstream(UPSTREAM)
            .call(|| async {
                let response = self.get(&url).await?;
                response
                    .bytes()
                    .await
                    .map_err(|e| ClientError::TransientNetwork {
                        upstream: UPSTREAM.to_string(),
                        message: format!("archive body read failed: {}", e),
                    })
            })
            .await?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!("{}.zip", doc_id));
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!("saved filing archive {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::breaker::BreakerConfig;
    use crate::resilience::RetryPolicy;
    use crate::utils::clock::SystemClock;

    fn test_registry(max_attempts: u32) -> Arc<UpstreamRegistry> {
        Arc::new(UpstreamRegistry::new(
            RetryPolicy {
                max_attempts,
                backoff: Duration::from_millis(0),
            },
            BreakerConfig::default(),
            None,
            Arc::new(SystemClock),
        ))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn list_parses_filing_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/documents.json?date=2023-06-01&type=2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"metadata":{"resultset":{"count":"1"}},
                    "results":[{"docID":"S100ABCD","edinetCode":"E00001",
                    "filerName":"Example Industries","docTypeCode":"120",
                    "parentDocID":null,"periodStart":"2022-04-01",
                    "periodEnd":"2023-03-31","docDescription":"Annual report"}]}"#,
            )
            .create_async()
            .await;

        let client = EdinetClient::new(&server.url(), test_registry(1)).unwrap();
        let response = client.list(date(), ListMode::Full).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.result_count(), "1");
        assert_eq!(response.results[0].doc_id, "S100ABCD");
    }

    #[tokio::test]
    async fn list_maps_404_to_client_error_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/documents.json?date=2023-06-01&type=1")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = EdinetClient::new(&server.url(), test_registry(3)).unwrap();
        let err = client.list(date(), ListMode::MetadataOnly).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ClientError::ClientRequest { status: 404, .. }));
    }

    #[tokio::test]
    async fn list_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/documents.json?date=2023-06-01&type=1")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = EdinetClient::new(&server.url(), test_registry(2)).unwrap();
        let err = client.list(date(), ListMode::MetadataOnly).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ClientError::UpstreamServer { status: 503, .. }));
    }

    #[tokio::test]
    async fn acquire_writes_archive_to_destination() {
        let mut server = mockito::Server::new_async().await;
        let payload = b"PK\x03\x04fake-zip-bytes".to_vec();
        let mock = server
            .mock("GET", "/api/v1/documents/S100ABCD?type=1")
            .with_status(200)
            .with_body(payload.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = EdinetClient::new(&server.url(), test_registry(1)).unwrap();
        let path = client.acquire("S100ABCD", dir.path()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(path, dir.path().join("S100ABCD.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }
}
