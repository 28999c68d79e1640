//! One-shot status retrieval.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use scanwatch_config::{BackendConfig, ScanwatchConfig};
use scanwatch_protocol::{InvoiceId, StatusResponse};
use tracing::{debug, warn};

use crate::errors::SyncError;
use crate::snapshot::checked_progress;

/// Retrieves the current status of one invoice.
///
/// A single attempt: no retry, no caching, no store mutation. Retrying is
/// the polling loop's job.
pub trait StatusFetcher: Send + Sync + 'static {
    fn fetch_once(
        &self,
        invoice_id: InvoiceId,
    ) -> impl Future<Output = Result<StatusResponse, SyncError>> + Send;
}

/// [`StatusFetcher`] for `GET <base>/api/invoices/{id}/status`.
#[derive(Debug, Clone)]
pub struct HttpStatusFetcher {
    client: reqwest::Client,
    backend: BackendConfig,
}

impl HttpStatusFetcher {
    pub fn new(backend: BackendConfig, timeout: Duration) -> Result<Self, SyncError> {
        Ok(Self {
            client: build_client(timeout)?,
            backend,
        })
    }

    pub fn from_config(config: &ScanwatchConfig) -> Result<Self, SyncError> {
        Self::new(config.backend.clone(), config.polling.fetch_timeout())
    }

    pub fn status_url(&self, invoice_id: InvoiceId) -> String {
        self.backend
            .api_url(&format!("api/invoices/{invoice_id}/status"))
    }
}

impl StatusFetcher for HttpStatusFetcher {
    async fn fetch_once(&self, invoice_id: InvoiceId) -> Result<StatusResponse, SyncError> {
        let url = self.status_url(invoice_id);
        debug!(event = "core.fetcher.fetch_started", invoice_id = %invoice_id, url = %url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(
                event = "core.fetcher.request_failed",
                invoice_id = %invoice_id,
                error = %e,
            );
            SyncError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event = "core.fetcher.http_error",
                invoice_id = %invoice_id,
                status = status.as_u16(),
            );
            return Err(status_error(status));
        }

        let body = response.text().await?;
        let parsed = parse_status_body(invoice_id, &body)?;

        debug!(
            event = "core.fetcher.fetch_completed",
            invoice_id = %invoice_id,
            status = %parsed.status,
            progress = parsed.progress,
        );
        Ok(parsed)
    }
}

/// Parse and validate a status endpoint body for `requested`.
pub fn parse_status_body(requested: InvoiceId, body: &str) -> Result<StatusResponse, SyncError> {
    let parsed: StatusResponse = serde_json::from_str(body)
        .map_err(|e| SyncError::malformed(format!("unexpected status body: {e}")))?;

    if parsed.invoice_id != requested {
        return Err(SyncError::malformed(format!(
            "asked for invoice {} but response describes invoice {}",
            requested, parsed.invoice_id
        )));
    }
    checked_progress(parsed.progress)?;

    Ok(parsed)
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, SyncError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::transport(format!("failed to build HTTP client: {e}")))
}

/// Transport error for a non-2xx response.
pub(crate) fn status_error(status: StatusCode) -> SyncError {
    let message = match status.as_u16() {
        400 => "Bad request: the server could not understand the request".to_string(),
        401 => "Unauthorized: authentication is required".to_string(),
        403 => "Forbidden: you do not have permission to access this resource".to_string(),
        404 => "Not found: the requested resource could not be found".to_string(),
        500 => "Server error: the server encountered an unexpected condition".to_string(),
        503 => {
            "Service unavailable: the server is temporarily unable to handle the request"
                .to_string()
        }
        other => format!("Request failed with status {other}"),
    };
    SyncError::transport(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwatch_protocol::InvoiceStatus;

    fn id(raw: i64) -> InvoiceId {
        InvoiceId::new(raw).unwrap()
    }

    #[test]
    fn test_status_url_joins_with_single_slash() {
        let backend = BackendConfig {
            url: Some("https://invoices.example.com/".to_string()),
            ..Default::default()
        };
        let fetcher = HttpStatusFetcher::new(backend, Duration::from_secs(1)).unwrap();
        assert_eq!(
            fetcher.status_url(id(42)),
            "https://invoices.example.com/api/invoices/42/status"
        );
    }

    #[test]
    fn test_status_url_defaults_to_local_backend() {
        let fetcher =
            HttpStatusFetcher::new(BackendConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            fetcher.status_url(id(7)),
            "http://localhost:8010/api/invoices/7/status"
        );
    }

    #[test]
    fn test_parse_status_body_accepts_valid_body() {
        let body = r#"{"invoice_id":42,"status":"processing","message":"OCR","progress":45,"log_events":["uploaded"]}"#;
        let parsed = parse_status_body(id(42), body).unwrap();
        assert_eq!(parsed.status, InvoiceStatus::Processing);
        assert_eq!(parsed.progress, 45);
    }

    #[test]
    fn test_parse_status_body_rejects_bad_bodies() {
        let cases = [
            ("<html>oops</html>", "not json"),
            (r#"{"invoice_id":42}"#, "missing fields"),
            (
                r#"{"invoice_id":42,"status":"exploded","progress":1}"#,
                "unknown status",
            ),
            (
                r#"{"invoice_id":42,"status":"processing","progress":101}"#,
                "progress over 100",
            ),
            (
                r#"{"invoice_id":43,"status":"processing","progress":1}"#,
                "other invoice",
            ),
        ];
        for (body, why) in cases {
            let err = parse_status_body(id(42), body).unwrap_err();
            assert_eq!(err.error_code(), "MALFORMED_RESPONSE", "case: {why}");
        }
    }

    #[test]
    fn test_status_error_messages() {
        let cases = [
            (StatusCode::NOT_FOUND, "Not found"),
            (StatusCode::UNAUTHORIZED, "Unauthorized"),
            (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable"),
            (StatusCode::IM_A_TEAPOT, "Request failed with status 418"),
        ];
        for (status, expected) in cases {
            let err = status_error(status);
            assert_eq!(err.error_code(), "TRANSPORT_ERROR");
            assert!(
                err.to_string().contains(expected),
                "{status}: {err}"
            );
        }
    }
}
