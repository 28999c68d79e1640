//! Invoice mutations that restart or end processing.

use std::time::Duration;

use scanwatch_config::{BackendConfig, ScanwatchConfig};
use scanwatch_protocol::{ActionResponse, InvoiceId, RejectRequest};
use tracing::{info, warn};

use crate::errors::SyncError;
use crate::fetcher::{build_client, status_error};

/// Client for the retry, confirm and reject endpoints.
///
/// The backend enforces which states each action is valid from (retry from
/// `failed`/`rejected`, confirm from `waiting_validation`, reject from
/// `waiting_validation`, `processing` or `failed`) and answers with an HTTP
/// error otherwise.
#[derive(Debug, Clone)]
pub struct InvoiceActions {
    client: reqwest::Client,
    backend: BackendConfig,
}

impl InvoiceActions {
    pub fn new(backend: BackendConfig, timeout: Duration) -> Result<Self, SyncError> {
        Ok(Self {
            client: build_client(timeout)?,
            backend,
        })
    }

    pub fn from_config(config: &ScanwatchConfig) -> Result<Self, SyncError> {
        Self::new(config.backend.clone(), config.polling.fetch_timeout())
    }

    /// Send a failed or rejected invoice back through processing.
    pub async fn retry(&self, invoice_id: InvoiceId) -> Result<ActionResponse, SyncError> {
        let url = self
            .backend
            .api_url(&format!("api/invoices/{invoice_id}/retry"));
        info!(event = "core.actions.retry_started", invoice_id = %invoice_id);

        let response = self.client.post(&url).send().await?;
        self.finish("retry", invoice_id, response).await
    }

    /// Accept the extracted data of an invoice waiting for validation,
    /// finishing it as `processed`.
    pub async fn confirm(&self, invoice_id: InvoiceId) -> Result<ActionResponse, SyncError> {
        let url = self
            .backend
            .api_url(&format!("api/invoices/{invoice_id}/confirm"));
        info!(event = "core.actions.confirm_started", invoice_id = %invoice_id);

        let response = self.client.post(&url).send().await?;
        self.finish("confirm", invoice_id, response).await
    }

    /// Reject an invoice. `reason` must not be blank.
    pub async fn reject(
        &self,
        invoice_id: InvoiceId,
        reason: &str,
    ) -> Result<ActionResponse, SyncError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SyncError::validation("a rejection reason is required"));
        }

        let url = self
            .backend
            .api_url(&format!("api/invoices/{invoice_id}/reject"));
        info!(event = "core.actions.reject_started", invoice_id = %invoice_id);

        let response = self
            .client
            .post(&url)
            .json(&RejectRequest {
                reason: reason.to_string(),
            })
            .send()
            .await?;
        self.finish("reject", invoice_id, response).await
    }

    async fn finish(
        &self,
        action: &'static str,
        invoice_id: InvoiceId,
        response: reqwest::Response,
    ) -> Result<ActionResponse, SyncError> {
        let status = response.status();
        if !status.is_success() {
            warn!(
                event = "core.actions.failed",
                action,
                invoice_id = %invoice_id,
                status = status.as_u16(),
            );
            return Err(status_error(status));
        }

        let body = response.text().await?;
        let parsed: ActionResponse = serde_json::from_str(&body)
            .map_err(|e| SyncError::malformed(format!("unexpected {action} response: {e}")))?;

        info!(
            event = "core.actions.completed",
            action,
            invoice_id = %invoice_id,
            status = %parsed.status,
        );
        Ok(parsed)
    }
}
