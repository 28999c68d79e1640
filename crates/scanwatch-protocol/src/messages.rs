use serde::{Deserialize, Serialize};

use crate::types::{InvoiceId, InvoiceStatus};

/// Body of `GET /api/invoices/{id}/status`.
///
/// `progress` is kept as the raw integer so range violations surface as a
/// malformed response instead of a silent wrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub message: String,
    pub progress: i64,
    #[serde(default)]
    pub log_events: Vec<String>,
}

/// A status notification received on the push channel.
///
/// The channel's native frames are keyed by `id` and carry only the status
/// (plus the uploaded filename); richer frames may add the remaining fields
/// of [`StatusResponse`]. Missing fields are filled from the last known
/// snapshot by the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateEvent {
    #[serde(alias = "id")]
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_events: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl From<StatusResponse> for StatusUpdateEvent {
    fn from(response: StatusResponse) -> Self {
        Self {
            invoice_id: response.invoice_id,
            status: response.status,
            message: Some(response.message),
            progress: Some(response.progress),
            log_events: Some(response.log_events),
            filename: None,
        }
    }
}

/// Body of `POST /api/invoices/{id}/reject`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// Response of the retry and reject mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub message: String,
}
