use serde::Serialize;

use scanwatch_core::{InvoiceId, InvoiceStatusSnapshot, ViewState};

/// One line of `watch --json` output.
#[derive(Debug, Serialize)]
pub struct WatchEvent<'a> {
    pub invoice_id: InvoiceId,
    pub snapshot: Option<&'a InvoiceStatusSnapshot>,
    pub loading: bool,
    pub error: Option<String>,
    pub error_code: Option<&'static str>,
}

impl<'a> WatchEvent<'a> {
    pub fn from_state(invoice_id: InvoiceId, state: &'a ViewState) -> Self {
        Self {
            invoice_id,
            snapshot: state.status.as_ref(),
            loading: state.loading,
            error: state.error.as_ref().map(|e| e.to_string()),
            error_code: state.error.as_ref().map(|e| e.error_code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwatch_core::SyncError;

    #[test]
    fn test_watch_event_serializes_error_code() {
        let id = InvoiceId::new(3).unwrap();
        let state = ViewState {
            status: Some(InvoiceStatusSnapshot::seed(id)),
            loading: false,
            error: Some(SyncError::transport("backend down")),
        };
        let json = serde_json::to_value(WatchEvent::from_state(id, &state)).unwrap();
        assert_eq!(json["invoice_id"], 3);
        assert_eq!(json["snapshot"]["status"], "pending");
        assert_eq!(json["snapshot"]["source"], "seed");
        assert_eq!(json["error_code"], "TRANSPORT_ERROR");
    }
}
