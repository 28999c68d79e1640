use serde::{Deserialize, Serialize};

/// Backend identifier of an invoice. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct InvoiceId(i64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invoice id must be a positive integer, got {0}")]
pub struct InvalidInvoiceId(pub i64);

impl InvoiceId {
    pub fn new(raw: i64) -> Result<Self, InvalidInvoiceId> {
        if raw <= 0 {
            return Err(InvalidInvoiceId(raw));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for InvoiceId {
    type Error = InvalidInvoiceId;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<InvoiceId> for i64 {
    fn from(id: InvoiceId) -> Self {
        id.0
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an invoice in the scanning pipeline.
///
/// `Pending` is the backend default for a freshly uploaded invoice and the
/// seed state the client uses before its first observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Processing,
    WaitingValidation,
    Processed,
    Failed,
    Rejected,
    Duplicated,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 7] = [
        InvoiceStatus::Pending,
        InvoiceStatus::Processing,
        InvoiceStatus::WaitingValidation,
        InvoiceStatus::Processed,
        InvoiceStatus::Failed,
        InvoiceStatus::Rejected,
        InvoiceStatus::Duplicated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Processing => "processing",
            InvoiceStatus::WaitingValidation => "waiting_validation",
            InvoiceStatus::Processed => "processed",
            InvoiceStatus::Failed => "failed",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Duplicated => "duplicated",
        }
    }

    /// Whether the pipeline is still working on the invoice.
    pub fn is_active(self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Processing)
    }

    /// Terminal from the client's point of view: no further change happens
    /// without human action or a new upload cycle.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Whether a retry may start a new processing cycle from this state.
    pub fn is_retryable(self) -> bool {
        matches!(self, InvoiceStatus::Failed | InvoiceStatus::Rejected)
    }

    /// Transition table of the pipeline.
    ///
    /// Staying in the same state is always legal (progress and log updates).
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;

        if self == next {
            return true;
        }
        match self {
            Pending => matches!(next, Processing | Failed | Duplicated),
            Processing => matches!(
                next,
                WaitingValidation | Processed | Failed | Rejected | Duplicated
            ),
            WaitingValidation => matches!(next, Processed | Rejected),
            Failed | Rejected => next == Processing,
            Processed | Duplicated => false,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown invoice status '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_id_rejects_non_positive() {
        assert_eq!(InvoiceId::new(0), Err(InvalidInvoiceId(0)));
        assert_eq!(InvoiceId::new(-3), Err(InvalidInvoiceId(-3)));
        assert_eq!(InvoiceId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn test_invoice_id_serializes_as_plain_integer() {
        let id = InvoiceId::new(42).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(serde_json::from_str::<InvoiceId>("42").unwrap(), id);
        assert!(serde_json::from_str::<InvoiceId>("0").is_err());
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&InvoiceStatus::WaitingValidation).unwrap();
        assert_eq!(json, r#""waiting_validation""#);
        for status in InvoiceStatus::ALL {
            let wire = format!("\"{}\"", status.as_str());
            let parsed: InvoiceStatus = serde_json::from_str(&wire).unwrap();
            assert_eq!(parsed, status);
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(serde_json::from_str::<InvoiceStatus>(r#""archived""#).is_err());
        assert!("archived".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_processing_fans_out() {
        for next in [
            InvoiceStatus::WaitingValidation,
            InvoiceStatus::Processed,
            InvoiceStatus::Failed,
            InvoiceStatus::Rejected,
            InvoiceStatus::Duplicated,
        ] {
            assert!(InvoiceStatus::Processing.can_transition_to(next), "{next}");
        }
        assert!(!InvoiceStatus::Processing.can_transition_to(InvoiceStatus::Pending));
    }

    #[test]
    fn test_waiting_validation_needs_human_outcome() {
        let from = InvoiceStatus::WaitingValidation;
        assert!(from.can_transition_to(InvoiceStatus::Processed));
        assert!(from.can_transition_to(InvoiceStatus::Rejected));
        assert!(!from.can_transition_to(InvoiceStatus::Processing));
        assert!(!from.can_transition_to(InvoiceStatus::Failed));
    }

    #[test]
    fn test_retry_cycle_restarts_processing() {
        assert!(InvoiceStatus::Failed.can_transition_to(InvoiceStatus::Processing));
        assert!(InvoiceStatus::Rejected.can_transition_to(InvoiceStatus::Processing));
        assert!(!InvoiceStatus::Processed.can_transition_to(InvoiceStatus::Processing));
        assert!(!InvoiceStatus::Duplicated.can_transition_to(InvoiceStatus::Processing));
    }

    #[test]
    fn test_self_transition_always_legal() {
        for status in InvoiceStatus::ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn test_active_and_terminal_partition() {
        assert!(InvoiceStatus::Processing.is_active());
        assert!(InvoiceStatus::Pending.is_active());
        assert!(InvoiceStatus::WaitingValidation.is_terminal());
        assert!(InvoiceStatus::Duplicated.is_terminal());
        assert!(InvoiceStatus::Failed.is_retryable());
        assert!(!InvoiceStatus::Processed.is_retryable());
    }
}
