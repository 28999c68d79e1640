use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use scanwatch_protocol::{InvoiceId, InvoiceStatus, StatusResponse};
use serde::Serialize;

use crate::errors::SyncError;

/// Logical observation time. Only ever compared, never converted to a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct ObservedAt(pub u64);

/// Monotonic source of [`ObservedAt`] values shared by every producer.
///
/// Zero is reserved for seeded snapshots, so every real observation beats
/// the seed.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next observation time, strictly greater than every earlier one.
    pub fn tick(&self) -> ObservedAt {
        ObservedAt(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Latest value handed out (0 if none).
    pub fn current(&self) -> ObservedAt {
        ObservedAt(self.last.load(Ordering::SeqCst))
    }
}

/// Which channel produced a snapshot. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Seed,
    Poll,
    Push,
}

/// The state of one invoice as known at one observation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceStatusSnapshot {
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
    pub message: String,
    pub progress: u8,
    pub log_events: Vec<String>,
    pub observed_at: ObservedAt,
    pub source: SnapshotSource,
    pub received_at: DateTime<Utc>,
}

impl InvoiceStatusSnapshot {
    /// Placeholder held from first subscribe until the first observation.
    pub fn seed(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id,
            status: InvoiceStatus::Pending,
            message: String::new(),
            progress: 0,
            log_events: Vec::new(),
            observed_at: ObservedAt(0),
            source: SnapshotSource::Seed,
            received_at: Utc::now(),
        }
    }

    /// Build a snapshot from a status endpoint body.
    ///
    /// Rejects progress outside `0..=100` and bodies describing a different
    /// invoice than the one requested.
    pub fn from_response(
        requested: InvoiceId,
        response: StatusResponse,
        observed_at: ObservedAt,
        source: SnapshotSource,
    ) -> Result<Self, SyncError> {
        if response.invoice_id != requested {
            return Err(SyncError::malformed(format!(
                "asked for invoice {} but response describes invoice {}",
                requested, response.invoice_id
            )));
        }
        Ok(Self {
            invoice_id: response.invoice_id,
            status: response.status,
            message: response.message,
            progress: checked_progress(response.progress)?,
            log_events: response.log_events,
            observed_at,
            source,
            received_at: Utc::now(),
        })
    }

    /// Whether two snapshots differ in anything a consumer would display.
    pub fn visibly_differs(&self, other: &Self) -> bool {
        self.status != other.status
            || self.progress != other.progress
            || self.message != other.message
            || self.log_events != other.log_events
    }
}

pub(crate) fn checked_progress(raw: i64) -> Result<u8, SyncError> {
    u8::try_from(raw)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| SyncError::malformed(format!("progress {raw} is outside 0..=100")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i64) -> InvoiceId {
        InvoiceId::new(raw).unwrap()
    }

    fn response(invoice_id: i64, progress: i64) -> StatusResponse {
        StatusResponse {
            invoice_id: id(invoice_id),
            status: InvoiceStatus::Processing,
            message: "working".to_string(),
            progress,
            log_events: vec!["uploaded".to_string()],
        }
    }

    #[test]
    fn test_clock_is_strictly_increasing() {
        let clock = LogicalClock::new();
        assert_eq!(clock.current(), ObservedAt(0));
        let a = clock.tick();
        let b = clock.tick();
        assert!(a > ObservedAt(0));
        assert!(b > a);
        assert_eq!(clock.current(), b);
    }

    #[test]
    fn test_seed_loses_to_any_observation() {
        let seed = InvoiceStatusSnapshot::seed(id(1));
        assert_eq!(seed.status, InvoiceStatus::Pending);
        assert_eq!(seed.source, SnapshotSource::Seed);
        assert!(LogicalClock::new().tick() > seed.observed_at);
    }

    #[test]
    fn test_from_response_checks_invoice_id() {
        let err = InvoiceStatusSnapshot::from_response(
            id(1),
            response(2, 10),
            ObservedAt(1),
            SnapshotSource::Poll,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_RESPONSE");
    }

    #[test]
    fn test_from_response_checks_progress_range() {
        for bad in [-1, 101, 300] {
            let result = InvoiceStatusSnapshot::from_response(
                id(1),
                response(1, bad),
                ObservedAt(1),
                SnapshotSource::Poll,
            );
            assert!(result.is_err(), "progress {bad} should be rejected");
        }
        let ok = InvoiceStatusSnapshot::from_response(
            id(1),
            response(1, 100),
            ObservedAt(1),
            SnapshotSource::Poll,
        )
        .unwrap();
        assert_eq!(ok.progress, 100);
    }

    #[test]
    fn test_visibly_differs_ignores_bookkeeping() {
        let a = InvoiceStatusSnapshot::seed(id(1));
        let mut b = a.clone();
        b.observed_at = ObservedAt(9);
        b.source = SnapshotSource::Push;
        assert!(!a.visibly_differs(&b));

        b.progress = 5;
        assert!(a.visibly_differs(&b));
    }
}
