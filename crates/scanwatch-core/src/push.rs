//! Server-initiated status notifications.

use futures::{Stream, StreamExt};
use scanwatch_protocol::StatusUpdateEvent;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::SyncError;
use crate::snapshot::{InvoiceStatusSnapshot, SnapshotSource, checked_progress};
use crate::store::StatusStore;

/// Turns push events into store candidates.
///
/// Events are stamped with the store clock when they arrive. Fields an event
/// leaves out are carried over from the stored snapshot, so a status-only
/// frame never wipes progress or the event log.
#[derive(Clone)]
pub struct PushChannelAdapter {
    store: StatusStore,
}

/// Totals for one [`PushChannelAdapter::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushRunStats {
    pub frames: u64,
    pub applied: u64,
    pub malformed: u64,
}

impl PushChannelAdapter {
    pub fn new(store: StatusStore) -> Self {
        Self { store }
    }

    /// Apply one event. Returns whether the visible state changed.
    pub fn apply(&self, event: StatusUpdateEvent) -> bool {
        let invoice_id = event.invoice_id;
        match self.try_apply(event) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(
                    event = "core.push.event_rejected",
                    invoice_id = %invoice_id,
                    error = %e,
                );
                false
            }
        }
    }

    pub fn try_apply(&self, event: StatusUpdateEvent) -> Result<bool, SyncError> {
        let observed_at = self.store.clock().tick();

        let Some(current) = self.store.get(event.invoice_id) else {
            debug!(event = "core.push.event_unwatched", invoice_id = %event.invoice_id);
            return Ok(false);
        };

        let progress = match event.progress {
            Some(raw) => checked_progress(raw)?,
            None => current.progress,
        };

        let candidate = InvoiceStatusSnapshot {
            invoice_id: event.invoice_id,
            status: event.status,
            message: event.message.unwrap_or(current.message),
            progress,
            log_events: event.log_events.unwrap_or(current.log_events),
            observed_at,
            source: SnapshotSource::Push,
            received_at: chrono::Utc::now(),
        };

        self.store.try_upsert(candidate)
    }

    /// Parse and apply one JSON frame.
    pub fn apply_frame(&self, frame: &str) -> Result<bool, SyncError> {
        let event: StatusUpdateEvent = serde_json::from_str(frame)
            .map_err(|e| SyncError::malformed(format!("unreadable push frame: {e}")))?;
        self.try_apply(event)
    }

    /// Feed frames into the store until the stream ends or `cancel` fires.
    ///
    /// Malformed frames are logged and skipped.
    pub async fn run<S>(&self, frames: S, cancel: CancellationToken) -> PushRunStats
    where
        S: Stream<Item = String>,
    {
        let mut stats = PushRunStats::default();
        futures::pin_mut!(frames);

        info!(event = "core.push.feed_started");

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = frames.next() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if frame.trim().is_empty() {
                continue;
            }
            stats.frames += 1;

            match self.apply_frame(&frame) {
                Ok(true) => stats.applied += 1,
                Ok(false) => {}
                Err(e) => {
                    stats.malformed += 1;
                    warn!(event = "core.push.frame_malformed", error = %e);
                }
            }
        }

        info!(
            event = "core.push.feed_stopped",
            frames = stats.frames,
            applied = stats.applied,
            malformed = stats.malformed,
        );
        stats
    }
}
