//! Authoritative per-invoice status, merged from every producer.
//!
//! `upsert` is the single serialization point for polling and push: a
//! candidate wins only if its `observed_at` is strictly newer than the
//! stored one, whatever channel it came from and whatever order the calls
//! happen in. Entries exist only while someone is subscribed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use scanwatch_protocol::{InvoiceId, InvoiceStatus};
use tracing::{debug, error, info, warn};

use crate::errors::SyncError;
use crate::snapshot::{InvoiceStatusSnapshot, LogicalClock, SnapshotSource};

/// Callback run after a visible change. Runs outside the store lock.
pub type StatusListener = Arc<dyn Fn(&InvoiceStatusSnapshot) + Send + Sync>;

type ListenerId = u64;

struct Entry {
    snapshot: InvoiceStatusSnapshot,
    listeners: Vec<(ListenerId, StatusListener)>,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<InvoiceId, Entry>,
    next_listener_id: ListenerId,
}

/// Cloneable handle to one shared store.
#[derive(Clone)]
pub struct StatusStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<LogicalClock>,
    strict_transitions: bool,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(false)
    }
}

impl StatusStore {
    /// With `strict_transitions`, candidates whose status is not reachable
    /// from the stored one are rejected instead of applied with a warning.
    pub fn new(strict_transitions: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock: Arc::new(LogicalClock::new()),
            strict_transitions,
        }
    }

    /// Clock every producer stamps its observations with.
    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    pub fn get(&self, invoice_id: InvoiceId) -> Option<InvoiceStatusSnapshot> {
        self.lock()
            .entries
            .get(&invoice_id)
            .map(|entry| entry.snapshot.clone())
    }

    pub fn subscriber_count(&self, invoice_id: InvoiceId) -> usize {
        self.lock()
            .entries
            .get(&invoice_id)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Number of invoices currently held.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register interest in an invoice. Seeds a `pending` snapshot if this
    /// is the first subscriber.
    pub fn subscribe<L>(&self, invoice_id: InvoiceId, listener: L) -> StatusSubscription
    where
        L: Fn(&InvoiceStatusSnapshot) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let listener_id = state.next_listener_id;
        state.next_listener_id += 1;

        let entry = state.entries.entry(invoice_id).or_insert_with(|| {
            debug!(event = "core.store.entry_seeded", invoice_id = %invoice_id);
            Entry {
                snapshot: InvoiceStatusSnapshot::seed(invoice_id),
                listeners: Vec::new(),
            }
        });
        entry.listeners.push((listener_id, Arc::new(listener)));

        debug!(
            event = "core.store.subscribed",
            invoice_id = %invoice_id,
            subscribers = entry.listeners.len(),
        );

        StatusSubscription {
            store: self.clone(),
            invoice_id,
            listener_id,
            active: true,
        }
    }

    /// Merge a candidate snapshot. Returns whether the visible state changed.
    ///
    /// Rejections in strict mode are logged and reported as `false`.
    pub fn upsert(&self, candidate: InvoiceStatusSnapshot) -> bool {
        let invoice_id = candidate.invoice_id;
        match self.try_upsert(candidate) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(
                    event = "core.store.upsert_rejected",
                    invoice_id = %invoice_id,
                    error = %e,
                );
                false
            }
        }
    }

    /// Merge a candidate snapshot, reporting an illegal lifecycle transition
    /// as [`SyncError::MalformedResponse`] when strict mode is on.
    pub fn try_upsert(&self, candidate: InvoiceStatusSnapshot) -> Result<bool, SyncError> {
        let invoice_id = candidate.invoice_id;

        let (listeners, applied) = {
            let mut state = self.lock();
            let Some(entry) = state.entries.get_mut(&invoice_id) else {
                debug!(
                    event = "core.store.upsert_unwatched",
                    invoice_id = %invoice_id,
                    source = ?candidate.source,
                );
                return Ok(false);
            };

            let current = &entry.snapshot;
            if candidate.observed_at <= current.observed_at {
                debug!(
                    event = "core.store.upsert_stale",
                    invoice_id = %invoice_id,
                    source = ?candidate.source,
                    candidate_observed_at = candidate.observed_at.0,
                    stored_observed_at = current.observed_at.0,
                );
                return Ok(false);
            }

            if current.source != SnapshotSource::Seed
                && !current.status.can_transition_to(candidate.status)
            {
                if self.strict_transitions {
                    return Err(SyncError::malformed(format!(
                        "invoice {} cannot move from {} to {}",
                        invoice_id, current.status, candidate.status
                    )));
                }
                warn!(
                    event = "core.store.transition_unexpected",
                    invoice_id = %invoice_id,
                    from = %current.status,
                    to = %candidate.status,
                );
            }

            let merged = merge(current, candidate);
            let changed = current.visibly_differs(&merged);
            entry.snapshot = merged;

            if !changed {
                debug!(event = "core.store.upsert_unchanged", invoice_id = %invoice_id);
                return Ok(false);
            }

            info!(
                event = "core.store.upsert_applied",
                invoice_id = %invoice_id,
                status = %entry.snapshot.status,
                progress = entry.snapshot.progress,
                observed_at = entry.snapshot.observed_at.0,
                source = ?entry.snapshot.source,
            );

            let listeners: Vec<StatusListener> = entry
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();
            (listeners, entry.snapshot.clone())
        };

        for listener in listeners {
            listener(&applied);
        }

        Ok(true)
    }

    fn release(&self, invoice_id: InvoiceId, listener_id: ListenerId) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&invoice_id) else {
            return;
        };
        entry.listeners.retain(|(id, _)| *id != listener_id);

        if entry.listeners.is_empty() {
            state.entries.remove(&invoice_id);
            debug!(event = "core.store.entry_evicted", invoice_id = %invoice_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!(event = "core.store.lock_poisoned");
                poisoned.into_inner()
            }
        }
    }
}

/// Keep progress monotonic within a processing cycle and never shorten the
/// event log.
fn merge(
    current: &InvoiceStatusSnapshot,
    mut candidate: InvoiceStatusSnapshot,
) -> InvoiceStatusSnapshot {
    if current.status == InvoiceStatus::Processing
        && candidate.status == InvoiceStatus::Processing
        && candidate.progress < current.progress
    {
        candidate.progress = current.progress;
    }
    if candidate.log_events.len() < current.log_events.len() {
        candidate.log_events = current.log_events.clone();
    }
    candidate
}

/// Interest in one invoice. Dropping it unsubscribes.
pub struct StatusSubscription {
    store: StatusStore,
    invoice_id: InvoiceId,
    listener_id: ListenerId,
    active: bool,
}

impl StatusSubscription {
    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    /// Release the subscription; evicts the snapshot when it was the last one.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.store.release(self.invoice_id, self.listener_id);
        }
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
