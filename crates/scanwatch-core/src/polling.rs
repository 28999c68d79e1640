//! Background polling, one loop per watched invoice.
//!
//! Loops are reference counted through [`PollLease`]s: the first lease for
//! an id dispatches an initial fetch and starts the loop, later leases share
//! it, and dropping the last one cancels both the loop and any fetch still
//! in flight. At most one fetch per id is outstanding at any time; ticks
//! that find one running are skipped and counted, and explicit fetches join
//! it instead of issuing a second request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use scanwatch_config::PollingConfig;
use scanwatch_protocol::InvoiceId;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::SyncError;
use crate::fetcher::StatusFetcher;
use crate::snapshot::{InvoiceStatusSnapshot, ObservedAt, SnapshotSource};
use crate::store::StatusStore;

/// Result of one fetch, shared by every caller coalesced onto it.
///
/// Poll snapshots are stamped at dispatch, so a response that already
/// reflects server state newer than a push received meanwhile is dropped
/// as stale; the next tick picks that state up.
pub type FetchOutcome = Result<InvoiceStatusSnapshot, SyncError>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Counters for one polling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    /// Requests dispatched, initial and explicit ones included.
    pub fetches: u64,
    /// Ticks that found a fetch still outstanding.
    pub skipped_ticks: u64,
    pub failures: u64,
}

/// Fetch progress of one invoice as seen by views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchState {
    /// An explicit fetch (initial or requested) is outstanding.
    pub loading: bool,
    /// Most recent fetch error; cleared by the next success.
    pub error: Option<SyncError>,
    pub stats: PollStats,
}

struct InFlight {
    generation: u64,
    explicit: bool,
    fetch: SharedFetch,
}

struct PollEntry {
    leases: usize,
    loop_id: u64,
    cancel: CancellationToken,
    in_flight: Option<InFlight>,
    state: watch::Sender<FetchState>,
}

struct DriverShared<F> {
    fetcher: Arc<F>,
    store: StatusStore,
    interval: Duration,
    fetch_timeout: Duration,
    entries: Mutex<HashMap<InvoiceId, PollEntry>>,
    generations: AtomicU64,
}

/// Keyed registry of polling loops feeding one [`StatusStore`].
pub struct PollingDriver<F> {
    shared: Arc<DriverShared<F>>,
}

impl<F> Clone for PollingDriver<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<F: StatusFetcher> PollingDriver<F> {
    pub fn new(fetcher: Arc<F>, store: StatusStore, config: &PollingConfig) -> Self {
        Self::with_timing(fetcher, store, config.interval(), config.fetch_timeout())
    }

    pub fn with_timing(
        fetcher: Arc<F>,
        store: StatusStore,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(DriverShared {
                fetcher,
                store,
                // tokio's interval rejects a zero period
                interval: interval.max(Duration::from_millis(1)),
                fetch_timeout,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(1),
            }),
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.shared.store
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Claim the polling loop for `invoice_id`, starting it if needed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn lease(&self, invoice_id: InvoiceId) -> PollLease<F> {
        let mut entries = self.shared.lock_entries();

        let state = match entries.get_mut(&invoice_id) {
            Some(entry) => {
                entry.leases += 1;
                debug!(
                    event = "core.polling.lease_shared",
                    invoice_id = %invoice_id,
                    leases = entry.leases,
                );
                entry.state.subscribe()
            }
            None => {
                let loop_id = self.shared.next_generation();
                let cancel = CancellationToken::new();
                let (state, _) = watch::channel(FetchState::default());
                let mut entry = PollEntry {
                    leases: 1,
                    loop_id,
                    cancel: cancel.clone(),
                    in_flight: None,
                    state,
                };

                self.shared.dispatch(invoice_id, &mut entry, true);
                let state = entry.state.subscribe();
                entries.insert(invoice_id, entry);

                tokio::spawn(run_poll_loop(
                    Arc::downgrade(&self.shared),
                    invoice_id,
                    loop_id,
                    cancel,
                    self.shared.interval,
                ));

                info!(
                    event = "core.polling.loop_started",
                    invoice_id = %invoice_id,
                    interval_ms = self.shared.interval.as_millis() as u64,
                );
                state
            }
        };

        PollLease {
            driver: Arc::downgrade(&self.shared),
            invoice_id,
            state,
            active: true,
        }
    }

    /// Fetch now, or join the fetch already outstanding for this id.
    ///
    /// The id must be leased; the outcome is applied to the store before it
    /// is returned.
    pub async fn fetch_now(&self, invoice_id: InvoiceId) -> FetchOutcome {
        let fetch = {
            let mut entries = self.shared.lock_entries();
            let Some(entry) = entries.get_mut(&invoice_id) else {
                return Err(SyncError::validation(format!(
                    "invoice {invoice_id} is not being polled"
                )));
            };

            match &mut entry.in_flight {
                Some(in_flight) => {
                    if !in_flight.explicit {
                        in_flight.explicit = true;
                        entry.state.send_modify(|state| state.loading = true);
                    }
                    debug!(event = "core.polling.fetch_coalesced", invoice_id = %invoice_id);
                    in_flight.fetch.clone()
                }
                None => self.shared.dispatch(invoice_id, entry, true),
            }
        };

        fetch.await
    }

    /// Watch fetch state for a leased id.
    pub fn state(&self, invoice_id: InvoiceId) -> Option<watch::Receiver<FetchState>> {
        self.shared
            .lock_entries()
            .get(&invoice_id)
            .map(|entry| entry.state.subscribe())
    }

    pub fn stats(&self, invoice_id: InvoiceId) -> Option<PollStats> {
        self.shared
            .lock_entries()
            .get(&invoice_id)
            .map(|entry| entry.state.borrow().stats)
    }

    pub fn is_polling(&self, invoice_id: InvoiceId) -> bool {
        self.shared.lock_entries().contains_key(&invoice_id)
    }

    /// Number of running loops.
    pub fn active_count(&self) -> usize {
        self.shared.lock_entries().len()
    }
}

impl<F: StatusFetcher> DriverShared<F> {
    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    /// Start a fetch for `entry` and record it as in flight.
    ///
    /// The observation time is taken here, at dispatch: a response that
    /// takes long to arrive must not override a push received meanwhile,
    /// even when it carries newer server state. That state waits for the
    /// next tick.
    fn dispatch(
        self: &Arc<Self>,
        invoice_id: InvoiceId,
        entry: &mut PollEntry,
        explicit: bool,
    ) -> SharedFetch {
        let generation = self.next_generation();
        let observed_at = self.store.clock().tick();

        let fetch = fetch_and_apply(
            Arc::downgrade(self),
            self.fetcher.clone(),
            self.store.clone(),
            FetchTicket {
                invoice_id,
                generation,
                observed_at,
                timeout: self.fetch_timeout,
                cancel: entry.cancel.clone(),
            },
        )
        .boxed()
        .shared();

        // Drive it even if every caller stops waiting.
        tokio::spawn(fetch.clone().map(drop));

        entry.in_flight = Some(InFlight {
            generation,
            explicit,
            fetch: fetch.clone(),
        });
        entry.state.send_modify(|state| {
            state.stats.fetches += 1;
            if explicit {
                state.loading = true;
            }
        });

        debug!(
            event = "core.polling.fetch_dispatched",
            invoice_id = %invoice_id,
            observed_at = observed_at.0,
            explicit,
        );
        fetch
    }

    /// Handle one interval tick. Returns false once the loop's entry is gone.
    fn on_tick(self: &Arc<Self>, invoice_id: InvoiceId, loop_id: u64) -> bool {
        let mut entries = self.lock_entries();
        let Some(entry) = entries
            .get_mut(&invoice_id)
            .filter(|entry| entry.loop_id == loop_id)
        else {
            return false;
        };

        if entry.in_flight.is_some() {
            entry
                .state
                .send_modify(|state| state.stats.skipped_ticks += 1);
            debug!(event = "core.polling.tick_skipped", invoice_id = %invoice_id);
        } else {
            self.dispatch(invoice_id, entry, false);
        }
        true
    }

    fn finish(&self, invoice_id: InvoiceId, generation: u64, outcome: &FetchOutcome) {
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(&invoice_id) else {
            return;
        };
        if entry.in_flight.as_ref().map(|f| f.generation) != Some(generation) {
            return;
        }
        entry.in_flight = None;

        entry.state.send_modify(|state| {
            state.loading = false;
            match outcome {
                Ok(_) => state.error = None,
                Err(SyncError::Cancelled) => {}
                Err(e) => {
                    state.error = Some(e.clone());
                    state.stats.failures += 1;
                }
            }
        });

        if let Err(e) = outcome {
            warn!(
                event = "core.polling.fetch_failed",
                invoice_id = %invoice_id,
                error = %e,
                error_code = e.error_code(),
            );
        }
    }

    fn release(&self, invoice_id: InvoiceId) {
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(&invoice_id) else {
            return;
        };
        entry.leases = entry.leases.saturating_sub(1);
        if entry.leases > 0 {
            return;
        }

        if let Some(entry) = entries.remove(&invoice_id) {
            entry.cancel.cancel();
            info!(
                event = "core.polling.loop_stopped",
                invoice_id = %invoice_id,
                fetches = entry.state.borrow().stats.fetches,
            );
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<InvoiceId, PollEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!(event = "core.polling.lock_poisoned");
                poisoned.into_inner()
            }
        }
    }
}

struct FetchTicket {
    invoice_id: InvoiceId,
    generation: u64,
    observed_at: ObservedAt,
    timeout: Duration,
    cancel: CancellationToken,
}

async fn fetch_and_apply<F: StatusFetcher>(
    driver: Weak<DriverShared<F>>,
    fetcher: Arc<F>,
    store: StatusStore,
    ticket: FetchTicket,
) -> FetchOutcome {
    let invoice_id = ticket.invoice_id;

    let outcome = tokio::select! {
        biased;
        _ = ticket.cancel.cancelled() => Err(SyncError::Cancelled),
        result = tokio::time::timeout(ticket.timeout, fetcher.fetch_once(invoice_id)) => match result {
            Ok(response) => response.and_then(|response| {
                InvoiceStatusSnapshot::from_response(
                    invoice_id,
                    response,
                    ticket.observed_at,
                    SnapshotSource::Poll,
                )
            }),
            Err(_) => Err(SyncError::transport(format!(
                "status request for invoice {invoice_id} timed out after {}ms",
                ticket.timeout.as_millis()
            ))),
        },
    };

    let outcome = match outcome {
        Ok(_) if ticket.cancel.is_cancelled() => {
            debug!(event = "core.polling.result_discarded", invoice_id = %invoice_id);
            Err(SyncError::Cancelled)
        }
        Ok(snapshot) => store.try_upsert(snapshot.clone()).map(|_| snapshot),
        Err(e) => Err(e),
    };

    if let Some(driver) = driver.upgrade() {
        driver.finish(invoice_id, ticket.generation, &outcome);
    }
    outcome
}

async fn run_poll_loop<F: StatusFetcher>(
    driver: Weak<DriverShared<F>>,
    invoice_id: InvoiceId,
    loop_id: u64,
    cancel: CancellationToken,
    period: Duration,
) {
    // The initial fetch was dispatched by `lease`.
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(driver) = driver.upgrade() else {
            break;
        };
        if !driver.on_tick(invoice_id, loop_id) {
            break;
        }
    }

    debug!(event = "core.polling.loop_exited", invoice_id = %invoice_id);
}

/// A claim on one polling loop. Dropping the last lease for an id stops it.
pub struct PollLease<F: StatusFetcher> {
    driver: Weak<DriverShared<F>>,
    invoice_id: InvoiceId,
    state: watch::Receiver<FetchState>,
    active: bool,
}

impl<F: StatusFetcher> PollLease<F> {
    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    /// Fetch state of the leased loop.
    pub fn state(&self) -> &watch::Receiver<FetchState> {
        &self.state
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(driver) = self.driver.upgrade() {
            driver.release(self.invoice_id);
        }
    }
}

impl<F: StatusFetcher> Drop for PollLease<F> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
