//! Consumer-facing status views.
//!
//! [`StatusSync`] wires one store, one polling driver and the view pacing
//! together. Each [`StatusView`] holds a store subscription and a poll lease
//! for its invoice; dropping the view releases both.

use std::sync::Arc;

use scanwatch_config::ScanwatchConfig;
use scanwatch_protocol::InvoiceId;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::errors::SyncError;
use crate::fetcher::StatusFetcher;
use crate::polling::{FetchState, PollLease, PollingDriver};
use crate::push::PushChannelAdapter;
use crate::rate_limit::{Debouncer, RateLimit, Throttler};
use crate::snapshot::InvoiceStatusSnapshot;
use crate::store::{StatusStore, StatusSubscription};

/// What a view shows at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub status: Option<InvoiceStatusSnapshot>,
    pub loading: bool,
    pub error: Option<SyncError>,
}

impl ViewState {
    /// Whether a consumer would render the two states differently.
    /// Observation times and sources are ignored.
    pub fn visibly_differs(&self, other: &Self) -> bool {
        let status_differs = match (&self.status, &other.status) {
            (Some(a), Some(b)) => a.visibly_differs(b),
            (None, None) => false,
            _ => true,
        };
        status_differs || self.loading != other.loading || self.error != other.error
    }
}

/// Entry point for consumers: one store, one polling driver.
pub struct StatusSync<F: StatusFetcher> {
    store: StatusStore,
    driver: PollingDriver<F>,
    rate_limit: RateLimit,
}

impl<F: StatusFetcher> StatusSync<F> {
    pub fn new(config: &ScanwatchConfig, fetcher: Arc<F>) -> Self {
        let store = StatusStore::new(config.store.strict_transitions());
        let driver = PollingDriver::new(fetcher, store.clone(), &config.polling);
        Self {
            store,
            driver,
            rate_limit: RateLimit::from_config(&config.view),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn driver(&self) -> &PollingDriver<F> {
        &self.driver
    }

    pub fn push_adapter(&self) -> PushChannelAdapter {
        PushChannelAdapter::new(self.store.clone())
    }

    /// Open a view. `None` yields an idle view that touches nothing.
    ///
    /// Must be called inside a tokio runtime.
    pub fn view(&self, invoice_id: Option<InvoiceId>) -> StatusView<F> {
        match invoice_id {
            Some(invoice_id) => self.bind(invoice_id),
            None => StatusView::idle(),
        }
    }

    fn bind(&self, invoice_id: InvoiceId) -> StatusView<F> {
        let (limiter, emissions) = Limiter::new(self.rate_limit);
        let limiter = Arc::new(limiter);

        let listener_limiter = limiter.clone();
        let subscription = self
            .store
            .subscribe(invoice_id, move |_| listener_limiter.notify());
        let lease = self.driver.lease(invoice_id);

        let (changes_tx, changes) = watch::channel(ViewState {
            status: self.store.get(invoice_id),
            loading: lease.state().borrow().loading,
            error: lease.state().borrow().error.clone(),
        });

        let cancel = CancellationToken::new();
        tokio::spawn(forward_changes(
            ChangeFeed {
                invoice_id,
                store: self.store.clone(),
                fetch_state: lease.state().clone(),
                visible_fetch: VisibleFetch::of(&lease.state().borrow()),
                limiter,
                emissions,
                changes: changes_tx.clone(),
            },
            cancel.clone(),
        ));

        debug!(
            event = "core.view.opened",
            invoice_id = %invoice_id,
            rate_limit = ?self.rate_limit,
        );

        StatusView {
            invoice_id: Some(invoice_id),
            changes,
            _changes_tx: changes_tx,
            bound: Some(BoundView {
                store: self.store.clone(),
                driver: self.driver.clone(),
                _feed: cancel.drop_guard(),
                lease,
                _subscription: subscription,
            }),
        }
    }
}

struct BoundView<F: StatusFetcher> {
    store: StatusStore,
    driver: PollingDriver<F>,
    _feed: DropGuard,
    lease: PollLease<F>,
    _subscription: StatusSubscription,
}

/// Live status of at most one invoice.
pub struct StatusView<F: StatusFetcher> {
    invoice_id: Option<InvoiceId>,
    changes: watch::Receiver<ViewState>,
    _changes_tx: watch::Sender<ViewState>,
    bound: Option<BoundView<F>>,
}

impl<F: StatusFetcher> StatusView<F> {
    fn idle() -> Self {
        let (changes_tx, changes) = watch::channel(ViewState::default());
        Self {
            invoice_id: None,
            changes,
            _changes_tx: changes_tx,
            bound: None,
        }
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    /// Latest merged snapshot, unpaced.
    pub fn status(&self) -> Option<InvoiceStatusSnapshot> {
        let bound = self.bound.as_ref()?;
        bound.store.get(bound.lease.invoice_id())
    }

    pub fn is_loading(&self) -> bool {
        self.bound
            .as_ref()
            .is_some_and(|bound| bound.lease.state().borrow().loading)
    }

    pub fn error(&self) -> Option<SyncError> {
        self.bound
            .as_ref()
            .and_then(|bound| bound.lease.state().borrow().error.clone())
    }

    /// Fetch now, joining a background fetch already in flight.
    ///
    /// The returned snapshot has been offered to the store; a failure is also
    /// kept in [`error`](Self::error) until the next success.
    pub async fn refresh(&self) -> Result<Option<InvoiceStatusSnapshot>, SyncError> {
        let Some(bound) = &self.bound else {
            return Ok(None);
        };
        bound
            .driver
            .fetch_now(bound.lease.invoice_id())
            .await
            .map(Some)
    }

    /// Paced view state, following the configured [`RateLimit`].
    pub fn changes(&self) -> watch::Receiver<ViewState> {
        self.changes.clone()
    }
}

enum Limiter {
    Immediate(mpsc::UnboundedSender<()>),
    Debounce(Debouncer<()>),
    Throttle(Throttler<()>),
}

impl Limiter {
    fn new(rate_limit: RateLimit) -> (Self, mpsc::UnboundedReceiver<()>) {
        match rate_limit {
            RateLimit::Immediate => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Limiter::Immediate(tx), rx)
            }
            RateLimit::Debounce(delay) => {
                let (debouncer, rx) = Debouncer::new(delay);
                (Limiter::Debounce(debouncer), rx)
            }
            RateLimit::Throttle(delay) => {
                let (throttler, rx) = Throttler::new(delay);
                (Limiter::Throttle(throttler), rx)
            }
        }
    }

    fn notify(&self) {
        match self {
            Limiter::Immediate(tx) => {
                let _ = tx.send(());
            }
            Limiter::Debounce(debouncer) => debouncer.push(()),
            Limiter::Throttle(throttler) => throttler.push(()),
        }
    }
}

/// The part of [`FetchState`] a view renders. Poll counters are left out
/// so background ticks do not wake the limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VisibleFetch {
    loading: bool,
    error: Option<SyncError>,
}

impl VisibleFetch {
    fn of(state: &FetchState) -> Self {
        Self {
            loading: state.loading,
            error: state.error.clone(),
        }
    }
}

struct ChangeFeed {
    invoice_id: InvoiceId,
    store: StatusStore,
    fetch_state: watch::Receiver<FetchState>,
    visible_fetch: VisibleFetch,
    limiter: Arc<Limiter>,
    emissions: mpsc::UnboundedReceiver<()>,
    changes: watch::Sender<ViewState>,
}

impl ChangeFeed {
    fn current(&self) -> ViewState {
        let fetch = self.fetch_state.borrow();
        ViewState {
            status: self.store.get(self.invoice_id),
            loading: fetch.loading,
            error: fetch.error.clone(),
        }
    }

    /// Record the latest fetch state; true if its visible part moved.
    fn fetch_state_moved(&mut self) -> bool {
        let latest = VisibleFetch::of(&self.fetch_state.borrow_and_update());
        if latest == self.visible_fetch {
            return false;
        }
        self.visible_fetch = latest;
        true
    }

    /// Publish the current state. Receivers are only woken when it looks
    /// different; the stored value is refreshed either way.
    fn publish(&self) -> bool {
        let state = self.current();
        self.changes.send_if_modified(|shown| {
            let differs = shown.visibly_differs(&state);
            *shown = state;
            differs
        })
    }
}

/// Visible store and fetch-state changes go through the limiter; each
/// emission publishes the state current at that moment.
async fn forward_changes(mut feed: ChangeFeed, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            emission = feed.emissions.recv() => {
                if emission.is_none() {
                    break;
                }
                if !feed.publish() {
                    debug!(event = "core.view.emission_unchanged", invoice_id = %feed.invoice_id);
                }
            }
            changed = feed.fetch_state.changed() => {
                if changed.is_err() {
                    break;
                }
                if feed.fetch_state_moved() {
                    feed.limiter.notify();
                }
            }
        }
    }
    debug!(event = "core.view.feed_stopped", invoice_id = %feed.invoice_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::test_support::{FakeFetcher, response};
    use scanwatch_config::PollingConfig;
    use scanwatch_protocol::{InvoiceStatus, StatusUpdateEvent};
    use std::time::Duration;
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn id(raw: i64) -> InvoiceId {
        InvoiceId::new(raw).unwrap()
    }

    fn sync(fetcher: FakeFetcher, interval_ms: u64) -> (StatusSync<FakeFetcher>, Arc<FakeFetcher>) {
        let config = ScanwatchConfig {
            polling: PollingConfig {
                interval_ms: Some(interval_ms),
                fetch_timeout_ms: Some(300_000),
            },
            ..Default::default()
        };
        let fetcher = Arc::new(fetcher);
        let sync = StatusSync::new(&config, fetcher.clone()).with_rate_limit(RateLimit::Immediate);
        (sync, fetcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_view_touches_nothing() {
        let (sync, fetcher) = sync(FakeFetcher::new(ms(10)), 100);
        let view = sync.view(None);

        assert_eq!(view.invoice_id(), None);
        assert_eq!(view.status(), None);
        assert!(!view.is_loading());
        assert_eq!(view.error(), None);
        assert_eq!(view.refresh().await, Ok(None));
        assert_eq!(*view.changes().borrow(), ViewState::default());

        sleep(ms(500)).await;
        assert!(sync.store().is_empty());
        assert_eq!(sync.driver().active_count(), 0);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_loads_then_shows_status() {
        let (sync, _fetcher) = sync(FakeFetcher::new(ms(20)), 1_000);
        let view = sync.view(Some(id(42)));

        assert!(view.is_loading());
        assert_eq!(view.status().unwrap().status, InvoiceStatus::Pending);

        sleep(ms(30)).await;
        assert!(!view.is_loading());
        let status = view.status().unwrap();
        assert_eq!(status.status, InvoiceStatus::Processing);
        assert_eq!(status.progress, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_joins_initial_fetch() {
        let (sync, fetcher) = sync(FakeFetcher::new(ms(50)), 1_000);
        let view = sync.view(Some(id(1)));

        let snapshot = view.refresh().await.unwrap().unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(snapshot.progress, 10);
        assert_eq!(view.status().unwrap().progress, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_is_returned_and_recorded() {
        let fetcher = FakeFetcher::new(ms(10))
            .then(Ok(response(id(1), InvoiceStatus::Processing, 5)))
            .then(Err(SyncError::transport("backend down")));
        let (sync, _fetcher) = sync(fetcher, 60_000);
        let view = sync.view(Some(id(1)));
        sleep(ms(20)).await;

        let err = view.refresh().await.unwrap_err();
        assert_eq!(err, SyncError::transport("backend down"));
        assert_eq!(view.error(), Some(err));
        // The last good snapshot stays visible.
        assert_eq!(view.status().unwrap().progress, 5);

        view.refresh().await.unwrap();
        assert_eq!(view.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_views_share_polling_and_drop_releases_everything() {
        let (sync, fetcher) = sync(FakeFetcher::new(ms(10)), 100);
        let first = sync.view(Some(id(1)));
        let second = sync.view(Some(id(1)));
        sleep(ms(50)).await;
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(sync.store().subscriber_count(id(1)), 2);

        drop(first);
        assert!(sync.driver().is_polling(id(1)));
        assert!(second.status().is_some());

        drop(second);
        assert!(sync.store().is_empty());
        assert_eq!(sync.driver().active_count(), 0);

        let calls = fetcher.calls();
        sleep(ms(1_000)).await;
        assert_eq!(fetcher.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_follow_store_updates() {
        let (sync, _fetcher) = sync(FakeFetcher::new(ms(10)), 60_000);
        let view = sync.view(Some(id(7)));
        let mut changes = view.changes();
        assert!(changes.borrow().loading);

        sleep(ms(20)).await;
        assert!(changes.has_changed().unwrap());
        let state = changes.borrow_and_update().clone();
        assert!(!state.loading);
        assert_eq!(state.status.unwrap().status, InvoiceStatus::Processing);

        sync.push_adapter().apply(StatusUpdateEvent {
            invoice_id: id(7),
            status: InvoiceStatus::WaitingValidation,
            message: None,
            progress: Some(100),
            log_events: None,
            filename: None,
        });
        changes.changed().await.unwrap();
        assert_eq!(
            changes.borrow().status.as_ref().unwrap().status,
            InvoiceStatus::WaitingValidation
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_changes_emit_leading_and_latest_trailing() {
        let (sync, _fetcher) = sync(FakeFetcher::new(ms(100_000)), 600_000);
        let sync = sync.with_rate_limit(RateLimit::Throttle(ms(100)));
        let view = sync.view(Some(id(3)));
        let changes = view.changes();
        let adapter = sync.push_adapter();

        for progress in 1..=5 {
            sleep(ms(10)).await;
            adapter.apply(StatusUpdateEvent {
                invoice_id: id(3),
                status: InvoiceStatus::Processing,
                message: None,
                progress: Some(progress * 10),
                log_events: None,
                filename: None,
            });
        }

        sleep(ms(10)).await;
        // t = 60: only the leading emission from t = 10 is visible.
        assert_eq!(changes.borrow().status.as_ref().unwrap().progress, 10);

        sleep(ms(60)).await;
        // t = 120: the trailing emission at t = 110 carries the latest state.
        assert_eq!(changes.borrow().status.as_ref().unwrap().progress, 50);
        assert_eq!(view.status().unwrap().progress, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_view_settles_while_polling_continues() {
        let (sync, fetcher) = sync(FakeFetcher::new(ms(10)), 100);
        let sync = sync.with_rate_limit(RateLimit::Debounce(ms(250)));
        let view = sync.view(Some(id(4)));
        let changes = view.changes();

        sleep(ms(2_000)).await;
        assert!(fetcher.calls() >= 19);
        // Progress stops moving at 100 after ten fetches; background ticks
        // after that must not keep restarting the debounce window.
        assert_eq!(view.status().unwrap().progress, 100);
        let shown = changes.borrow().clone();
        assert_eq!(shown.status.unwrap().progress, 100);
        assert!(!shown.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_ticks_without_visible_change_stay_silent() {
        let mut fetcher = FakeFetcher::new(ms(10));
        for _ in 0..30 {
            fetcher = fetcher.then(Ok(response(id(6), InvoiceStatus::Processing, 50)));
        }
        let (sync, fetcher) = sync(fetcher, 100);
        let view = sync.view(Some(id(6)));
        let mut changes = view.changes();

        sleep(ms(50)).await;
        assert_eq!(
            changes.borrow_and_update().status.as_ref().unwrap().progress,
            50
        );

        sleep(ms(1_000)).await;
        assert!(fetcher.calls() >= 10);
        assert!(!changes.has_changed().unwrap());
        assert!(sync.driver().stats(id(6)).unwrap().fetches >= 10);
    }

    #[test]
    fn test_view_state_differs_ignores_bookkeeping() {
        let snapshot = InvoiceStatusSnapshot::seed(id(1));
        let mut later = snapshot.clone();
        later.observed_at = crate::snapshot::ObservedAt(5);

        let a = ViewState {
            status: Some(snapshot),
            loading: false,
            error: None,
        };
        let b = ViewState {
            status: Some(later),
            ..a.clone()
        };
        assert!(!a.visibly_differs(&b));
        assert!(a.visibly_differs(&ViewState {
            loading: true,
            ..b.clone()
        }));
        assert!(a.visibly_differs(&ViewState {
            error: Some(SyncError::transport("down")),
            ..b.clone()
        }));
        assert!(a.visibly_differs(&ViewState::default()));
    }
}
