//! scanwatch-core: Invoice status synchronization
//!
//! Keeps a client-side view of an invoice's processing status in sync with
//! the backend by merging background polling and push notifications into a
//! single store, ordered by a logical observation clock.
//!
//! # Main Entry Points
//!
//! - [`view`] - `StatusSync` and per-invoice `StatusView`s
//! - [`store`] - Merged per-invoice snapshots and change listeners
//! - [`polling`] - Reference counted polling loops
//! - [`push`] - Push frame ingestion
//! - [`actions`] - Retry and reject mutations
//! - [`rate_limit`] - Debounce and throttle primitives

pub mod actions;
pub mod errors;
pub mod fetcher;
pub mod logging;
pub mod polling;
pub mod push;
pub mod rate_limit;
pub mod snapshot;
pub mod store;
pub mod view;

// Re-export wire types from scanwatch-protocol
pub use scanwatch_protocol::{
    ActionResponse, InvoiceId, InvoiceStatus, StatusResponse, StatusUpdateEvent,
};

pub use scanwatch_config::{ConfigError, ScanwatchConfig};

pub use actions::InvoiceActions;
pub use errors::SyncError;
pub use fetcher::{HttpStatusFetcher, StatusFetcher};
pub use polling::{FetchOutcome, FetchState, PollLease, PollStats, PollingDriver};
pub use push::{PushChannelAdapter, PushRunStats};
pub use rate_limit::{Debouncer, RateLimit, Throttler};
pub use snapshot::{InvoiceStatusSnapshot, LogicalClock, ObservedAt, SnapshotSource};
pub use store::{StatusListener, StatusStore, StatusSubscription};
pub use view::{StatusSync, StatusView, ViewState};

// Re-export logging initialization
pub use logging::{init_file_logging, init_logging};
