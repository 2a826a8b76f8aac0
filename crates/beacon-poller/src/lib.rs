//! The Beacon poller: fetches an upstream status feed on a schedule, runs it
//! through the tracker in `beacon-core`, persists the result, and publishes
//! JSON documents for dashboards.
//!
//! One run is a strictly sequential pipeline: lock → load → fetch → normalise
//! → reconcile → save → publish.

pub mod config;
pub mod fetch;
pub mod lock;
pub mod publish;
pub mod run;

pub use config::PollerConfig;
pub use run::{PollOutcome, Poller};
