//! Resilient sensor client for the Sensey collector.
//!
//! The client samples its sensors on a fixed cadence and delivers readings
//! over HTTP with an at-least-once guarantee: every reading is journaled to
//! a durable queue before delivery is attempted, survives crashes and
//! collector outages, and is retried with exponential backoff until the
//! collector accepts it or the bounded queue evicts it.
//!
//! The pipeline is two independent tasks sharing the queue:
//!
//! - [`Poller`]: samples all configured [`Sensor`]s and enqueues one merged
//!   reading per tick
//! - [`DeliveryWorker`]: drains the queue oldest-first through a
//!   [`ReadingTransport`]

pub mod backoff;
pub mod config;
pub mod delivery;
pub mod error;
pub mod poller;
pub mod queue;

pub use backoff::{Backoff, BackoffConfig};
pub use config::{Config, ConfigError};
pub use delivery::{DeliveryWorker, HttpTransport, ReadingTransport};
pub use error::{ClientError, Result};
pub use poller::{Poller, Sensor, SimulatedSensor};
pub use queue::{DurableQueue, QueueEntry};
