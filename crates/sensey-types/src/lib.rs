//! Shared types for Sensey environmental sensor data.
//!
//! This crate provides the data model used on both sides of the wire:
//! the client-side delivery pipeline and the collector's storage layer.
//!
//! # Features
//!
//! - [`Reading`]: one timestamped set of named numeric measurements
//! - [`codec`]: lossless JSON encoding of readings for transport and storage
//! - [`TimeWindow`]: symbolic query windows (`1h`, `6h`, `1d`, `3d`, `7d`, `all`)
//! - Error types for payload parsing
//!
//! # Example
//!
//! ```
//! use sensey_types::{Reading, TimeWindow};
//!
//! let reading = Reading::now("greenhouse-1")
//!     .with_field("temperature", 21.5)
//!     .with_field("humidity", 48.0);
//!
//! assert_eq!(reading.fields.len(), 2);
//! assert_eq!("1h".parse::<TimeWindow>().unwrap(), TimeWindow::OneHour);
//! ```

pub mod codec;
pub mod error;
pub mod reading;
pub mod window;

pub use error::{ParseError, ParseResult};
pub use reading::{CANONICAL_FIELDS, Reading};
pub use window::TimeWindow;
