//! Async JSONL (JSON Lines) transport for knit.
//!
//! Extractors hand their per-file IR to the resolution engine as one JSON
//! object per line, and the engine hands its upsert plan to storage the same
//! way. This crate owns that framing:
//!
//! - [`JsonlReader`] reads typed records line by line, either strictly or
//!   resiliently (malformed lines become [`Warning`]s instead of errors)
//! - [`JsonlWriter`] writes one compact JSON value per line
//! - [`read_jsonl_resilient`] and [`write_jsonl_atomic`] cover the common
//!   whole-file cases

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atomic;
pub mod error;
pub mod reader;
pub mod warning;
pub mod writer;

pub use atomic::{write_jsonl_atomic, write_jsonl_atomic_iter};
pub use error::{Error, Result};
pub use reader::{JsonlReader, read_jsonl_resilient};
pub use warning::{Warning, WarningCollector};
pub use writer::JsonlWriter;
