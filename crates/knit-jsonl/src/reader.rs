//! JSONL reading operations.
//!
//! This module provides async functionality for reading JSONL files line-by-line
//! with efficient buffering and line number tracking for error reporting.

use std::path::Path;

use futures::Stream;
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use crate::error::{Error, Result};
use crate::warning::{Warning, WarningCollector};

/// Async reader for JSONL (JSON Lines) data.
///
/// `JsonlReader` wraps an async reader and decodes one JSON value per line.
/// Blank lines are skipped. It tracks line numbers so that parse failures
/// can point at the offending line.
///
/// # Examples
///
/// ```no_run
/// use knit_jsonl::JsonlReader;
/// use tokio::fs::File;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let file = File::open("ir.jsonl").await?;
/// let mut reader = JsonlReader::new(file);
/// while let Some(value) = reader.read_record::<serde_json::Value>().await? {
///     println!("{value}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct JsonlReader<R> {
    /// Buffered reader wrapping the underlying async reader.
    reader: BufReader<R>,
    /// 1-based number of the last line read, 0 before any read.
    line_number: usize,
    /// Reused line buffer.
    line: String,
}

impl<R: AsyncRead + Unpin> JsonlReader<R> {
    /// Creates a new `JsonlReader` wrapping the given async reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            line: String::new(),
        }
    }

    /// Creates a new `JsonlReader` with a custom buffer capacity.
    ///
    /// IR records for large files can run to hundreds of kilobytes per line;
    /// a larger buffer avoids repeated refills.
    #[must_use]
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            line_number: 0,
            line: String::new(),
        }
    }

    /// Returns the current line number.
    ///
    /// Returns 0 before any lines have been read. After reading, returns the
    /// 1-based line number of the last line read.
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next non-blank line into the internal buffer.
    ///
    /// Returns `false` at end of input.
    async fn next_line(&mut self) -> Result<bool> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).await?;
            if read == 0 {
                return Ok(false);
            }
            self.line_number += 1;
            if !self.line.trim().is_empty() {
                return Ok(true);
            }
        }
    }

    /// Reads and decodes the next record.
    ///
    /// Returns `Ok(None)` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the line is not a valid `T`, or
    /// [`Error::Io`] if the underlying reader fails.
    pub async fn read_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if !self.next_line().await? {
            return Ok(None);
        }
        serde_json::from_str(self.line.trim())
            .map(Some)
            .map_err(|e| Error::InvalidFormat {
                line_number: self.line_number,
                message: e.to_string(),
            })
    }

    /// Reads the next record that decodes successfully.
    ///
    /// Lines that fail to decode are recorded in `warnings` and skipped.
    /// Returns `Ok(None)` at end of input.
    ///
    /// # Errors
    ///
    /// Only I/O failures are returned as errors.
    pub async fn read_record_resilient<T: DeserializeOwned>(
        &mut self,
        warnings: &WarningCollector,
    ) -> Result<Option<T>> {
        while self.next_line().await? {
            match serde_json::from_str(self.line.trim()) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    debug!(line = self.line_number, error = %e, "Skipping malformed JSONL line");
                    warnings.add(Warning::MalformedJson {
                        line_number: self.line_number,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(None)
    }

    /// Converts the reader into a stream of strictly decoded records.
    pub fn into_stream<T: DeserializeOwned>(self) -> impl Stream<Item = Result<T>> {
        futures::stream::try_unfold(self, |mut reader| async move {
            let record = reader.read_record::<T>().await?;
            Ok(record.map(|value| (value, reader)))
        })
    }

    /// Converts the reader into a stream that skips malformed lines.
    ///
    /// Skipped lines are reported through `warnings`, which the caller keeps
    /// a clone of.
    pub fn into_resilient_stream<T: DeserializeOwned>(
        self,
        warnings: WarningCollector,
    ) -> impl Stream<Item = Result<T>> {
        futures::stream::try_unfold((self, warnings), |(mut reader, warnings)| async move {
            let record = reader.read_record_resilient::<T>(&warnings).await?;
            Ok(record.map(|value| (value, (reader, warnings))))
        })
    }
}

/// Reads every decodable record from a JSONL file.
///
/// Malformed lines are skipped and reported as warnings. Only failures to
/// open or read the file are errors.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened or read.
pub async fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref()).await?;
    let mut reader = JsonlReader::new(file);
    let warnings = WarningCollector::new();
    let mut records = Vec::new();

    while let Some(record) = reader.read_record_resilient(&warnings).await? {
        records.push(record);
    }

    Ok((records, warnings.into_warnings()))
}
