//! NDJSON event stream adapter
//!
//! Reads events as one JSON object per line:
//!
//! ```json
//! {"tag": "app.web", "time": 1700000000, "record": {"message": "hi"}}
//! ```
//!
//! `time` defaults to the current time and `record` to an empty record.
//! Reformed events are written back in the same shape.

use std::future::Future;
use std::io::Write;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::AppResult;
use crate::transformer::{Event, EventTime, Record, ReformEngine, Sink};

#[derive(Debug, Deserialize)]
struct WireEvent {
    tag: String,
    #[serde(default)]
    time: Option<EventTime>,
    #[serde(default)]
    record: Record,
}

/// Decode one input line
///
/// Blank lines decode to `None`.
///
/// # Errors
/// Returns an error if the line is not a valid event object
pub fn decode_line(line: &str) -> Result<Option<Event>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let wire: WireEvent = serde_json::from_str(line)?;
    Ok(Some(Event {
        tag: wire.tag,
        time: wire.time.unwrap_or_else(EventTime::now),
        record: wire.record,
    }))
}

/// Sink writing events as NDJSON
///
/// The first write error stops further output and is returned by
/// [`NdjsonSink::finish`].
#[derive(Debug)]
pub struct NdjsonSink<W: Write> {
    writer: W,
    error: Option<std::io::Error>,
}

impl<W: Write> NdjsonSink<W> {
    /// Create a sink over a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            error: None,
        }
    }

    fn write_event(&mut self, event: &Event) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")
    }

    /// Flush and return the writer
    ///
    /// # Errors
    /// Returns the first error met while writing or flushing
    pub fn finish(mut self) -> std::io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Sink for NdjsonSink<W> {
    fn emit(&mut self, event: Event) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.write_event(&event) {
            tracing::error!(error = %e, tag = %event.tag, "Failed to write event");
            self.error = Some(e);
        }
    }
}

/// Drive an NDJSON stream through the engine until EOF or shutdown
///
/// Each line is fully processed before the next is read. Lines that cannot
/// be decoded are logged and skipped.
///
/// # Errors
/// Returns an error if reading the input fails
pub async fn run_stream<R, S, F>(
    engine: &ReformEngine,
    reader: R,
    sink: &mut S,
    shutdown: F,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    S: Sink + ?Sized,
    F: Future<Output = ()>,
{
    let mut lines = reader.lines();
    tokio::pin!(shutdown);

    let mut line_number: u64 = 0;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, stopping input");
                break;
            }
        };

        let Some(line) = line else {
            break;
        };
        line_number += 1;

        match decode_line(&line) {
            Ok(Some(event)) => {
                engine.process(&event, sink);
            }
            Ok(None) => {}
            Err(e) => {
                engine.metrics().invalid_input.inc();
                tracing::warn!(line = line_number, error = %e, "Skipping malformed input line");
            }
        }
    }

    Ok(())
}
