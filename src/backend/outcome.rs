//! Terminal outcome of a backend request.
//!
//! Every request gets an [`OutcomeGuard`] when the handler starts. The
//! guard reports exactly once: explicitly for build failures and write
//! timeouts, otherwise when it is dropped. Hyper drops the response body
//! when a write fails or once the last byte is out, so the drop path
//! tells those cases apart by how many bytes left.
//!
//! HTTP/1 connections are served with half-close enabled, so a peer that
//! leaves during the delay is noticed on the first failed write, in the
//! streaming phase. The delay phase is only recorded when the handler
//! itself is cancelled: an HTTP/2 stream reset, or connections dropped
//! once the drain timeout has passed.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::observability::metrics;

/// Where the request was when the peer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Delay,
    Streaming,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Delay => f.write_str("delay"),
            Phase::Streaming => f.write_str("streaming"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The whole payload was handed to the connection.
    Completed { bytes: u64 },
    /// The payload buffer could not be constructed.
    BuildFailed { reason: String },
    /// The peer closed the connection before the payload was written.
    Aborted { phase: Phase, bytes: u64 },
    /// The write deadline passed mid-body.
    WriteTimeout { bytes: u64 },
}

impl Outcome {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::BuildFailed { .. } => "build_failed",
            Outcome::Aborted { .. } => "aborted",
            Outcome::WriteTimeout { .. } => "write_timeout",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn bytes(&self) -> u64 {
        match self {
            Outcome::Completed { bytes }
            | Outcome::Aborted { bytes, .. }
            | Outcome::WriteTimeout { bytes } => *bytes,
            Outcome::BuildFailed { .. } => 0,
        }
    }
}

/// An outcome together with the request it belongs to.
#[derive(Debug, Clone)]
pub struct OutcomeReport {
    pub request_id: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Logs outcomes and publishes them to subscribers.
#[derive(Debug, Clone)]
pub struct OutcomeRecorder {
    tx: broadcast::Sender<OutcomeReport>,
}

impl OutcomeRecorder {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every outcome recorded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutcomeReport> {
        self.tx.subscribe()
    }

    /// Start tracking a request.
    pub fn begin(&self, request_id: String) -> OutcomeGuard {
        OutcomeGuard {
            request_id,
            started: Instant::now(),
            phase: Phase::Delay,
            expected: 0,
            sent: 0,
            reported: false,
            recorder: self.clone(),
        }
    }

    fn record(&self, report: OutcomeReport) {
        let OutcomeReport {
            request_id,
            outcome,
            elapsed,
        } = &report;

        match outcome {
            Outcome::Completed { bytes } => {
                tracing::info!(request_id = %request_id, bytes, elapsed = ?elapsed, "response written");
            }
            Outcome::BuildFailed { reason } => {
                tracing::error!(request_id = %request_id, reason = %reason, "error building response body");
            }
            Outcome::Aborted {
                phase: Phase::Delay,
                ..
            } => {
                tracing::error!(
                    request_id = %request_id,
                    elapsed = ?elapsed,
                    "request cancelled before writing"
                );
            }
            Outcome::Aborted { phase, bytes } => {
                tracing::error!(
                    request_id = %request_id,
                    phase = %phase,
                    bytes,
                    elapsed = ?elapsed,
                    "error writing: connection closed by peer"
                );
            }
            Outcome::WriteTimeout { bytes } => {
                tracing::error!(request_id = %request_id, bytes, elapsed = ?elapsed, "error writing: write deadline exceeded");
            }
        }

        metrics::record_outcome(outcome.kind(), outcome.bytes(), *elapsed);
        let _ = self.tx.send(report);
    }
}

impl Default for OutcomeRecorder {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Reports a request's outcome exactly once.
#[derive(Debug)]
pub struct OutcomeGuard {
    request_id: String,
    started: Instant,
    phase: Phase,
    expected: u64,
    sent: u64,
    reported: bool,
    recorder: OutcomeRecorder,
}

impl OutcomeGuard {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// The delay is over and `expected` bytes are about to be streamed.
    pub fn streaming(&mut self, expected: u64) {
        self.phase = Phase::Streaming;
        self.expected = expected;
    }

    /// Account for a chunk handed to the connection.
    pub fn sent(&mut self, bytes: u64) {
        self.sent += bytes;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    pub fn build_failed(mut self, reason: impl fmt::Display) {
        self.report(Outcome::BuildFailed {
            reason: reason.to_string(),
        });
    }

    pub fn write_timed_out(mut self) {
        let bytes = self.sent;
        self.report(Outcome::WriteTimeout { bytes });
    }

    fn report(&mut self, outcome: Outcome) {
        if self.reported {
            return;
        }
        self.reported = true;
        self.recorder.record(OutcomeReport {
            request_id: self.request_id.clone(),
            outcome,
            elapsed: self.started.elapsed(),
        });
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        let outcome = if self.phase == Phase::Streaming && self.sent >= self.expected {
            Outcome::Completed { bytes: self.sent }
        } else {
            Outcome::Aborted {
                phase: self.phase,
                bytes: self.sent,
            }
        };
        self.report(outcome);
    }
}
