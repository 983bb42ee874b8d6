//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the gap between two successive reads of a body stream
//! - Recognise timeouts buried in an error's source chain
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - An expired stream ends after yielding its error; it is never polled again

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use thiserror::Error;

/// Error yielded by an [`idle_timeout`] stream.
#[derive(Debug, Error)]
pub enum StreamTimeoutError<E> {
    /// No data arrived within the allowed gap.
    #[error("no data received for {0:?}")]
    Idle(Duration),
    /// The wrapped stream failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> StreamTimeoutError<E> {
    pub fn is_idle(&self) -> bool {
        matches!(self, StreamTimeoutError::Idle(_))
    }
}

/// Fail `inner` when it produces nothing for `idle`.
///
/// The timer restarts each time an item is polled for, so it measures the
/// gap between successive reads rather than the total transfer time.
pub fn idle_timeout<S, E>(
    inner: S,
    idle: Duration,
) -> impl Stream<Item = Result<Bytes, StreamTimeoutError<E>>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(idle, inner.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(inner))),
            Ok(Some(Err(e))) => Some((Err(StreamTimeoutError::Inner(e)), None)),
            Ok(None) => None,
            Err(_) => Some((Err(StreamTimeoutError::Idle(idle)), None)),
        }
    })
}

/// Whether `err` or anything in its source chain is an I/O timeout.
pub fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = e.source();
    }
    false
}
