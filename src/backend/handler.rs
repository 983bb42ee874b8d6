//! The sleep-then-stream handler.

use std::io;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::stream::{self, Stream};

use crate::backend::outcome::{OutcomeGuard, OutcomeRecorder};
use crate::backend::payload::{Chunks, PayloadPlan};
use crate::backend::BackendSettings;
use crate::http::request_id;

/// State shared by every request.
#[derive(Debug, Clone)]
pub struct BackendState {
    pub settings: BackendSettings,
    pub recorder: OutcomeRecorder,
}

/// `GET /`: wait for the configured delay, then stream the payload.
///
/// The outcome guard is created first so a request cancelled during the
/// delay is still recorded.
pub async fn serve_payload(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    let mut outcome = state.recorder.begin(request_id(&headers));
    let deadline = outcome.started() + state.settings.write_timeout;

    tracing::debug!(
        request_id = %outcome.request_id(),
        delay = ?state.settings.delay,
        "delaying response"
    );
    tokio::time::sleep(state.settings.delay).await;

    let plan = match PayloadPlan::build(state.settings.payload_bytes, state.settings.chunk_bytes) {
        Ok(plan) => plan,
        Err(e) => {
            outcome.build_failed(e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    outcome.streaming(plan.total());
    let body = Body::from_stream(payload_stream(
        plan.chunks(),
        outcome,
        deadline,
        state.settings.chunk_interval,
    ));

    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(plan.total())),
        ],
        body,
    )
        .into_response()
}

struct Writer {
    chunks: Chunks,
    outcome: Option<OutcomeGuard>,
    deadline: Instant,
    interval: Option<Duration>,
    first: bool,
}

/// Chunks of the payload, paced by `interval` and cut off at `deadline`.
///
/// The guard travels with the stream, so it is dropped with the body when
/// hyper gives up on the connection.
fn payload_stream(
    chunks: Chunks,
    outcome: OutcomeGuard,
    deadline: Instant,
    interval: Option<Duration>,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let writer = Writer {
        chunks,
        outcome: Some(outcome),
        deadline,
        interval,
        first: true,
    };

    stream::unfold(writer, |mut w| async move {
        w.outcome.as_ref()?;

        if let Some(interval) = w.interval.filter(|_| !w.first) {
            tokio::time::sleep(interval).await;
        }
        w.first = false;

        if Instant::now() >= w.deadline {
            if let Some(outcome) = w.outcome.take() {
                outcome.write_timed_out();
            }
            let err = io::Error::new(io::ErrorKind::TimedOut, "write deadline exceeded");
            return Some((Err(err), w));
        }

        let chunk = w.chunks.next()?;
        if let Some(outcome) = w.outcome.as_mut() {
            outcome.sent(chunk.len() as u64);
        }
        Some((Ok(chunk), w))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::outcome::{Outcome, Phase};
    use futures_util::StreamExt;

    fn guard(recorder: &OutcomeRecorder, expected: u64) -> OutcomeGuard {
        let mut guard = recorder.begin("test".into());
        guard.streaming(expected);
        guard
    }

    #[tokio::test]
    async fn streams_every_chunk() {
        let recorder = OutcomeRecorder::default();
        let mut rx = recorder.subscribe();
        let plan = PayloadPlan::build(10, 4).unwrap();

        let stream = payload_stream(
            plan.chunks(),
            guard(&recorder, 10),
            Instant::now() + Duration::from_secs(5),
            None,
        );
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(rx.try_recv().unwrap().outcome, Outcome::Completed { bytes: 10 });
    }

    #[tokio::test]
    async fn deadline_cuts_the_stream() {
        let recorder = OutcomeRecorder::default();
        let mut rx = recorder.subscribe();
        let plan = PayloadPlan::build(100, 10).unwrap();

        let stream = payload_stream(
            plan.chunks(),
            guard(&recorder, 100),
            Instant::now() + Duration::from_millis(60),
            Some(Duration::from_millis(25)),
        );
        let items: Vec<_> = stream.collect().await;

        let err = items.last().unwrap().as_ref().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        let outcome = rx.try_recv().unwrap().outcome;
        assert!(matches!(outcome, Outcome::WriteTimeout { bytes } if bytes > 0 && bytes < 100));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_stream_is_an_abort() {
        let recorder = OutcomeRecorder::default();
        let mut rx = recorder.subscribe();
        let plan = PayloadPlan::build(100, 10).unwrap();

        let mut stream = Box::pin(payload_stream(
            plan.chunks(),
            guard(&recorder, 100),
            Instant::now() + Duration::from_secs(5),
            None,
        ));
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        assert_eq!(
            rx.try_recv().unwrap().outcome,
            Outcome::Aborted {
                phase: Phase::Streaming,
                bytes: 10
            }
        );
    }
}
