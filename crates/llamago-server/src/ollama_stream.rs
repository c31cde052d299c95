//! NDJSON framing for "streamed" Ollama responses.
//!
//! The engine returns a whole completion at once, so a streamed response is
//! a lazy sequence of exactly one frame: the final JSON object followed by a
//! newline. The sequence is consumed by the body and cannot be replayed.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use tracing::warn;

/// Frames of one streamed response. Yields its single frame once.
pub struct ResponseFrames<T> {
    pending: Option<T>,
}

impl<T> ResponseFrames<T> {
    pub const fn single(frame: T) -> Self {
        Self {
            pending: Some(frame),
        }
    }
}

impl<T: Serialize + Unpin> Stream for ResponseFrames<T> {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().pending.take().map(|frame| encode_frame(&frame)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::from(self.pending.is_some());
        (n, Some(n))
    }
}

/// Serialize one frame as a newline-terminated JSON line.
///
/// An encoding failure ends the body with an error, which drops the
/// connection instead of sending a trailing error frame.
fn encode_frame<T: Serialize>(frame: &T) -> Result<Bytes, io::Error> {
    match serde_json::to_vec(frame) {
        Ok(mut line) => {
            line.push(b'\n');
            Ok(Bytes::from(line))
        }
        Err(e) => {
            warn!("streamResponse: json encoding failed with {e}");
            Err(io::Error::other(e))
        }
    }
}

/// Build a chunked `application/x-ndjson` response carrying `frame`.
pub fn ndjson_response<T>(frame: T) -> Response
where
    T: Serialize + Unpin + Send + 'static,
{
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(ResponseFrames::single(frame)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn yields_exactly_one_frame() {
        let mut frames = ResponseFrames::single(serde_json::json!({"done": true}));
        assert_eq!(frames.size_hint(), (1, Some(1)));

        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"{\"done\":true}\n");
        assert!(frames.next().await.is_none());
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn response_is_ndjson() {
        let response = ndjson_response(serde_json::json!({"response": "hi"}));
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-ndjson"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = std::str::from_utf8(&body).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
    }
}
