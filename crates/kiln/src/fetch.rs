// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Standard request and response types.
//!
//! The dev server converts native HTTP requests into [`Request`] values,
//! hands them to the user's [`EntryHandler`] and translates the returned
//! [`Response`] back. Bodies are either absent, fully buffered or a stream
//! of chunks that is polled as the client reads.

use crate::error::{BoxError, KilnError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, Version};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;

/// Failure while reading a body stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// More bytes arrived than allowed.
    #[error("request body size exceeded {constraint} of {limit}")]
    TooLarge {
        /// What imposed the limit: `content-length` or `body_size_limit`.
        constraint: &'static str,
        /// The limit in bytes.
        limit: u64,
    },
    /// The client went away before the body was read.
    #[error("request body was cancelled")]
    Cancelled,
    /// Transport failure.
    #[error("failed to read body: {0}")]
    Io(String),
}

/// A stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BodyError>> + Send + 'static>>;

/// A request or response body.
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// A buffered body.
    Full(Bytes),
    /// A body produced chunk by chunk.
    Stream(BodyStream),
}

impl Body {
    /// Creates an empty body.
    pub fn empty() -> Self {
        Body::Empty
    }

    /// Wraps a chunk stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        Body::Stream(Box::pin(stream))
    }

    /// A stream body that fails with [`BodyError::Cancelled`] on first poll.
    pub fn cancelled() -> Self {
        Body::from_stream(stream::once(async { Err(BodyError::Cancelled) }))
    }

    /// Returns true for [`Body::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Converts any body into a chunk stream.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Body::Empty => Box::pin(stream::empty()),
            Body::Full(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            Body::Stream(stream) => stream,
        }
    }

    /// Reads the whole body into memory.
    pub async fn collect(self) -> Result<Bytes, BodyError> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            }
        }
    }

    /// Reads the whole body as UTF-8 text, replacing invalid sequences.
    pub async fn text(self) -> Result<String, BodyError> {
        let bytes = self.collect().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Full(Bytes::from_static(text.as_bytes()))
    }
}

/// A standard request.
pub type Request = http::Request<Body>;

/// A standard response.
pub type Response = http::Response<Body>;

/// The user's server entry.
///
/// `fetch` may fail or panic; both are rendered by the error overlay unless
/// `on_error` supplies a response.
#[async_trait]
pub trait EntryHandler: Send + Sync {
    /// Handles one request.
    async fn fetch(&self, request: Request) -> Result<Response, BoxError>;

    /// Maps a failure to a response. `None` falls back to the default page.
    async fn on_error(&self, _error: &KilnError) -> Option<Response> {
        None
    }
}

/// How a request body should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPlan {
    /// The request carries no body.
    None,
    /// The client declared the length; reading more is an error.
    Declared(u64),
    /// Length unknown (chunked or HTTP/2); bounded only by the limit.
    Unbounded,
}

/// Decides whether and how to read a request body.
///
/// A body is only read when `content-type` is present. HTTP/1 requests
/// without `content-length` or `transfer-encoding`, and requests with a zero
/// length, have none. A declared length above `limit` is rejected before any
/// byte is read.
pub fn plan_body(headers: &HeaderMap, version: Version, limit: Option<u64>) -> Result<BodyPlan, KilnError> {
    if !headers.contains_key(CONTENT_TYPE) {
        return Ok(BodyPlan::None);
    }

    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let is_http1 = matches!(version, Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11);
    if content_length == Some(0)
        || (is_http1 && content_length.is_none() && !headers.contains_key(TRANSFER_ENCODING))
    {
        return Ok(BodyPlan::None);
    }

    match content_length {
        Some(length) => {
            if let Some(limit) = limit {
                if length > limit {
                    return Err(KilnError::RequestBodyTooLarge(format!(
                        "Content-length of {} exceeds limit of {} bytes.",
                        length, limit
                    )));
                }
            }
            Ok(BodyPlan::Declared(length))
        }
        None => Ok(BodyPlan::Unbounded),
    }
}

/// Bounds `stream` according to `plan` and `limit`.
pub fn bounded_stream(stream: BodyStream, plan: BodyPlan, limit: Option<u64>) -> BodyStream {
    match (plan, limit) {
        (BodyPlan::Declared(length), _) => Box::pin(Limited::new(stream, length, "content-length")),
        (BodyPlan::Unbounded, Some(limit)) => Box::pin(Limited::new(stream, limit, "body_size_limit")),
        _ => stream,
    }
}

/// Counts bytes and fails once more than `limit` were produced.
struct Limited {
    inner: BodyStream,
    limit: u64,
    seen: u64,
    constraint: &'static str,
    done: bool,
}

impl Limited {
    fn new(inner: BodyStream, limit: u64, constraint: &'static str) -> Self {
        Self {
            inner,
            limit,
            seen: 0,
            constraint,
            done: false,
        }
    }
}

impl Stream for Limited {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.seen += chunk.len() as u64;
                if self.seen > self.limit {
                    self.done = true;
                    return Poll::Ready(Some(Err(BodyError::TooLarge {
                        constraint: self.constraint,
                        limit: self.limit,
                    })));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn chunks(parts: &[&'static str]) -> BodyStream {
        let items: Vec<Result<Bytes, BodyError>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        Box::pin(stream::iter(items))
    }

    #[test]
    fn test_no_content_type_means_no_body() {
        let plan = plan_body(&headers(&[("content-length", "10")]), Version::HTTP_11, None).unwrap();
        assert_eq!(plan, BodyPlan::None);
    }

    #[test]
    fn test_http1_without_length_has_no_body() {
        let h = headers(&[("content-type", "text/plain")]);
        assert_eq!(plan_body(&h, Version::HTTP_11, None).unwrap(), BodyPlan::None);
        assert_eq!(plan_body(&h, Version::HTTP_2, None).unwrap(), BodyPlan::Unbounded);

        let chunked = headers(&[("content-type", "text/plain"), ("transfer-encoding", "chunked")]);
        assert_eq!(plan_body(&chunked, Version::HTTP_11, None).unwrap(), BodyPlan::Unbounded);
    }

    #[test]
    fn test_zero_length_has_no_body() {
        let h = headers(&[("content-type", "text/plain"), ("content-length", "0")]);
        assert_eq!(plan_body(&h, Version::HTTP_11, Some(10)).unwrap(), BodyPlan::None);
    }

    #[test]
    fn test_declared_length_over_limit_is_rejected() {
        let h = headers(&[("content-type", "application/json"), ("content-length", "2048")]);
        let err = plan_body(&h, Version::HTTP_11, Some(1024)).unwrap_err();
        assert!(matches!(err, KilnError::RequestBodyTooLarge(_)));
        assert_eq!(plan_body(&h, Version::HTTP_11, None).unwrap(), BodyPlan::Declared(2048));
    }

    #[tokio::test]
    async fn test_unbounded_stream_is_limited() {
        let stream = bounded_stream(chunks(&["abcd", "efgh"]), BodyPlan::Unbounded, Some(6));
        let err = Body::Stream(stream).collect().await.unwrap_err();
        assert_eq!(
            err,
            BodyError::TooLarge {
                constraint: "body_size_limit",
                limit: 6
            }
        );
    }

    #[tokio::test]
    async fn test_declared_length_bounds_stream() {
        let stream = bounded_stream(chunks(&["abc", "def"]), BodyPlan::Declared(6), None);
        assert_eq!(Body::Stream(stream).collect().await.unwrap(), Bytes::from("abcdef"));

        let stream = bounded_stream(chunks(&["abc", "def"]), BodyPlan::Declared(4), None);
        assert!(Body::Stream(stream).collect().await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_body() {
        assert_eq!(Body::cancelled().collect().await.unwrap_err(), BodyError::Cancelled);
    }

    #[tokio::test]
    async fn test_body_text() {
        assert_eq!(Body::from("hello").text().await.unwrap(), "hello");
        assert_eq!(Body::empty().text().await.unwrap(), "");
    }
}
