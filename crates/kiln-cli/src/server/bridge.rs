// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Translation between hyper requests and the standard request type.

use axum::body::Body as AxumBody;
use axum::response::Response as AxumResponse;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use http::header::{HeaderValue, HOST, SET_COOKIE};
use http::Uri;
use kiln::fetch::{bounded_stream, plan_body, BodyPlan, BodyStream};
use kiln::{Body, BodyError, KilnError};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Converts an incoming request into a standard request.
///
/// The URL is rebuilt as `scheme://host/path?query` from the `Host` header.
/// A body is attached only when the headers announce one.
///
/// # Errors
///
/// Returns [`KilnError::RequestBodyTooLarge`] when a declared
/// `content-length` exceeds `limit`.
pub fn get_request(
    request: axum::extract::Request,
    scheme: &str,
    limit: Option<u64>,
) -> Result<kiln::Request, KilnError> {
    let (parts, body) = request.into_parts();
    let plan = plan_body(&parts.headers, parts.version, limit)?;

    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = format!("{}://{}{}", scheme, host, path_and_query)
        .parse()
        .unwrap_or_else(|_| parts.uri.clone());

    let body = match plan {
        BodyPlan::None => Body::Empty,
        plan => {
            let stream: BodyStream = Box::pin(
                body.into_data_stream()
                    .map(|chunk| chunk.map_err(|_| BodyError::Cancelled)),
            );
            Body::Stream(bounded_stream(stream, plan, limit))
        }
    };

    let mut request = http::Request::new(body);
    *request.method_mut() = parts.method;
    *request.uri_mut() = uri;
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers;
    Ok(request)
}

/// Converts a standard response into a hyper response.
///
/// Combined `set-cookie` values are split into separate header lines and
/// streamed bodies are forwarded chunk by chunk.
pub fn set_response(response: kiln::Response) -> AxumResponse {
    let (parts, body) = response.into_parts();

    let body = match body {
        Body::Empty => AxumBody::empty(),
        Body::Full(bytes) => AxumBody::from(bytes),
        Body::Stream(stream) => AxumBody::from_stream(GuardedStream::new(stream)),
    };

    let mut translated = AxumResponse::new(body);
    *translated.status_mut() = parts.status;
    *translated.version_mut() = parts.version;

    let headers = translated.headers_mut();
    for (name, value) in parts.headers.iter() {
        if name == SET_COOKIE {
            let combined = String::from_utf8_lossy(value.as_bytes());
            for cookie in split_set_cookie(&combined) {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    headers.append(SET_COOKIE, value);
                }
            }
        } else {
            headers.append(name.clone(), value.clone());
        }
    }

    translated
}

/// Splits a combined `set-cookie` header into individual cookies.
///
/// A comma separates two cookies only when the text after it reaches `=`
/// before any `;` or `,`, so commas inside `Expires` dates stay put.
pub fn split_set_cookie(value: &str) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    let mut cookies = Vec::new();
    let mut pos = 0;

    let skip_whitespace = |pos: &mut usize| {
        while *pos < len && chars[*pos].is_whitespace() {
            *pos += 1;
        }
        *pos < len
    };
    let is_plain = |ch: char| ch != '=' && ch != ';' && ch != ',';
    let slice = |from: usize, to: usize| chars[from..to].iter().collect::<String>();

    while pos < len {
        let mut start = pos;
        let mut separator_found = false;

        while skip_whitespace(&mut pos) {
            if chars[pos] != ',' {
                pos += 1;
                continue;
            }

            let last_comma = pos;
            pos += 1;
            skip_whitespace(&mut pos);
            let next_start = pos;
            while pos < len && is_plain(chars[pos]) {
                pos += 1;
            }

            if pos < len && chars[pos] == '=' {
                separator_found = true;
                pos = next_start;
                cookies.push(slice(start, last_comma));
                start = pos;
            } else {
                pos = last_comma + 1;
            }
        }

        if !separator_found || pos >= len {
            cookies.push(slice(start, len));
        }
    }

    cookies
}

/// Response body stream that reports failures and early disconnects.
///
/// Dropping it before the end drops the upstream reader, which cancels it.
struct GuardedStream {
    inner: BodyStream,
    finished: bool,
}

impl GuardedStream {
    fn new(inner: BodyStream) -> Self {
        Self {
            inner,
            finished: false,
        }
    }
}

impl Stream for GuardedStream {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                let error = KilnError::StreamingWrite(e.to_string());
                tracing::error!("{}", error);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for GuardedStream {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Client disconnected, cancelling response stream");
        }
    }
}
