// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error responses for failed requests.

use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;
use kiln::{CompileError, KilnError, Mode};
use std::error::Error;
use std::path::Path;

/// Escapes text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Pieces of an error shown on the overlay.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ErrorDetails {
    /// Headline.
    pub message: String,
    /// Cause chain or captured tool output.
    pub stack: Option<String>,
    /// Source snippet around the failing line.
    pub frame: Option<String>,
    /// `file:line:column`, relative to the project root when possible.
    pub location: Option<String>,
}

impl ErrorDetails {
    /// Extracts overlay details from `error`.
    pub fn from_error(error: &KilnError, root: &Path) -> Self {
        match error {
            KilnError::Compile(compile) | KilnError::HtmlTransform(compile) => {
                Self::from_compile(error.to_string(), compile, root)
            }
            KilnError::Handler(inner) => {
                if let Some(compile) = inner.downcast_ref::<CompileError>() {
                    return Self::from_compile(inner.to_string(), compile, root);
                }
                Self {
                    message: inner.to_string(),
                    stack: cause_chain(inner.source()),
                    ..Self::default()
                }
            }
            other => Self {
                message: other.to_string(),
                stack: cause_chain(other.source()),
                ..Self::default()
            },
        }
    }

    fn from_compile(message: String, compile: &CompileError, root: &Path) -> Self {
        let location = compile.file.as_ref().map(|file| {
            let file = file.strip_prefix(root).unwrap_or(file);
            let mut location = kiln::resolve::to_posix(file);
            if let Some(line) = compile.line {
                location.push_str(&format!(":{}", line));
                if let Some(column) = compile.column {
                    location.push_str(&format!(":{}", column));
                }
            }
            location
        });

        Self {
            message,
            stack: compile.stack.clone(),
            frame: compile.frame.as_ref().map(|frame| frame.format_snippet()),
            location,
        }
    }
}

fn cause_chain(mut source: Option<&(dyn Error + 'static)>) -> Option<String> {
    let mut lines = Vec::new();
    while let Some(error) = source {
        lines.push(format!("caused by: {}", error));
        source = error.source();
    }
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Renders the development error page.
pub fn render_error_page(details: &ErrorDetails) -> String {
    let mut sections = String::new();

    if let Some(location) = &details.location {
        sections.push_str(&format!(
            "<p class=\"location\">{}</p>\n",
            escape_html(location)
        ));
    }
    if let Some(frame) = &details.frame {
        sections.push_str(&format!("<pre class=\"frame\">{}</pre>\n", escape_html(frame)));
    }
    if let Some(stack) = &details.stack {
        sections.push_str(&format!("<pre class=\"stack\">{}</pre>\n", escape_html(stack)));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Internal Error</title>
<style>
  body {{ font-family: ui-monospace, monospace; background: #1a1a1a; color: #e5e5e5; padding: 2rem; }}
  h1 {{ color: #ff6b6b; font-size: 1.25rem; white-space: pre-wrap; }}
  .location {{ color: #9ca3af; }}
  pre {{ background: #262626; padding: 1rem; border-radius: 4px; overflow-x: auto; }}
  .stack {{ color: #a3a3a3; }}
</style>
</head>
<body>
<h1>{}</h1>
{}</body>
</html>
"#,
        escape_html(&details.message),
        sections
    )
}

/// Builds the response for an error raised while handling a request.
///
/// Development shows the overlay page; production only says
/// `Internal Server Error`.
pub fn error_response(error: &KilnError, mode: Mode, root: &Path) -> Response {
    let status = match error {
        KilnError::RequestBodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match mode {
        Mode::Development => {
            let details = ErrorDetails::from_error(error, root);
            (status, Html(render_error_page(&details))).into_response()
        }
        Mode::Production => (status, "Internal Server Error").into_response(),
    }
}
