// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Static and source file lookup for the development server.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use mime_guess::mime::{self, Mime};
use percent_encoding::percent_decode_str;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Maps a request path to a file under `assets_dir`.
///
/// The path is percent-decoded and `base` is stripped first. Every component
/// must match the on-disk name exactly, so `/Logo.png` does not serve
/// `logo.png` on case-insensitive filesystems.
pub fn resolve_asset(assets_dir: &Path, base: &str, uri_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(uri_path).decode_utf8().ok()?;

    let relative = if base.is_empty() {
        &decoded[..]
    } else {
        let rest = decoded.strip_prefix(base)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        rest
    };

    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }

    let mut current = assets_dir.to_path_buf();
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        if !has_exact_entry(&current, segment) {
            return None;
        }
        current.push(segment);
    }

    current.is_file().then_some(current)
}

fn has_exact_entry(dir: &Path, name: &str) -> bool {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_str() == Some(name)),
        Err(_) => false,
    }
}

/// Resolves `?s=` paths relative to the views directory.
///
/// Paths that leave the directory are rejected.
pub fn resolve_source(views_dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let root = views_dir.canonicalize().ok()?;
    let file = views_dir.join(relative).canonicalize().ok()?;
    (file.starts_with(&root) && file.is_file()).then_some(file)
}

/// Content type used when serving a source file.
pub fn source_mime(path: &Path) -> Mime {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js" | "mjs" | "cjs" | "ts" | "mts") => mime::TEXT_JAVASCRIPT,
        Some("css") => mime::TEXT_CSS,
        _ => mime_guess::from_path(path).first_or_octet_stream(),
    }
}

/// Serves `path` with range and conditional request support.
pub async fn serve_file<B>(path: &Path, mime: Option<&Mime>, request: http::Request<B>) -> Response
where
    B: Send + 'static,
{
    let service = match mime {
        Some(mime) => ServeFile::new_with_mime(path, mime),
        None => ServeFile::new(path),
    };

    match service.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(e) => {
            tracing::error!("Failed to serve {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
