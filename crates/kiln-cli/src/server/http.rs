// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server for development mode.
//!
//! Every request runs through the same ordered stages:
//!
//! 1. static asset under `files.assets`
//! 2. `?s=` source file under `files.views`
//! 3. `/<base>/service-worker.js`
//! 4. the application entry, with its response translated back

use super::assets::{resolve_asset, resolve_source, serve_file, source_mime};
use super::bridge::{get_request, set_response};
use super::overlay::error_response;
use arc_swap::ArcSwap;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::FutureExt;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use kiln::resolve::{resolve_entry, to_posix};
use kiln::{KilnError, Manifest, Mode, ModuleLoader, ValidatedConfig};
use percent_encoding::percent_decode_str;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Shared state for the development server.
pub struct DevState {
    /// Project configuration.
    pub config: Arc<ValidatedConfig>,
    /// Current views and assets, replaced by the watcher.
    pub manifest: ArcSwap<Manifest>,
    /// Loads the application entry.
    pub loader: Arc<dyn ModuleLoader>,
    /// Controls how errors are rendered.
    pub mode: Mode,
    /// Scheme used when rebuilding request URLs. The dev server only
    /// speaks plaintext HTTP, so this stays `http` unless it runs behind a
    /// TLS-terminating proxy.
    pub scheme: &'static str,
}

impl DevState {
    /// Creates development state.
    pub fn new(config: Arc<ValidatedConfig>, manifest: Manifest, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            config,
            manifest: ArcSwap::from_pointee(manifest),
            loader,
            mode: Mode::Development,
            scheme: "http",
        }
    }

    /// Renders errors as in production.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the scheme the entry sees in request URLs.
    pub fn with_scheme(mut self, scheme: &'static str) -> Self {
        self.scheme = scheme;
        self
    }
}

/// Builds the router. Everything goes through the fallback handler.
pub fn create_router(state: Arc<DevState>) -> Router {
    Router::new().fallback(fallback_handler).with_state(state)
}

/// Starts the development server on `addr` and runs until Ctrl-C.
pub async fn create_server(addr: &str, state: Arc<DevState>) -> anyhow::Result<()> {
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.loader.invalidate().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }
}

/// Main fallback handler that runs the request stages.
async fn fallback_handler(State(state): State<Arc<DevState>>, request: Request) -> Response {
    let config = &state.config;

    if let Some(file) = resolve_asset(&config.files.assets, &config.paths.base, request.uri().path()) {
        return serve_file(&file, None, request).await;
    }

    if let Some(relative) = source_query(request.uri().query()) {
        return match resolve_source(&config.files.views, &relative) {
            Some(file) => {
                let mime = source_mime(&file);
                serve_file(&file, Some(&mime), request).await
            }
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }

    if request.uri().path() == format!("{}/service-worker.js", config.paths.base) {
        return service_worker(&state);
    }

    invoke_entry(&state, request).await
}

/// Value of the `s` query parameter, percent-decoded.
fn source_query(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "s" {
            return None;
        }
        let value = value.replace('+', " ");
        percent_decode_str(&value)
            .decode_utf8()
            .ok()
            .map(|v| v.into_owned())
    })
}

fn service_worker(state: &DevState) -> Response {
    match resolve_entry(&state.config.files.service_worker) {
        Some(file) => (
            [(CONTENT_TYPE, "text/javascript")],
            format!("import '/@fs/{}';", to_posix(&file).trim_start_matches('/')),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn invoke_entry(state: &DevState, request: Request) -> Response {
    let request = match get_request(request, state.scheme, state.config.body_size_limit()) {
        Ok(request) => request,
        Err(e @ KilnError::RequestBodyTooLarge(_)) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
        Err(e) => return error_response(&e, state.mode, &state.config.root),
    };

    let handler = match state.loader.load_entry().await {
        Ok(handler) => handler,
        Err(e) => {
            tracing::error!("{}", e);
            return error_response(&e, state.mode, &state.config.root);
        }
    };

    let error = match AssertUnwindSafe(handler.fetch(request)).catch_unwind().await {
        Ok(Ok(response)) => return set_response(response),
        Ok(Err(e)) => KilnError::Handler(e),
        Err(panic) => KilnError::Handler(panic_message(panic).into()),
    };
    tracing::error!("{}", error);

    if let Some(response) = handler.on_error(&error).await {
        return set_response(response);
    }
    error_response(&error, state.mode, &state.config.root)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
