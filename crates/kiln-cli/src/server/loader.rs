// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Entry loading through a runtime child process.
//!
//! The configured runtime (`dev.runtime`, `node {entry}` by default) is
//! started on the generated launcher with `PORT` set and requests are
//! proxied to it. Invalidation kills the process; the next request starts a
//! fresh one.

use async_trait::async_trait;
use console::style;
use futures_util::stream::StreamExt;
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use kiln::sync::launcher::DEV_ERROR_HEADER;
use kiln::{Body, BodyError, BoxError, CompileError, EntryHandler, KilnError, ModuleLoader};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::Mutex;

/// Lines of runtime stderr kept for error reports.
const STDERR_TAIL: usize = 50;

/// How long to wait for the runtime to accept connections.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Substitutes `{entry}` in the runtime command line.
pub fn runtime_command(runtime: &[String], entry: &Path) -> Option<(String, Vec<String>)> {
    let entry = entry.to_string_lossy();
    let mut parts = runtime.iter().map(|part| part.replace("{entry}", &entry));
    let program = parts.next()?;
    Some((program, parts.collect()))
}

struct RunningEntry {
    child: Child,
    handler: Arc<ProxyHandler>,
}

/// [`ModuleLoader`] backed by a runtime child process.
pub struct ProcessEntryLoader {
    root: PathBuf,
    launcher: PathBuf,
    runtime: Vec<String>,
    port: u16,
    client: reqwest::Client,
    running: Mutex<Option<RunningEntry>>,
}

impl ProcessEntryLoader {
    /// Creates a loader that runs `launcher`, substituted for `{entry}` in
    /// `runtime`. Nothing is started until the first request.
    pub fn new(root: &Path, launcher: &Path, runtime: Vec<String>, port: u16) -> Result<Self, KilnError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| KilnError::Handler(Box::new(e)))?;

        Ok(Self {
            root: root.to_path_buf(),
            launcher: launcher.to_path_buf(),
            runtime,
            port,
            client,
            running: Mutex::new(None),
        })
    }

    async fn spawn(&self) -> Result<RunningEntry, KilnError> {
        let (program, args) = runtime_command(&self.runtime, &self.launcher)
            .ok_or_else(|| KilnError::Compile(CompileError::new("dev.runtime is empty")))?;

        tracing::debug!("Starting entry runtime: {} {:?}", program, args);
        let mut child = TokioCommand::new(&program)
            .args(&args)
            .current_dir(&self.root)
            .env("PORT", self.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let tail = Arc::new(StdMutex::new(VecDeque::new()));
        if let Some(stderr) = child.stderr.take() {
            let tail = tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("  {} {}", style("runtime").dim(), line);
                    let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        let stderr_tail = || {
            let tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
            tail.iter().cloned().collect::<Vec<_>>().join("\n")
        };

        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        loop {
            if let Some(status) = child.try_wait()? {
                // Give the reader a moment to drain the last lines.
                tokio::time::sleep(POLL_INTERVAL).await;
                return Err(KilnError::Compile(
                    CompileError::new(format!(
                        "Entry runtime exited with {} before accepting connections",
                        status
                    ))
                    .with_stack(stderr_tail()),
                ));
            }

            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(KilnError::Compile(
                    CompileError::new(format!(
                        "Entry runtime did not listen on port {} within {}s",
                        self.port,
                        STARTUP_TIMEOUT.as_secs()
                    ))
                    .with_stack(stderr_tail()),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        tracing::info!("Entry runtime listening on port {}", self.port);
        Ok(RunningEntry {
            child,
            handler: Arc::new(ProxyHandler::new(
                self.client.clone(),
                format!("http://127.0.0.1:{}", self.port),
            )),
        })
    }
}

#[async_trait]
impl ModuleLoader for ProcessEntryLoader {
    async fn load_entry(&self) -> Result<Arc<dyn EntryHandler>, KilnError> {
        let mut running = self.running.lock().await;

        if let Some(current) = running.as_mut() {
            if matches!(current.child.try_wait(), Ok(None)) {
                return Ok(current.handler.clone());
            }
            tracing::warn!("Entry runtime exited, restarting");
        }

        let started = self.spawn().await?;
        let handler = started.handler.clone();
        *running = Some(started);
        Ok(handler)
    }

    async fn invalidate(&self) {
        let mut running = self.running.lock().await;
        if let Some(mut current) = running.take() {
            tracing::debug!("Stopping entry runtime");
            if let Err(e) = current.child.kill().await {
                tracing::warn!("Failed to stop entry runtime: {}", e);
            }
        }
    }
}

/// Forwards standard requests to an HTTP origin.
pub struct ProxyHandler {
    client: reqwest::Client,
    origin: String,
}

impl ProxyHandler {
    /// Creates a handler for `origin` (`http://host:port`).
    pub fn new(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into(),
        }
    }
}

#[async_trait]
impl EntryHandler for ProxyHandler {
    async fn fetch(&self, request: kiln::Request) -> Result<kiln::Response, BoxError> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.origin, path_and_query);

        let mut headers = parts.headers;
        headers.remove(CONTENT_LENGTH);
        headers.remove(TRANSFER_ENCODING);
        if let Some(host) = parts.uri.authority() {
            if let Ok(value) = host.as_str().parse() {
                headers.insert(HOST, value);
            }
        }

        let mut upstream = self.client.request(parts.method, url).headers(headers);
        upstream = match body {
            Body::Empty => upstream,
            Body::Full(bytes) => upstream.body(bytes),
            Body::Stream(stream) => upstream.body(reqwest::Body::wrap_stream(stream)),
        };

        let response = upstream.send().await?;
        if response.headers().contains_key(DEV_ERROR_HEADER) {
            return Err(entry_failure(&response.bytes().await?).into());
        }

        let mut translated = http::Response::builder().status(response.status());
        if let Some(headers) = translated.headers_mut() {
            *headers = response.headers().clone();
            headers.remove(TRANSFER_ENCODING);
        }
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BodyError::Io(e.to_string())));
        Ok(translated.body(Body::from_stream(stream))?)
    }
}

#[derive(Deserialize)]
struct EntryFailure {
    message: String,
    stack: Option<String>,
}

/// Rebuilds an unhandled entry failure reported by the launcher.
fn entry_failure(body: &[u8]) -> CompileError {
    match serde_json::from_slice::<EntryFailure>(body) {
        Ok(failure) => {
            let error = CompileError::new(failure.message);
            match failure.stack {
                Some(stack) => error.with_stack(stack),
                None => error,
            }
        }
        Err(_) => CompileError::new(String::from_utf8_lossy(body).into_owned()),
    }
}
