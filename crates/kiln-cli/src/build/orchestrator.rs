// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Build orchestration.
//!
//! Runs the client and server bundles in order, writes the service worker
//! manifest and hands the result to the adapter. A failing step aborts the
//! build and leaves partial output on disk.

use super::{BuildPhase, BuildState};
use kiln::adapter;
use kiln::builder::{self, CopyOptions};
use kiln::guard::check_views;
use kiln::resolve::resolve_entry;
use kiln::sync::{self, service_worker};
use kiln::{
    ArtifactWriter, BuildData, BuildTarget, Builder, BundleJob, BundleOutput, Bundler, CompileError,
    KilnError, Logger, Manifest, Mode, Result, StaticImportGraph, ValidatedConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a finished build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Views and assets the build saw.
    pub manifest: Manifest,
    /// Client bundle files, relative to `<app_dir>/immutable`.
    pub client: BundleOutput,
    /// Server bundle files, relative to the server directory.
    pub server: BundleOutput,
    /// Data handed to the adapter.
    pub build_data: BuildData,
}

/// Runs a production build.
pub struct BuildOrchestrator {
    config: Arc<ValidatedConfig>,
    bundler: Arc<dyn Bundler>,
    writer: ArtifactWriter,
    mode: Mode,
    log: Logger,
    state: BuildState,
}

impl BuildOrchestrator {
    /// Creates an orchestrator.
    pub fn new(
        config: Arc<ValidatedConfig>,
        bundler: Arc<dyn Bundler>,
        writer: ArtifactWriter,
        mode: Mode,
        log: Logger,
    ) -> Self {
        Self {
            config,
            bundler,
            writer,
            mode,
            log,
            state: BuildState::default(),
        }
    }

    /// Current build phase.
    pub fn phase(&self) -> BuildPhase {
        self.state.phase()
    }

    /// Artifact writer shared with the sync step.
    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    fn client_dir(&self) -> PathBuf {
        self.config.output_dir().join("client")
    }

    fn immutable_dir(&self) -> PathBuf {
        self.client_dir().join(&self.config.app_dir).join("immutable")
    }

    /// Runs every build step except the adapter.
    pub async fn build(&mut self) -> Result<BuildReport> {
        self.state.reset();

        let entry = resolve_entry(&self.config.files.entry)
            .ok_or_else(|| KilnError::NoEntryFile(self.config.files.entry.clone()))?;
        builder::rimraf(&self.config.output_dir())?;

        let manifest = Manifest::collect(&self.config)?;
        let client = self.build_client(&entry, &manifest).await?;
        let server = self.build_server(&entry).await?;

        let mut build_data = BuildData::new(&self.config, manifest.assets.clone());
        build_data.server_entry = server_entry(&server, &entry)?;
        build_data.service_worker = self.build_service_worker(&manifest, &client).await?;

        Ok(BuildReport {
            manifest,
            client,
            server,
            build_data,
        })
    }

    async fn build_client(&mut self, entry: &Path, manifest: &Manifest) -> Result<BundleOutput> {
        self.log.minor("Writing generated modules");
        sync::sync_all(&self.writer, &self.config, manifest, self.mode)?;

        let graph = StaticImportGraph::new(&self.config.root);
        check_views(&graph, &manifest.views, &self.config)?;

        let mut job = BundleJob::new(BuildTarget::Client, &self.config.root, &self.immutable_dir())
            .base(self.config.paths.base.clone())
            .hashed()
            .env_aliases(&self.config.generated_dir(), false);
        for view in &manifest.views {
            job = job.input(&view.file);
        }
        job = job.input(entry);

        let output = self.bundler.bundle(job).await?;
        self.log
            .success(format!("Client bundle: {} files", output.files.len()));

        let copied = builder::copy(&self.config.files.assets, &self.client_dir(), &CopyOptions::default())?;
        if !copied.is_empty() {
            self.log.minor(format!("Copied {} static files", copied.len()));
        }

        self.state
            .advance(BuildPhase::AwaitingClient, BuildPhase::AwaitingServer)?;
        Ok(output)
    }

    async fn build_server(&mut self, entry: &Path) -> Result<BundleOutput> {
        let generated = self.config.generated_dir();
        let job = BundleJob::new(
            BuildTarget::Server,
            &self.config.root,
            &self.config.output_dir().join("server"),
        )
        .input(entry)
        .input(generated.join("internal.js"))
        .env_aliases(&generated, true);

        let output = self.bundler.bundle(job).await?;
        self.log
            .success(format!("Server bundle: {} files", output.files.len()));

        self.state
            .advance(BuildPhase::AwaitingServer, BuildPhase::Done)?;
        Ok(output)
    }

    async fn build_service_worker(
        &mut self,
        manifest: &Manifest,
        client: &BundleOutput,
    ) -> Result<Option<String>> {
        let Some(source) = resolve_entry(&self.config.files.service_worker) else {
            return Ok(None);
        };
        if self.state.phase() != BuildPhase::Done {
            return Err(KilnError::BuildState(
                "service worker requires a finished server bundle".to_string(),
            ));
        }

        let immutable = self.immutable_dir();
        let prefix = format!("{}/immutable", self.config.app_dir);
        let build: Vec<String> = client
            .files
            .iter()
            .map(|file| format!("{}/{}", prefix, file))
            .collect();

        let version = match &self.config.version {
            Some(version) => version.clone(),
            None => {
                let mut chunks = Vec::with_capacity(client.files.len());
                for file in &client.files {
                    chunks.push(fs::read(immutable.join(file))?);
                }
                service_worker::hash_version(chunks)
            }
        };

        let generated = self.config.generated_dir();
        let manifest_module = service_worker::write_service_worker_manifest(
            &self.writer,
            &generated,
            &self.config,
            &manifest.assets,
            &build,
            &version,
        )?;

        let job = BundleJob::new(BuildTarget::ServiceWorker, &self.config.root, &self.client_dir())
            .input(&source)
            .alias("$service-worker", manifest_module)
            .base(self.config.paths.base.clone())
            .env_aliases(&generated, false);
        self.bundler.bundle(job).await?;

        let file = "service-worker.js".to_string();
        self.log
            .success(format!("Service worker: {} (version {})", file, version));
        tracing::debug!("Service worker caches {} build files", build.len());
        Ok(Some(file))
    }

    /// Runs the configured adapter.
    ///
    /// Returns `false` without error when no adapter is configured.
    pub async fn adapt(&self, build_data: BuildData) -> Result<bool> {
        let Some(config) = &self.config.adapter else {
            return Ok(false);
        };

        let adapter = adapter::from_config(config);
        self.log.info(format!("Using {} adapter", adapter.name()));
        let builder = Builder::new(self.config.clone(), build_data, self.log.clone());
        adapter.adapt(&builder).await?;
        Ok(true)
    }
}

/// The file the server bundle produced for `entry`.
///
/// Outputs sharing the entry's file stem are candidates. JavaScript files
/// win over other extensions, then the shallowest path, then the first in
/// sorted order.
fn server_entry(output: &BundleOutput, entry: &Path) -> Result<String> {
    let stem = entry.file_stem();
    output
        .files
        .iter()
        .filter(|file| Path::new(file).file_stem() == stem)
        .min_by_key(|file| {
            let script = matches!(
                Path::new(file).extension().and_then(|e| e.to_str()),
                Some("js" | "mjs" | "cjs")
            );
            (!script, file.matches('/').count())
        })
        .cloned()
        .ok_or_else(|| {
            KilnError::Compile(CompileError::new(format!(
                "Server bundle has no output for {}",
                entry.display()
            )))
        })
}
