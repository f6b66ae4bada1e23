// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Bundler and module loader seams.
//!
//! Kiln does not bundle or execute JavaScript itself. A [`Bundler`] turns a
//! [`BundleJob`] into files on disk, and a [`ModuleLoader`] produces the
//! current [`EntryHandler`] for the dev server.

use crate::error::Result;
use crate::fetch::EntryHandler;
use crate::resolve::to_posix;
use crate::sync::VirtualModuleId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which bundle a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildTarget {
    /// Browser bundle of views and entry.
    Client,
    /// Server bundle of the entry.
    Server,
    /// Service worker bundle.
    ServiceWorker,
}

impl BuildTarget {
    /// Name used for job files and `{phase}` substitution.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTarget::Client => "client",
            BuildTarget::Server => "server",
            BuildTarget::ServiceWorker => "service-worker",
        }
    }
}

/// Everything a bundler needs for one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleJob {
    /// Bundle kind.
    pub phase: BuildTarget,
    /// Project root.
    pub root: PathBuf,
    /// Entry modules.
    pub inputs: Vec<PathBuf>,
    /// Output directory.
    pub out_dir: PathBuf,
    /// Public URL prefix of the output.
    pub base: String,
    /// Import specifier to file mapping.
    pub aliases: BTreeMap<String, PathBuf>,
    /// Whether output names carry a content hash.
    pub hash_file_names: bool,
}

impl BundleJob {
    /// Creates a job with no inputs or aliases.
    pub fn new(phase: BuildTarget, root: &Path, out_dir: &Path) -> Self {
        Self {
            phase,
            root: root.to_path_buf(),
            inputs: Vec::new(),
            out_dir: out_dir.to_path_buf(),
            base: String::new(),
            aliases: BTreeMap::new(),
            hash_file_names: false,
        }
    }

    /// Adds an entry module.
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    /// Maps `specifier` to `path`.
    pub fn alias(mut self, specifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.aliases.insert(specifier.into(), path.into());
        self
    }

    /// Sets the public URL prefix.
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Enables content-hashed file names.
    pub fn hashed(mut self) -> Self {
        self.hash_file_names = true;
        self
    }

    /// Aliases the environment modules found in `generated/env`.
    ///
    /// Private modules are only aliased when `allow_private` is set, so a
    /// client bundle cannot resolve them at all.
    pub fn env_aliases(mut self, generated: &Path, allow_private: bool) -> Self {
        for id in VirtualModuleId::ALL {
            if id.is_private() && !allow_private {
                continue;
            }
            self.aliases
                .insert(id.as_str().to_string(), generated.join("env").join(id.file_name()));
        }
        self
    }
}

/// Files produced by a bundle, relative to its output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOutput {
    /// Posix relative paths, sorted.
    pub files: Vec<String>,
}

impl BundleOutput {
    /// Lists every file under `dir`.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        collect_files(dir, dir, &mut files)?;
        files.sort();
        Ok(Self { files })
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(to_posix(relative));
        }
    }
    Ok(())
}

/// Produces bundles.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Runs `job`. Compile failures are reported as [`crate::KilnError::Compile`].
    async fn bundle(&self, job: BundleJob) -> Result<BundleOutput>;
}

/// Loads the server entry for the dev server.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Returns the current entry, loading it if needed.
    async fn load_entry(&self) -> Result<Arc<dyn EntryHandler>>;

    /// Drops the loaded entry so the next request reloads it.
    async fn invalidate(&self);
}
