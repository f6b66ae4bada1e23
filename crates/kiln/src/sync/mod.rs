// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Generated artifacts.
//!
//! Every generated module goes through [`ArtifactWriter::write_if_changed`],
//! which compares against the last content written by this process and
//! skips the write when nothing changed. Watching tools rely on mtimes, so
//! rewriting identical files would trigger needless rebuilds.
//!
//! # Layout
//!
//! ```text
//! <out_dir>/
//! ├── ambient.d.ts
//! ├── tsconfig.json
//! └── generated/
//!     ├── internal.js
//!     ├── dev-server.mjs
//!     ├── views.js
//!     ├── service-worker.js
//!     └── env/
//!         ├── static-private.js
//!         ├── static-public.js
//!         ├── dynamic-private.js
//!         └── dynamic-public.js
//! ```

/// Config snapshot module.
pub mod config;
/// Environment modules and declarations.
pub mod env;
/// Dev runtime launcher.
pub mod launcher;
/// Service worker manifest module.
pub mod service_worker;
/// Editor TypeScript configuration.
pub mod tsconfig;
/// View registry module.
pub mod views;

use crate::config::{Mode, ValidatedConfig};
use crate::error::Result;
use crate::manifest::Manifest;
use crate::resolve::resolve_entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use env::{EnvModules, EnvVars, VirtualModule, VirtualModuleId};

/// Header placed at the top of every generated JavaScript module.
pub const GENERATED_HEADER: &str = "// generated by kiln, do not edit\n";

/// Last content written per output path.
///
/// Cloning shares the underlying map. The cache never reads the filesystem:
/// a file edited out of band is rewritten once on the next sync.
#[derive(Debug, Clone, Default)]
pub struct ArtifactCache {
    contents: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl ArtifactCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached content for `path`.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Number of cached paths.
    pub fn len(&self) -> usize {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writes generated files through an [`ArtifactCache`].
#[derive(Debug, Default)]
pub struct ArtifactWriter {
    cache: ArtifactCache,
    writes: AtomicUsize,
}

impl ArtifactWriter {
    /// Creates a writer backed by `cache`.
    pub fn new(cache: ArtifactCache) -> Self {
        Self {
            cache,
            writes: AtomicUsize::new(0),
        }
    }

    /// The cache this writer consults.
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Number of files actually written.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Writes `content` to `path` unless the cache already holds it.
    ///
    /// Returns whether the file was written. The lock is held across the
    /// comparison and the write so concurrent callers never interleave.
    pub fn write_if_changed(&self, path: &Path, content: &str) -> Result<bool> {
        let mut contents = self
            .cache
            .contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if contents.get(path).map(String::as_str) == Some(content) {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        contents.insert(path.to_path_buf(), content.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);

        tracing::debug!("Wrote {}", path.display());
        Ok(true)
    }
}

/// Writes every generated artifact for `manifest`.
///
/// The config and view registry are written before anything else since the
/// server entry imports them. Returns the environment modules so callers can
/// hand them to the bundler.
pub fn sync_all(
    writer: &ArtifactWriter,
    config: &ValidatedConfig,
    manifest: &Manifest,
    mode: Mode,
) -> Result<EnvModules> {
    let generated = config.generated_dir();
    let has_service_worker = resolve_entry(&config.files.service_worker).is_some();

    config::write_config(writer, &generated, config, has_service_worker)?;
    views::write_views(writer, &generated, config, &manifest.views)?;

    let vars = env::load_env(&config.env, mode);
    let modules = EnvModules::new(vars, &config.env);
    env::write_env(writer, &config.out_dir, &modules)?;

    tsconfig::write_tsconfig(writer, config)?;

    Ok(modules)
}
