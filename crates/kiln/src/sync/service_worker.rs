// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Service worker manifest module.
//!
//! The worker imports this module to learn which URLs it may cache: the
//! bundled client files (`build`) and the static assets accepted by the
//! configured predicate (`files`).

use super::{ArtifactWriter, GENERATED_HEADER};
use crate::config::ValidatedConfig;
use crate::error::Result;
use crate::manifest::Asset;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hashes `chunks` into a short version string.
pub fn hash_version<I, T>(chunks: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.as_ref());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

/// Static asset URLs that pass the service worker predicate.
pub fn cacheable_files(config: &ValidatedConfig, assets: &[Asset]) -> Vec<String> {
    assets
        .iter()
        .filter(|asset| config.service_worker.files.accepts(&asset.file))
        .map(|asset| format!("{}/{}", config.paths.base, asset.file))
        .collect()
}

/// Generates the manifest module.
///
/// `build` holds client bundle files relative to the client output directory.
pub fn render_service_worker_manifest(
    config: &ValidatedConfig,
    assets: &[Asset],
    build: &[String],
    version: &str,
) -> String {
    let build: Vec<String> = build
        .iter()
        .map(|file| format!("{}/{}", config.paths.base, file))
        .collect();
    let files = cacheable_files(config, assets);

    let to_js = |items: &[String]| serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
    let version = serde_json::to_string(version).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        "{}
export const base = /*@__PURE__*/ location.pathname.split('/').slice(0, -1).join('/');

export const build = {};

export const files = {};

export const version = {};
",
        GENERATED_HEADER,
        to_js(&build),
        to_js(&files),
        version
    )
}

/// Writes `<generated>/service-worker.js` and returns its path.
pub fn write_service_worker_manifest(
    writer: &ArtifactWriter,
    generated: &Path,
    config: &ValidatedConfig,
    assets: &[Asset],
    build: &[String],
    version: &str,
) -> Result<PathBuf> {
    let path = generated.join("service-worker.js");
    let content = render_service_worker_manifest(config, assets, build, version);
    writer.write_if_changed(&path, &content)?;
    Ok(path)
}
