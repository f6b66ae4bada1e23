// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Illegal import detection.
//!
//! A view ends up in the client bundle, so it must never reach
//! `$env/static/private` or `$env/dynamic/private`, directly or through
//! other modules. [`check`] walks the import graph depth first from a root
//! module and reports the first chain that does.

use crate::config::ValidatedConfig;
use crate::error::{KilnError, Result};
use crate::imports::{is_relative, scan_imports};
use crate::manifest::View;
use crate::resolve::{normalize_path, resolve_entry, to_posix};
use crate::sync::VirtualModuleId;
use std::fs;
use std::path::{Path, PathBuf};

/// Source of the statically known imports of a module.
pub trait ImportGraph {
    /// Ids imported by `id`. Unknown modules import nothing.
    fn imports(&self, id: &str) -> Vec<String>;
}

fn is_view(id: &str, extensions: &[String]) -> bool {
    Path::new(id)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|v| v == ext))
        .unwrap_or(false)
}

/// Walks the graph from `root` and fails if a private environment module is
/// reachable through a view.
///
/// The returned error names every module on the offending chain, root first.
pub fn check(graph: &dyn ImportGraph, root: &str, view_extensions: &[String]) -> Result<()> {
    let mut chain = vec![root.to_string()];
    walk(graph, &mut chain, view_extensions)
}

fn walk(graph: &dyn ImportGraph, chain: &mut Vec<String>, view_extensions: &[String]) -> Result<()> {
    let Some(current) = chain.last().cloned() else {
        return Ok(());
    };

    for import in graph.imports(&current) {
        if let Some(id) = VirtualModuleId::parse(&import) {
            if id.is_private() && chain.iter().any(|m| is_view(m, view_extensions)) {
                let mut offending = chain.clone();
                offending.push(import);
                return Err(KilnError::IllegalImport {
                    module: id.to_string(),
                    chain: offending,
                });
            }
            continue;
        }

        // Cycles only need to be cut on the current path.
        if chain.contains(&import) {
            continue;
        }

        chain.push(import);
        walk(graph, chain, view_extensions)?;
        chain.pop();
    }

    Ok(())
}

/// Import graph read from source files on disk.
///
/// Module ids are absolute file paths. Relative specifiers are resolved
/// through [`resolve_entry`], `$lib` points at `src/lib` and environment
/// modules are kept as their virtual ids. Bare package imports are not
/// followed since packages cannot import the environment modules.
#[derive(Debug, Clone)]
pub struct StaticImportGraph {
    lib_dir: PathBuf,
}

impl StaticImportGraph {
    /// Creates a graph for the project at `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            lib_dir: root.join("src").join("lib"),
        }
    }

    fn resolve(&self, importer: &Path, specifier: &str) -> Option<String> {
        if VirtualModuleId::parse(specifier).is_some() {
            return Some(specifier.to_string());
        }

        let target = if is_relative(specifier) {
            importer.parent()?.join(specifier)
        } else if specifier == "$lib" {
            self.lib_dir.clone()
        } else if let Some(rest) = specifier.strip_prefix("$lib/") {
            self.lib_dir.join(rest)
        } else {
            return None;
        };

        resolve_entry(&normalize_path(&target)).map(|p| p.to_string_lossy().to_string())
    }
}

impl ImportGraph for StaticImportGraph {
    fn imports(&self, id: &str) -> Vec<String> {
        let path = Path::new(id);
        let Ok(source) = fs::read_to_string(path) else {
            return Vec::new();
        };

        scan_imports(&source)
            .iter()
            .filter_map(|specifier| self.resolve(path, specifier))
            .collect()
    }
}

/// Checks every view and reports chains relative to the project root.
pub fn check_views(graph: &dyn ImportGraph, views: &[View], config: &ValidatedConfig) -> Result<()> {
    for view in views {
        let root = view.file.to_string_lossy().to_string();
        if let Err(KilnError::IllegalImport { module, chain }) =
            check(graph, &root, &config.view_extensions)
        {
            let chain = chain
                .into_iter()
                .map(|id| match Path::new(&id).strip_prefix(&config.root) {
                    Ok(relative) => to_posix(relative),
                    Err(_) => id,
                })
                .collect();
            return Err(KilnError::IllegalImport { module, chain });
        }
    }
    Ok(())
}
