// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Dependency tracing by static import scanning.
//!
//! Follows the imports of every JavaScript file reachable from the entries:
//!
//! - relative and absolute specifiers through [`resolve_entry`]
//! - bare specifiers through `node_modules` in each ancestor directory,
//!   using the package's `module` or `main` field
//! - runtime built-ins are reported, not followed

use super::{DependencyTracer, Trace, TraceWarning};
use crate::error::Result;
use crate::imports::{is_relative, scan_imports};
use crate::resolve::{normalize_path, resolve_entry};
use lazy_static::lazy_static;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref BUILTINS: HashSet<&'static str> = [
        "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
        "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http",
        "http2", "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process",
        "punycode", "querystring", "readline", "repl", "stream", "string_decoder", "sys",
        "timers", "tls", "trace_events", "tty", "url", "util", "v8", "vm", "wasi",
        "worker_threads", "zlib",
    ]
    .into_iter()
    .collect();
}

const SCANNED_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// Whether `specifier` names a runtime built-in module.
pub fn is_builtin(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let name = specifier.split('/').next().unwrap_or(specifier);
    BUILTINS.contains(name)
}

/// Splits `@scope/name/sub/path` into `@scope/name` and `sub/path`.
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let mut boundary = 0;
    let mut slashes = 0;
    let needed = if specifier.starts_with('@') { 2 } else { 1 };
    for (index, ch) in specifier.char_indices() {
        if ch == '/' {
            slashes += 1;
            if slashes == needed {
                boundary = index;
                break;
            }
        }
    }
    if boundary == 0 {
        (specifier, None)
    } else {
        (&specifier[..boundary], Some(&specifier[boundary + 1..]))
    }
}

/// Traces by scanning static imports.
#[derive(Debug, Clone, Default)]
pub struct StaticTracer;

impl StaticTracer {
    /// Creates a tracer.
    pub fn new() -> Self {
        Self
    }

    fn resolve_package(&self, specifier: &str, from: &Path, files: &mut BTreeSet<PathBuf>) -> Option<PathBuf> {
        let (name, subpath) = split_package(specifier);

        for dir in from.ancestors() {
            let package_dir = dir.join("node_modules").join(name);
            if !package_dir.is_dir() {
                continue;
            }

            if let Some(subpath) = subpath {
                return resolve_entry(&package_dir.join(subpath));
            }

            let manifest = package_dir.join("package.json");
            let main = fs::read_to_string(&manifest)
                .ok()
                .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
                .and_then(|json| {
                    ["module", "main"]
                        .iter()
                        .find_map(|field| json.get(*field).and_then(|v| v.as_str()).map(str::to_string))
                });
            if manifest.is_file() {
                files.insert(manifest);
            }

            return match main {
                Some(main) => resolve_entry(&normalize_path(&package_dir.join(main))),
                None => resolve_entry(&package_dir.join("index")),
            };
        }
        None
    }
}

impl DependencyTracer for StaticTracer {
    fn trace(&self, entries: &[PathBuf]) -> Result<Trace> {
        let mut trace = Trace::default();
        let mut queue: VecDeque<PathBuf> = entries.iter().cloned().collect();

        while let Some(file) = queue.pop_front() {
            if !trace.files.insert(file.clone()) {
                continue;
            }

            let scanned = file
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| SCANNED_EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if !scanned {
                continue;
            }

            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(e) => {
                    trace.warnings.push(TraceWarning::ParseFailure {
                        file: file.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
            for specifier in scan_imports(&source) {
                if is_builtin(&specifier) {
                    trace.warnings.push(TraceWarning::Builtin {
                        specifier,
                        importer: file.clone(),
                    });
                    continue;
                }

                let resolved = if is_relative(&specifier) || specifier.starts_with('/') {
                    resolve_entry(&normalize_path(&dir.join(&specifier)))
                } else {
                    self.resolve_package(&specifier, &dir, &mut trace.files)
                };

                match resolved {
                    Some(path) => queue.push_back(path),
                    None => trace.warnings.push(TraceWarning::Unresolved {
                        specifier,
                        importer: file.clone(),
                    }),
                }
            }
        }

        tracing::debug!(
            "Traced {} files ({} warnings)",
            trace.files.len(),
            trace.warnings.len()
        );
        Ok(trace)
    }
}
