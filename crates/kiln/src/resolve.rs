// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Entry file resolution.
//!
//! Locates a file on disk from a logical path that may omit its extension
//! or name a directory.
//!
//! # Resolution Algorithm
//!
//! 1. **Directory** (`src/blog`): resolves `src/blog/index` recursively
//! 2. **File** (`src/server.ts`): returned as is
//! 3. **Missing** (`src/server`): the parent directory is scanned for a file
//!    whose name without extension equals `server`
//!
//! When several files share a basename (`server.js`, `server.ts`) the
//! candidates are sorted by file name and the first one wins, so the result
//! never depends on directory enumeration order.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Converts a path to a string with forward slashes.
pub fn to_posix<P: AsRef<Path>>(path: P) -> String {
    let mut result = String::new();
    for component in path.as_ref().components() {
        match component {
            Component::Prefix(p) => result.push_str(&p.as_os_str().to_string_lossy()),
            Component::RootDir => result.push('/'),
            Component::CurDir => push_segment(&mut result, "."),
            Component::ParentDir => push_segment(&mut result, ".."),
            Component::Normal(s) => push_segment(&mut result, &s.to_string_lossy()),
        }
    }
    result
}

fn push_segment(result: &mut String, segment: &str) {
    if !result.is_empty() && !result.ends_with('/') {
        result.push('/');
    }
    result.push_str(segment);
}

/// Lexically removes `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Resolves `path` to an existing file.
///
/// Returns `None` when nothing matches; callers decide whether that is fatal.
pub fn resolve_entry(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        return resolve_entry(&path.join("index"));
    }

    if path.is_file() {
        return Some(path.to_path_buf());
    }

    let parent = path.parent()?;
    let base = path.file_name()?.to_str()?;

    let entries = fs::read_dir(parent).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|candidate| {
            candidate
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|stem| stem == base)
                .unwrap_or(false)
        })
        .collect();

    candidates.sort();
    let found = candidates.into_iter().next();
    if let Some(found) = &found {
        tracing::debug!("Resolved {} to {}", path.display(), found.display());
    }
    found
}
