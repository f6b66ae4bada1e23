// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! View and asset discovery.
//!
//! The [`Manifest`] pairs every template under the views directory with
//! every static file under the assets directory. It is rebuilt before each
//! build phase and whenever the watcher sees a view added or removed.

use crate::config::ValidatedConfig;
use crate::error::{KilnError, Result};
use crate::resolve::to_posix;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A server-renderable template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    /// Posix path relative to the views directory, extension included.
    pub name: String,
    /// Absolute path of the template.
    pub file: PathBuf,
}

/// A static file served verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    /// Posix path relative to the assets directory.
    pub file: String,
    /// Mime type guessed from the extension.
    #[serde(rename = "type")]
    pub mime: Option<String>,
    /// Size in bytes.
    pub size: u64,
}

/// The discovered views and assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Templates, sorted by name.
    pub views: Vec<View>,
    /// Static files, sorted by path.
    pub assets: Vec<Asset>,
}

impl Manifest {
    /// Scans both directories.
    pub fn collect(config: &ValidatedConfig) -> Result<Self> {
        Ok(Self {
            views: collect_views(config)?,
            assets: collect_assets(config)?,
        })
    }

    /// Looks up a view by name.
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }
}

fn scan(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let glob_error = |message: String| KilnError::Glob {
        path: dir.to_path_buf(),
        message,
    };

    let full_pattern = format!("{}/{}", glob::Pattern::escape(&dir.to_string_lossy()), pattern);
    let mut files = Vec::new();
    for entry in glob::glob(&full_pattern).map_err(|e| glob_error(e.to_string()))? {
        let path = entry.map_err(|e| glob_error(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn relative_name(root: &Path, file: &Path) -> String {
    to_posix(file.strip_prefix(root).unwrap_or(file))
}

/// Collects every template under the views directory.
///
/// A view's name is its path relative to the views directory with `/`
/// separators on every platform.
pub fn collect_views(config: &ValidatedConfig) -> Result<Vec<View>> {
    let root = &config.files.views;
    let mut views = Vec::new();

    for ext in &config.view_extensions {
        for file in scan(root, &format!("**/*.{}", ext))? {
            views.push(View {
                name: relative_name(root, &file),
                file,
            });
        }
    }

    views.sort_by(|a, b| a.name.cmp(&b.name));
    views.dedup_by(|a, b| a.name == b.name);
    tracing::debug!("Collected {} views from {}", views.len(), root.display());
    Ok(views)
}

/// Collects every file under the assets directory.
pub fn collect_assets(config: &ValidatedConfig) -> Result<Vec<Asset>> {
    let root = &config.files.assets;
    let mut assets = Vec::new();

    for file in scan(root, "**/*")? {
        let size = fs::metadata(&file)
            .map_err(|e| KilnError::Glob {
                path: file.clone(),
                message: e.to_string(),
            })?
            .len();
        let mime = mime_guess::from_path(&file).first().map(|m| m.essence_str().to_string());
        assets.push(Asset {
            file: relative_name(root, &file),
            mime,
            size,
        });
    }

    assets.sort_by(|a, b| a.file.cmp(&b.file));
    tracing::debug!("Collected {} assets from {}", assets.len(), root.display());
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    fn config_for(root: &Path) -> ValidatedConfig {
        ValidatedConfig::resolve(Config::default(), root).unwrap()
    }

    #[test]
    fn test_collect_views_names_are_posix_relative() {
        let dir = tempdir().unwrap();
        let views = dir.path().join("src/views");
        fs::create_dir_all(views.join("blog/posts")).unwrap();
        fs::write(views.join("index.html"), "").unwrap();
        fs::write(views.join("blog/posts/first.html"), "").unwrap();
        fs::write(views.join("blog/notes.txt"), "").unwrap();

        let collected = collect_views(&config_for(dir.path())).unwrap();
        let names: Vec<_> = collected.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["blog/posts/first.html", "index.html"]);
        assert_eq!(collected[0].file, views.join("blog/posts/first.html"));
    }

    #[test]
    fn test_collect_views_multiple_extensions() {
        let dir = tempdir().unwrap();
        let views = dir.path().join("src/views");
        fs::create_dir_all(&views).unwrap();
        fs::write(views.join("a.html"), "").unwrap();
        fs::write(views.join("b.svelte"), "").unwrap();

        let mut config = config_for(dir.path());
        config.view_extensions = vec!["html".into(), "svelte".into()];
        let names: Vec<_> = collect_views(&config)
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["a.html", "b.svelte"]);
    }

    #[test]
    fn test_collect_assets_mime_and_size() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("static");
        fs::create_dir_all(assets.join("img")).unwrap();
        fs::write(assets.join("img/logo.png"), [0u8; 16]).unwrap();
        fs::write(assets.join("data.unknownext"), "abc").unwrap();

        let collected = collect_assets(&config_for(dir.path())).unwrap();
        assert_eq!(
            collected,
            vec![
                Asset {
                    file: "data.unknownext".into(),
                    mime: None,
                    size: 3
                },
                Asset {
                    file: "img/logo.png".into(),
                    mime: Some("image/png".into()),
                    size: 16
                },
            ]
        );
    }

    #[test]
    fn test_missing_directories_are_empty() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::collect(&config_for(dir.path())).unwrap();
        assert_eq!(manifest, Manifest::default());
    }
}
