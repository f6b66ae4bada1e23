// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The capability object handed to adapters.
//!
//! A [`Builder`] knows where the build wrote its output and offers the file
//! operations adapters need to turn it into deployable artifacts. Every path
//! it returns is a pure function of the configuration, and the copy methods
//! give the same result when called twice on the same input.

use crate::config::ValidatedConfig;
use crate::error::Result;
use crate::manifest::Asset;
use crate::resolve::to_posix;
use console::style;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions that get `.gz` and `.br` siblings.
pub const COMPRESSIBLE: &[&str] = &["html", "js", "mjs", "json", "css", "svg", "xml", "wasm"];

/// Output for adapter progress messages.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    quiet: bool,
}

impl Logger {
    /// Creates a logger; a quiet logger only prints errors.
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Plain information.
    pub fn info(&self, message: impl AsRef<str>) {
        tracing::debug!("{}", message.as_ref());
        if !self.quiet {
            println!("  {}", message.as_ref());
        }
    }

    /// A completed step.
    pub fn success(&self, message: impl AsRef<str>) {
        tracing::debug!("{}", message.as_ref());
        if !self.quiet {
            println!("{} {}", style("✓").green(), message.as_ref());
        }
    }

    /// Something the user should look at.
    pub fn warn(&self, message: impl AsRef<str>) {
        tracing::warn!("{}", message.as_ref());
        if !self.quiet {
            println!("{} {}", style("!").yellow(), style(message.as_ref()).yellow());
        }
    }

    /// A failure.
    pub fn error(&self, message: impl AsRef<str>) {
        tracing::error!("{}", message.as_ref());
        eprintln!("{} {}", style("✗").red(), style(message.as_ref()).red());
    }

    /// Low priority detail.
    pub fn minor(&self, message: impl AsRef<str>) {
        tracing::debug!("{}", message.as_ref());
        if !self.quiet {
            println!("  {}", style(message.as_ref()).dim());
        }
    }
}

/// Data produced by a build and handed to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildData {
    /// Sub path for bundled client assets.
    pub app_dir: String,
    /// `app_dir` prefixed with the base path, without leading slash.
    pub app_path: String,
    /// Static assets.
    pub assets: Vec<Asset>,
    /// Service worker file relative to the client directory, if built.
    pub service_worker: Option<String>,
    /// Server entry relative to the server directory.
    pub server_entry: String,
}

impl BuildData {
    /// Creates build data for `config`.
    pub fn new(config: &ValidatedConfig, assets: Vec<Asset>) -> Self {
        let base = config.paths.base.trim_start_matches('/');
        let app_path = if base.is_empty() {
            config.app_dir.clone()
        } else {
            format!("{}/{}", base, config.app_dir)
        };

        Self {
            app_dir: config.app_dir.clone(),
            app_path,
            assets,
            service_worker: None,
            server_entry: "index.js".to_string(),
        }
    }
}

type Filter = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Options for [`Builder::copy`].
#[derive(Default)]
pub struct CopyOptions {
    filter: Option<Filter>,
    replace: BTreeMap<String, String>,
}

impl CopyOptions {
    /// Copies only files whose relative posix path passes `filter`.
    pub fn filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Replaces every occurrence of `token` with `value` in copied text files.
    pub fn replace(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.replace.insert(token.into(), value.into());
        self
    }

    fn accepts(&self, relative: &str) -> bool {
        self.filter.as_ref().map(|f| f(relative)).unwrap_or(true)
    }
}

/// Removes a file or directory tree if it exists.
pub fn rimraf(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(_) => {}
    }
    Ok(())
}

/// Creates a directory and its parents.
pub fn mkdirp(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Build output access for adapters.
pub struct Builder {
    config: Arc<ValidatedConfig>,
    build_data: BuildData,
    log: Logger,
}

impl Builder {
    /// Creates a builder over a finished build.
    pub fn new(config: Arc<ValidatedConfig>, build_data: BuildData, log: Logger) -> Self {
        Self {
            config,
            build_data,
            log,
        }
    }

    /// Progress output.
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// The resolved configuration.
    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// The build's hand-off data.
    pub fn build_data(&self) -> &BuildData {
        &self.build_data
    }

    /// See [`rimraf`].
    pub fn rimraf(&self, path: &Path) -> Result<()> {
        rimraf(path)
    }

    /// See [`mkdirp`].
    pub fn mkdirp(&self, path: &Path) -> Result<()> {
        mkdirp(path)
    }

    /// A scratch directory for adapter `name` under the output directory.
    pub fn get_build_directory(&self, name: &str) -> PathBuf {
        self.config.out_dir.join(name)
    }

    /// Bundled client files and copied assets.
    pub fn get_client_directory(&self) -> PathBuf {
        self.config.output_dir().join("client")
    }

    /// Bundled server files.
    pub fn get_server_directory(&self) -> PathBuf {
        self.config.output_dir().join("server")
    }

    /// Path of the bundled client assets relative to the site root.
    pub fn get_app_path(&self) -> &str {
        &self.build_data.app_path
    }

    /// Absolute path of the bundled server entry.
    pub fn get_server_entry(&self) -> PathBuf {
        self.get_server_directory().join(&self.build_data.server_entry)
    }

    /// Copies the client output to `dest`.
    pub fn write_client(&self, dest: &Path) -> Result<Vec<String>> {
        self.copy(&self.get_client_directory(), dest, &CopyOptions::default())
    }

    /// Copies the server output to `dest`.
    pub fn write_server(&self, dest: &Path) -> Result<Vec<String>> {
        self.copy(&self.get_server_directory(), dest, &CopyOptions::default())
    }

    /// Copies a file or directory tree, returning the copied relative paths.
    ///
    /// When `from` is a file, `to` is the destination file.
    pub fn copy(&self, from: &Path, to: &Path, options: &CopyOptions) -> Result<Vec<String>> {
        copy(from, to, options)
    }

    /// Writes `.gz` and `.br` siblings for compressible files under `dir`.
    pub fn compress(&self, dir: &Path) -> Result<()> {
        compress(dir)
    }
}

/// Copies a file or directory tree. See [`Builder::copy`].
pub fn copy(from: &Path, to: &Path, options: &CopyOptions) -> Result<Vec<String>> {
    let mut copied = Vec::new();

    if from.is_file() {
        let name = from
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if options.accepts(&name) {
            copy_file(from, to, options)?;
            copied.push(name);
        }
        return Ok(copied);
    }

    copy_dir(from, from, to, options, &mut copied)?;
    copied.sort();
    Ok(copied)
}

fn copy_dir(
    root: &Path,
    dir: &Path,
    to: &Path,
    options: &CopyOptions,
    copied: &mut Vec<String>,
) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            copy_dir(root, &path, to, options, copied)?;
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let relative_str = to_posix(relative);
        if !options.accepts(&relative_str) {
            continue;
        }
        copy_file(&path, &to.join(relative), options)?;
        copied.push(relative_str);
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path, options: &CopyOptions) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    if options.replace.is_empty() {
        fs::copy(from, to)?;
        return Ok(());
    }

    match fs::read_to_string(from) {
        Ok(text) => {
            let tokens = token_pattern(&options.replace)?;
            let text = tokens.replace_all(&text, |caps: &Captures| {
                options.replace.get(&caps[0]).cloned().unwrap_or_default()
            });
            fs::write(to, text.as_ref())?;
        }
        Err(_) => {
            fs::copy(from, to)?;
        }
    }
    Ok(())
}

/// One alternation over every token, longest first, so replacement values
/// are never scanned again.
fn token_pattern(replace: &BTreeMap<String, String>) -> Result<Regex> {
    let mut tokens: Vec<&String> = replace.keys().collect();
    tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let pattern = tokens
        .iter()
        .map(|token| regex::escape(token))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e).into())
}

fn is_compressible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| COMPRESSIBLE.contains(&ext))
        .unwrap_or(false)
}

/// Writes `.gz` and `.br` siblings. See [`Builder::compress`].
pub fn compress(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            compress(&path)?;
        } else if is_compressible(&path) {
            compress_file(&path)?;
        }
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn compress_file(path: &Path) -> Result<()> {
    let data = fs::read(path)?;

    let mut gz = GzEncoder::new(Vec::new(), Compression::best());
    gz.write_all(&data)?;
    fs::write(sibling(path, ".gz"), gz.finish()?)?;

    let mut br = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut br, 4096, 11, 22);
        writer.write_all(&data)?;
        writer.flush()?;
    }
    fs::write(sibling(path, ".br"), br)?;

    tracing::debug!("Compressed {}", path.display());
    Ok(())
}
