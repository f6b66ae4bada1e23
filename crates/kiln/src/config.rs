// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Kiln project configuration.
//!
//! Configuration is loaded from `kiln.toml` at the project root, validated
//! field by field and resolved into a [`ValidatedConfig`] whose paths are
//! absolute.
//!
//! # Example Configuration
//!
//! ```toml
//! out_dir = ".kiln"
//! app_dir = "_app"
//!
//! [files]
//! views = "src/views"
//! entry = "src/server"
//!
//! [paths]
//! base = "/docs"
//!
//! [env]
//! public_prefix = "PUBLIC_"
//!
//! [service_worker]
//! exclude = ["**/.DS_Store", "**/*.map"]
//!
//! [adapter]
//! name = "node"
//! out = "build"
//! ```

use crate::error::{FieldError, KilnError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Raw configuration as written in `kiln.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Build output directory (default: ".kiln").
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    /// Sub path for bundled client assets (default: "_app").
    #[serde(default = "default_app_dir")]
    pub app_dir: String,
    /// Explicit version name; a content hash is used when absent.
    #[serde(default)]
    pub version: Option<String>,
    /// Source file locations.
    #[serde(default)]
    pub files: FilesConfig,
    /// URL prefixes.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Environment variable handling.
    #[serde(default)]
    pub env: EnvConfig,
    /// Service worker options.
    #[serde(default)]
    pub service_worker: ServiceWorkerConfig,
    /// View discovery options.
    #[serde(default)]
    pub views: ViewsConfig,
    /// Deployment adapter.
    #[serde(default)]
    pub adapter: Option<AdapterConfig>,
    /// Development server settings.
    #[serde(default)]
    pub dev: DevConfig,
    /// External bundler command.
    #[serde(default)]
    pub bundler: BundlerConfig,
}

/// Locations of user source files, relative to the project root.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Static assets served verbatim (default: "static").
    #[serde(default = "default_assets_dir")]
    pub assets: String,
    /// View templates (default: "src/views").
    #[serde(default = "default_views_dir")]
    pub views: String,
    /// Server entry, resolved without extension (default: "src/server").
    #[serde(default = "default_entry")]
    pub entry: String,
    /// Service worker entry, resolved without extension (default: "src/service-worker").
    #[serde(default = "default_service_worker")]
    pub service_worker: String,
}

/// URL prefixes the application is mounted under.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Root-relative mount path, e.g. "/docs" (default: "").
    #[serde(default)]
    pub base: String,
    /// Absolute URL assets are served from (default: "").
    #[serde(default)]
    pub assets: String,
}

/// Environment variable configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvConfig {
    /// Directory `.env` files are loaded from (default: ".").
    #[serde(default = "default_env_dir")]
    pub dir: String,
    /// Prefix of variables safe to expose to clients (default: "PUBLIC_").
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    /// Prefix of private variables; empty means "everything not public".
    #[serde(default)]
    pub private_prefix: String,
}

/// Service worker options.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceWorkerConfig {
    /// Whether the generated runtime registers the worker (default: true).
    #[serde(default = "default_true")]
    pub register: bool,
    /// Globs of static files left out of the worker manifest.
    #[serde(default = "default_sw_exclude")]
    pub exclude: Vec<String>,
}

/// View discovery options.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewsConfig {
    /// File extensions treated as templates (default: ["html"]).
    #[serde(default = "default_view_extensions")]
    pub extensions: Vec<String>,
}

/// Deployment adapter selection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum AdapterConfig {
    /// Standalone Node server.
    Node(NodeAdapterOptions),
    /// Vercel build output.
    Vercel(VercelAdapterOptions),
}

/// Options of the Node adapter.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeAdapterOptions {
    /// Output directory (default: "build").
    #[serde(default = "default_node_out")]
    pub out: String,
    /// Write `.gz`/`.br` siblings for static files (default: true).
    #[serde(default = "default_true")]
    pub precompress: bool,
    /// Prefix for the server's runtime environment variables (default: "").
    #[serde(default)]
    pub env_prefix: String,
}

/// Options of the Vercel adapter.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VercelAdapterOptions {
    /// Function runtime (default: "nodejs20.x").
    #[serde(default = "default_vercel_runtime")]
    pub runtime: String,
    /// Deployment regions.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Memory in MB.
    #[serde(default)]
    pub memory: Option<u32>,
    /// Maximum duration in seconds.
    #[serde(default)]
    pub max_duration: Option<u32>,
}

/// Development server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DevConfig {
    /// Server host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port (default: 5173).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body in bytes, 0 for unlimited (default: 512 KiB).
    #[serde(default = "default_body_size_limit")]
    pub body_size_limit: u64,
    /// Command running the dev server; `{entry}` is replaced by the generated
    /// `dev-server.mjs` launcher that imports the server entry.
    #[serde(default = "default_runtime")]
    pub runtime: Vec<String>,
    /// Port handed to the runtime through `PORT` (default: 5174).
    #[serde(default = "default_runtime_port")]
    pub runtime_port: u16,
}

/// External bundler invocation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundlerConfig {
    /// Executable to run. Builds without a bundler only copy sources.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments; `{job}`, `{phase}` and `{outdir}` are substituted.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_out_dir() -> String {
    ".kiln".to_string()
}

fn default_app_dir() -> String {
    "_app".to_string()
}

fn default_assets_dir() -> String {
    "static".to_string()
}

fn default_views_dir() -> String {
    "src/views".to_string()
}

fn default_entry() -> String {
    "src/server".to_string()
}

fn default_service_worker() -> String {
    "src/service-worker".to_string()
}

fn default_env_dir() -> String {
    ".".to_string()
}

fn default_public_prefix() -> String {
    "PUBLIC_".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sw_exclude() -> Vec<String> {
    vec!["**/.DS_Store".to_string(), ".DS_Store".to_string()]
}

fn default_view_extensions() -> Vec<String> {
    vec!["html".to_string()]
}

fn default_node_out() -> String {
    "build".to_string()
}

fn default_vercel_runtime() -> String {
    "nodejs20.x".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5173
}

fn default_body_size_limit() -> u64 {
    512 * 1024
}

fn default_runtime() -> Vec<String> {
    vec!["node".to_string(), "{entry}".to_string()]
}

fn default_runtime_port() -> u16 {
    5174
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            assets: default_assets_dir(),
            views: default_views_dir(),
            entry: default_entry(),
            service_worker: default_service_worker(),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            dir: default_env_dir(),
            public_prefix: default_public_prefix(),
            private_prefix: String::new(),
        }
    }
}

impl Default for ServiceWorkerConfig {
    fn default() -> Self {
        Self {
            register: true,
            exclude: default_sw_exclude(),
        }
    }
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            extensions: default_view_extensions(),
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_size_limit: default_body_size_limit(),
            runtime: default_runtime(),
            runtime_port: default_runtime_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            app_dir: default_app_dir(),
            version: None,
            files: FilesConfig::default(),
            paths: PathsConfig::default(),
            env: EnvConfig::default(),
            service_worker: ServiceWorkerConfig::default(),
            views: ViewsConfig::default(),
            adapter: None,
            dev: DevConfig::default(),
            bundler: BundlerConfig::default(),
        }
    }
}

impl Config {
    /// Parses a `kiln.toml` document.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            KilnError::ConfigParse(vec![FieldError::new("", e.message().to_string())])
        })
    }
}

/// Build mode, used to pick `.env.<mode>` files and error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `kiln dev`.
    Development,
    /// `kiln build` and deployed output.
    Production,
}

impl Mode {
    /// Returns the mode name used in `.env.<mode>` files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

/// Absolute locations of user source files.
#[derive(Debug, Clone)]
pub struct ResolvedFiles {
    /// Static assets directory.
    pub assets: PathBuf,
    /// Views directory.
    pub views: PathBuf,
    /// Server entry, without extension.
    pub entry: PathBuf,
    /// Service worker entry, without extension.
    pub service_worker: PathBuf,
}

/// Environment settings with an absolute `.env` directory.
#[derive(Debug, Clone)]
pub struct ResolvedEnv {
    /// Directory `.env` files are loaded from.
    pub dir: PathBuf,
    /// Public prefix.
    pub public_prefix: String,
    /// Private prefix.
    pub private_prefix: String,
}

/// Decides which static files enter the service worker manifest.
#[derive(Debug, Clone)]
pub struct FilePredicate {
    exclude: GlobSet,
}

impl FilePredicate {
    /// Builds a predicate rejecting files matching any of `patterns`.
    pub fn from_excludes(patterns: &[String]) -> std::result::Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            exclude: builder.build()?,
        })
    }

    /// Returns true when `filename` (posix, relative to the assets dir) is accepted.
    pub fn accepts(&self, filename: &str) -> bool {
        !self.exclude.is_match(filename)
    }
}

/// Resolved service worker options.
#[derive(Debug, Clone)]
pub struct ResolvedServiceWorker {
    /// Whether the runtime registers the worker.
    pub register: bool,
    /// File selection predicate.
    pub files: FilePredicate,
}

/// Configuration after validation, with absolute paths.
///
/// Constructed once per process and shared by reference; never mutated.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    /// Project root.
    pub root: PathBuf,
    /// Absolute output directory.
    pub out_dir: PathBuf,
    /// Sub path for bundled client assets.
    pub app_dir: String,
    /// Explicit version name.
    pub version: Option<String>,
    /// Source locations.
    pub files: ResolvedFiles,
    /// URL prefixes.
    pub paths: PathsConfig,
    /// Environment settings.
    pub env: ResolvedEnv,
    /// Service worker options.
    pub service_worker: ResolvedServiceWorker,
    /// Template extensions without leading dot.
    pub view_extensions: Vec<String>,
    /// Deployment adapter.
    pub adapter: Option<AdapterConfig>,
    /// Development server settings.
    pub dev: DevConfig,
    /// External bundler.
    pub bundler: BundlerConfig,
}

impl ValidatedConfig {
    /// Loads `kiln.toml` from `root`, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns [`KilnError::ConfigParse`] if the file cannot be parsed or
    /// any field fails validation.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Config::parse(&content)?
        } else {
            tracing::debug!("No {} found, using defaults", CONFIG_FILE);
            Config::default()
        };

        Self::resolve(config, root)
    }

    /// Validates `config` and makes every path absolute against `root`.
    pub fn resolve(config: Config, root: &Path) -> Result<Self> {
        validate_config(&config).map_err(KilnError::ConfigParse)?;

        let files = FilePredicate::from_excludes(&config.service_worker.exclude).map_err(|e| {
            KilnError::ConfigParse(vec![FieldError::new("service_worker.exclude", e.to_string())])
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            out_dir: root.join(&config.out_dir),
            app_dir: config.app_dir,
            version: config.version,
            files: ResolvedFiles {
                assets: root.join(&config.files.assets),
                views: root.join(&config.files.views),
                entry: root.join(&config.files.entry),
                service_worker: root.join(&config.files.service_worker),
            },
            paths: config.paths,
            env: ResolvedEnv {
                dir: root.join(&config.env.dir),
                public_prefix: config.env.public_prefix,
                private_prefix: config.env.private_prefix,
            },
            service_worker: ResolvedServiceWorker {
                register: config.service_worker.register,
                files,
            },
            view_extensions: config
                .views
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
            adapter: config.adapter,
            dev: config.dev,
            bundler: config.bundler,
        })
    }

    /// Directory holding generated modules.
    pub fn generated_dir(&self) -> PathBuf {
        self.out_dir.join("generated")
    }

    /// Directory holding bundler output.
    pub fn output_dir(&self) -> PathBuf {
        self.out_dir.join("output")
    }

    /// Returns true if `path` has one of the configured view extensions.
    pub fn is_view_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.view_extensions.iter().any(|v| v == ext))
            .unwrap_or(false)
    }

    /// Request body limit, `None` when unlimited.
    pub fn body_size_limit(&self) -> Option<u64> {
        match self.dev.body_size_limit {
            0 => None,
            limit => Some(limit),
        }
    }
}

/// Validates a raw configuration.
///
/// This is a pure function: it never touches the filesystem. Every failing
/// field is reported, not only the first one.
pub fn validate_config(config: &Config) -> std::result::Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if config.out_dir.trim().is_empty() {
        errors.push(FieldError::new("out_dir", "cannot be empty"));
    }

    if config.app_dir.is_empty() {
        errors.push(FieldError::new("app_dir", "cannot be empty"));
    } else if config.app_dir.starts_with('/') || config.app_dir.ends_with('/') {
        errors.push(FieldError::new("app_dir", "cannot start or end with '/'"));
    }

    let base = &config.paths.base;
    if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
        errors.push(FieldError::new(
            "paths.base",
            "must either be the empty string or a root-relative path that starts but doesn't end with '/'",
        ));
    }

    let assets = &config.paths.assets;
    if !assets.is_empty() {
        if !(assets.starts_with("http://") || assets.starts_with("https://")) {
            errors.push(FieldError::new(
                "paths.assets",
                "must be an absolute URL (http:// or https://) or the empty string",
            ));
        } else if assets.ends_with('/') {
            errors.push(FieldError::new("paths.assets", "cannot end with '/'"));
        }
    }

    let env = &config.env;
    if env.public_prefix == env.private_prefix {
        errors.push(FieldError::new(
            "env.private_prefix",
            "cannot be the same as env.public_prefix",
        ));
    }

    if config.views.extensions.is_empty() {
        errors.push(FieldError::new("views.extensions", "must list at least one extension"));
    }
    for ext in &config.views.extensions {
        let ext = ext.trim_start_matches('.');
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            errors.push(FieldError::new(
                "views.extensions",
                format!("'{}' is not a valid file extension", ext),
            ));
        }
    }

    for pattern in &config.service_worker.exclude {
        if let Err(e) = Glob::new(pattern) {
            errors.push(FieldError::new("service_worker.exclude", e.to_string()));
        }
    }

    if config.dev.runtime.is_empty() {
        errors.push(FieldError::new("dev.runtime", "must contain a command"));
    }

    if let Some(AdapterConfig::Vercel(options)) = &config.adapter {
        if options.max_duration == Some(0) {
            errors.push(FieldError::new("adapter.max_duration", "must be greater than 0"));
        }
        if let Some(memory) = options.memory {
            if !(128..=3009).contains(&memory) {
                errors.push(FieldError::new("adapter.memory", "must be between 128 and 3009"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_resolve_makes_paths_absolute() {
        let root = Path::new("/project");
        let config = ValidatedConfig::resolve(Config::default(), root).unwrap();
        assert_eq!(config.out_dir, PathBuf::from("/project/.kiln"));
        assert_eq!(config.files.views, PathBuf::from("/project/src/views"));
        assert_eq!(config.files.entry, PathBuf::from("/project/src/server"));
        assert_eq!(config.generated_dir(), PathBuf::from("/project/.kiln/generated"));
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
app_dir = "assets"

[paths]
base = "/docs"

[views]
extensions = [".html", "svelte"]

[adapter]
name = "vercel"
regions = ["fra1"]
memory = 1024
"#,
        )
        .unwrap();
        assert_eq!(config.app_dir, "assets");
        assert_eq!(config.paths.base, "/docs");
        assert_eq!(
            config.adapter,
            Some(AdapterConfig::Vercel(VercelAdapterOptions {
                runtime: "nodejs20.x".into(),
                regions: vec!["fra1".into()],
                memory: Some(1024),
                max_duration: None,
            }))
        );

        let resolved = ValidatedConfig::resolve(config, Path::new("/p")).unwrap();
        assert_eq!(resolved.view_extensions, vec!["html", "svelte"]);
        assert!(resolved.is_view_file(Path::new("/p/src/views/a.svelte")));
        assert!(!resolved.is_view_file(Path::new("/p/src/views/a.js")));
    }

    #[test]
    fn test_validation_reports_every_field() {
        let mut config = Config::default();
        config.app_dir = "/_app".into();
        config.paths.base = "docs/".into();
        config.paths.assets = "cdn.example.com".into();
        config.env.private_prefix = "PUBLIC_".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["app_dir", "paths.base", "paths.assets", "env.private_prefix"]
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::parse("app_dir = [").unwrap_err();
        assert!(matches!(err, KilnError::ConfigParse(_)));
    }

    #[test]
    fn test_file_predicate() {
        let predicate =
            FilePredicate::from_excludes(&["**/*.map".to_string(), ".DS_Store".to_string()]).unwrap();
        assert!(predicate.accepts("favicon.png"));
        assert!(!predicate.accepts("js/app.js.map"));
        assert!(!predicate.accepts(".DS_Store"));
    }

    #[test]
    fn test_body_size_limit_zero_is_unlimited() {
        let mut config = Config::default();
        config.dev.body_size_limit = 0;
        let resolved = ValidatedConfig::resolve(config, Path::new("/p")).unwrap();
        assert_eq!(resolved.body_size_limit(), None);
    }
}
