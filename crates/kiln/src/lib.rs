// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

// KilnError carries compile errors with source frames.
#![allow(clippy::result_large_err)]

//! # Kiln
//!
//! Build and dev-time orchestration for server-rendered web applications.
//!
//! Kiln discovers views and static assets, generates the modules the
//! application imports (view registry, config snapshot, environment
//! variables, service worker manifest), drives an external bundler through
//! a client and a server phase, and packages the result with a deployment
//! adapter.
//!
//! ## Features
//!
//! - `kiln.toml` configuration with per-field validation
//! - Idempotent generated artifacts backed by an injected cache
//! - `$env/*` virtual modules with an illegal-import guard for views
//! - Node and Vercel adapters, including dependency-traced function bundles
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kiln::{ArtifactCache, ArtifactWriter, Manifest, Mode, ValidatedConfig};
//!
//! let config = ValidatedConfig::load(std::path::Path::new("."))?;
//! let manifest = Manifest::collect(&config)?;
//! let writer = ArtifactWriter::new(ArtifactCache::new());
//! kiln::sync::sync_all(&writer, &config, &manifest, Mode::Development)?;
//! ```

/// Deployment adapters.
pub mod adapter;
/// Build output access for adapters.
pub mod builder;
/// Bundler and module loader seams.
pub mod bundler;
/// Project configuration.
pub mod config;
/// Error types and reporting.
pub mod error;
/// Standard request and response types.
pub mod fetch;
/// Illegal import detection.
pub mod guard;
/// Static import scanning.
pub mod imports;
/// View and asset discovery.
pub mod manifest;
/// Serverless function packaging.
pub mod packager;
/// Entry file resolution.
pub mod resolve;
/// Generated artifacts.
pub mod sync;

pub use adapter::Adapter;
pub use builder::{BuildData, Builder, CopyOptions, Logger};
pub use bundler::{BuildTarget, BundleJob, BundleOutput, Bundler, ModuleLoader};
pub use config::{Config, Mode, ValidatedConfig};
pub use error::{BoxError, CompileError, FieldError, KilnError, Result, SourceFrame};
pub use fetch::{Body, BodyError, EntryHandler, Request, Response};
pub use guard::{check, ImportGraph, StaticImportGraph};
pub use manifest::{Asset, Manifest, View};
pub use resolve::resolve_entry;
pub use sync::{ArtifactCache, ArtifactWriter, EnvModules, VirtualModuleId};
