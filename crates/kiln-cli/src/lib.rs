// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]
#![allow(clippy::result_large_err)]

//! Kiln CLI library.
//!
//! This crate provides the command-line interface for kiln. It hosts the
//! development server, the two-phase production build and the glue that
//! runs deployment adapters.
//!
//! # Features
//!
//! - **Development server** that serves static assets and forwards every
//!   other request to the application entry
//! - **Build orchestration** with an explicit client/server phase machine
//! - **External bundler** integration through a job file and a command
//! - **File watching** that keeps the view registry current
//!
//! # Usage
//!
//! This crate is primarily used through the `kiln` binary:
//!
//! ```bash
//! kiln dev      # Start development server
//! kiln build    # Build for production and run the adapter
//! kiln sync     # Regenerate generated modules only
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `kiln.toml` at the project root.

/// Production build pipeline.
pub mod build;
/// CLI commands (dev, build, sync).
pub mod commands;
/// Development server.
pub mod server;
/// File watching for the development server.
pub mod watcher;
