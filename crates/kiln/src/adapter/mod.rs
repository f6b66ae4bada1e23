// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Deployment adapters.
//!
//! An [`Adapter`] runs once after a successful build and turns the output
//! exposed by the [`Builder`] into something a platform can deploy.

/// Standalone Node server.
pub mod node;
/// Vercel build output.
pub mod vercel;

use crate::builder::Builder;
use crate::config::AdapterConfig;
use crate::error::Result;
use async_trait::async_trait;

pub use node::NodeAdapter;
pub use vercel::VercelAdapter;

/// Produces deployable output from a finished build.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter name shown in progress output.
    fn name(&self) -> &str;

    /// Writes the deployment artifacts.
    async fn adapt(&self, builder: &Builder) -> Result<()>;
}

/// Creates the adapter selected in `[adapter]`.
pub fn from_config(config: &AdapterConfig) -> Box<dyn Adapter> {
    match config {
        AdapterConfig::Node(options) => Box::new(NodeAdapter::new(options.clone())),
        AdapterConfig::Vercel(options) => Box::new(VercelAdapter::new(options.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeAdapterOptions, VercelAdapterOptions};

    #[test]
    fn test_from_config_selects_adapter() {
        let node = from_config(&AdapterConfig::Node(NodeAdapterOptions {
            out: "build".into(),
            precompress: false,
            env_prefix: String::new(),
        }));
        assert_eq!(node.name(), "node");

        let vercel = from_config(&AdapterConfig::Vercel(VercelAdapterOptions {
            runtime: "nodejs20.x".into(),
            regions: Vec::new(),
            memory: None,
            max_duration: None,
        }));
        assert_eq!(vercel.name(), "vercel");
    }
}
