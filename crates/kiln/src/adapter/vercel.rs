// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Vercel adapter.
//!
//! Writes the Build Output API layout under `.vercel/output`: static files,
//! one serverless function and the routing config.

use super::Adapter;
use crate::builder::Builder;
use crate::config::VercelAdapterOptions;
use crate::error::{KilnError, Result};
use crate::packager::{create_function_bundle, FunctionOptions, StaticTracer};
use crate::resolve::to_posix;
use async_trait::async_trait;
use serde_json::json;
use std::fs;

/// Name of the generated function.
const FUNCTION_NAME: &str = "fn";

/// Writes Vercel build output.
#[derive(Debug, Clone)]
pub struct VercelAdapter {
    options: VercelAdapterOptions,
}

impl VercelAdapter {
    /// Creates the adapter.
    pub fn new(options: VercelAdapterOptions) -> Self {
        Self { options }
    }

    fn routing(&self, builder: &Builder) -> serde_json::Value {
        let app_path = builder.get_app_path();
        json!({
            "version": 3,
            "routes": [
                {
                    "src": format!("/{}/immutable/.+", app_path),
                    "headers": { "cache-control": "public, immutable, max-age=31536000" }
                },
                { "handle": "filesystem" },
                { "src": "/.*", "dest": format!("/{}", FUNCTION_NAME) }
            ]
        })
    }
}

#[async_trait]
impl Adapter for VercelAdapter {
    fn name(&self) -> &str {
        "vercel"
    }

    async fn adapt(&self, builder: &Builder) -> Result<()> {
        let dir = builder.config().root.join(".vercel").join("output");
        let tmp = builder.get_build_directory("vercel-tmp");

        builder.rimraf(&dir)?;
        builder.rimraf(&tmp)?;
        builder.mkdirp(&dir)?;

        builder.log().minor("Copying assets");
        let base = builder.config().paths.base.trim_start_matches('/');
        let static_dir = if base.is_empty() {
            dir.join("static")
        } else {
            dir.join("static").join(base)
        };
        builder.write_client(&static_dir)?;

        builder.log().minor("Building serverless function");
        builder.write_server(&tmp.join("server"))?;
        let entry = tmp.join("index.js");
        fs::write(
            &entry,
            format!(
                "import server from './server/{}';\n\nexport default {{\n\tfetch: (request) => server.fetch(request)\n}};\n",
                to_posix(&builder.build_data().server_entry)
            ),
        )?;

        let function_dir = dir.join("functions").join(format!("{}.func", FUNCTION_NAME));
        let options = FunctionOptions {
            runtime: self.options.runtime.clone(),
            regions: self.options.regions.clone(),
            memory: self.options.memory,
            max_duration: self.options.max_duration,
        };
        create_function_bundle(builder, &StaticTracer::new(), &entry, &function_dir, &options).map_err(
            |e| KilnError::Adapter {
                name: self.name().to_string(),
                message: e.to_string(),
            },
        )?;

        fs::write(
            dir.join("config.json"),
            serde_json::to_string_pretty(&self.routing(builder))?,
        )?;
        builder.rimraf(&tmp)?;

        builder
            .log()
            .success(format!("Wrote Vercel output to {}", dir.display()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildData, Logger};
    use crate::config::{Config, ValidatedConfig};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_vercel_adapter_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = Arc::new(ValidatedConfig::resolve(Config::default(), &root).unwrap());
        let client = config.output_dir().join("client");
        let server = config.output_dir().join("server/chunks");
        fs::create_dir_all(&client).unwrap();
        fs::create_dir_all(&server).unwrap();
        fs::write(client.join("favicon.png"), [0u8; 4]).unwrap();
        fs::write(
            config.output_dir().join("server/index.js"),
            "import { render } from './chunks/render.js';\nexport default { fetch: render };",
        )
        .unwrap();
        fs::write(server.join("render.js"), "export const render = () => {};").unwrap();

        let builder = Builder::new(config.clone(), BuildData::new(&config, Vec::new()), Logger::new(true));
        let adapter = VercelAdapter::new(VercelAdapterOptions {
            runtime: "nodejs20.x".into(),
            regions: Vec::new(),
            memory: None,
            max_duration: Some(10),
        });
        adapter.adapt(&builder).await.unwrap();

        let output = root.join(".vercel/output");
        assert!(output.join("static/favicon.png").is_file());

        let function = output.join("functions/fn.func");
        assert!(function.join("index.js").is_file());
        assert!(function.join("server/index.js").is_file());
        assert!(function.join("server/chunks/render.js").is_file());

        let vc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(function.join(".vc-config.json")).unwrap()).unwrap();
        assert_eq!(vc["handler"], "index.js");
        assert_eq!(vc["maxDuration"], 10);

        let routing: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("config.json")).unwrap()).unwrap();
        assert_eq!(routing["routes"][0]["src"], "/_app/immutable/.+");
        assert_eq!(routing["routes"][2]["dest"], "/fn");
    }
}
