// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Node adapter.
//!
//! Output layout:
//!
//! ```text
//! <out>/
//! ├── client/      static files, precompressed
//! ├── server/      server bundle
//! ├── index.js     launcher
//! └── package.json
//! ```

use super::Adapter;
use crate::builder::{Builder, CopyOptions};
use crate::config::NodeAdapterOptions;
use crate::error::{KilnError, Result};
use crate::resolve::to_posix;
use crate::sync::launcher::REQUEST_BRIDGE;
use async_trait::async_trait;
use std::fs;

/// Launcher template. `SERVER`, `ENV_PREFIX` and `BASE` are replaced on copy.
/// The request bridge is appended when the file is written.
const LAUNCHER: &str = r#"import { createServer } from 'node:http';
import { createReadStream, existsSync, statSync } from 'node:fs';
import { extname, join, normalize } from 'node:path';
import { Readable } from 'node:stream';
import { fileURLToPath } from 'node:url';
import server from 'SERVER';

const env_prefix = 'ENV_PREFIX';
const base = 'BASE';
const host = process.env[`${env_prefix}HOST`] ?? '0.0.0.0';
const port = Number(process.env[`${env_prefix}PORT`] ?? 3000);
const client = fileURLToPath(new URL('./client', import.meta.url));

const types = {
	'.html': 'text/html',
	'.js': 'text/javascript',
	'.mjs': 'text/javascript',
	'.css': 'text/css',
	'.json': 'application/json',
	'.svg': 'image/svg+xml',
	'.png': 'image/png',
	'.jpg': 'image/jpeg',
	'.ico': 'image/x-icon',
	'.txt': 'text/plain',
	'.wasm': 'application/wasm',
	'.xml': 'application/xml'
};

function static_file(pathname, accept_encoding) {
	const file = normalize(join(client, decodeURIComponent(pathname)));
	if (!file.startsWith(client) || !existsSync(file) || !statSync(file).isFile()) return null;

	for (const [encoding, ext] of [['br', '.br'], ['gzip', '.gz']]) {
		if (accept_encoding.includes(encoding) && existsSync(file + ext)) {
			return { file: file + ext, encoding, type: types[extname(file)] };
		}
	}
	return { file, encoding: null, type: types[extname(file)] };
}

createServer(async (req, res) => {
	const url = new URL(req.url, `http://${req.headers.host ?? 'localhost'}`);

	const asset = static_file(url.pathname, req.headers['accept-encoding'] ?? '');
	if (asset) {
		const headers = { 'content-type': asset.type ?? 'application/octet-stream' };
		if (asset.encoding) headers['content-encoding'] = asset.encoding;
		if (url.pathname.startsWith(`${base}/immutable/`)) {
			headers['cache-control'] = 'public, max-age=31536000, immutable';
		}
		res.writeHead(200, headers);
		createReadStream(asset.file).pipe(res);
		return;
	}

	try {
		send_response(res, await server.fetch(to_request(req, url)));
	} catch (error) {
		console.error(error);
		const recovered = await recover(server, error);
		if (recovered) {
			send_response(res, recovered);
			return;
		}
		res.writeHead(500, { 'content-type': 'text/plain' });
		res.end('Internal Server Error');
	}
}).listen(port, host, () => {
	console.log(`Listening on http://${host}:${port}`);
});
"#;

/// Writes a standalone Node server.
#[derive(Debug, Clone)]
pub struct NodeAdapter {
    options: NodeAdapterOptions,
}

impl NodeAdapter {
    /// Creates the adapter.
    pub fn new(options: NodeAdapterOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Adapter for NodeAdapter {
    fn name(&self) -> &str {
        "node"
    }

    async fn adapt(&self, builder: &Builder) -> Result<()> {
        let out = builder.config().root.join(&self.options.out);
        let tmp = builder.get_build_directory("adapter-node");

        builder.rimraf(&out)?;
        builder.rimraf(&tmp)?;
        builder.mkdirp(&tmp)?;

        builder.log().minor("Copying assets");
        let base = builder.config().paths.base.trim_start_matches('/');
        let client_dir = if base.is_empty() {
            out.join("client")
        } else {
            out.join("client").join(base)
        };
        builder.write_client(&client_dir)?;

        if self.options.precompress {
            builder.log().minor("Compressing assets");
            builder.compress(&client_dir)?;
        }

        builder.log().minor("Building server");
        builder.write_server(&out.join("server"))?;

        let launcher = tmp.join("index.js");
        fs::write(&launcher, format!("{}\n{}", LAUNCHER, REQUEST_BRIDGE))?;
        let server_entry = format!("./server/{}", to_posix(&builder.build_data().server_entry));
        let app_base = format!("/{}", builder.get_app_path());
        let copied = builder.copy(
            &launcher,
            &out.join("index.js"),
            &CopyOptions::default()
                .replace("SERVER", server_entry)
                .replace("ENV_PREFIX", self.options.env_prefix.clone())
                .replace("BASE", app_base),
        )?;
        if copied.is_empty() {
            return Err(KilnError::Adapter {
                name: self.name().to_string(),
                message: "failed to write the launcher".to_string(),
            });
        }

        fs::write(out.join("package.json"), "{ \"type\": \"module\" }\n")?;
        builder.rimraf(&tmp)?;

        builder
            .log()
            .success(format!("Wrote Node server to {}", out.display()));
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
    async fn test_node_adapter_layout() {
        let dir = tempdir().unwrap();
        let config = Arc::new(ValidatedConfig::resolve(Config::default(), dir.path()).unwrap());
        let client = config.output_dir().join("client/_app/immutable");
        let server = config.output_dir().join("server");
        fs::create_dir_all(&client).unwrap();
        fs::create_dir_all(&server).unwrap();
        fs::write(client.join("entry.js"), "console.log(1);").unwrap();
        fs::write(server.join("index.js"), "export default { fetch() {} };").unwrap();

        let builder = Builder::new(config.clone(), BuildData::new(&config, Vec::new()), Logger::new(true));
        let adapter = NodeAdapter::new(NodeAdapterOptions {
            out: "build".into(),
            precompress: true,
            env_prefix: "APP_".into(),
        });
        adapter.adapt(&builder).await.unwrap();

        let out = dir.path().join("build");
        assert!(out.join("client/_app/immutable/entry.js").is_file());
        assert!(out.join("client/_app/immutable/entry.js.gz").is_file());
        assert!(out.join("client/_app/immutable/entry.js.br").is_file());
        assert!(out.join("server/index.js").is_file());

        let launcher = fs::read_to_string(out.join("index.js")).unwrap();
        assert!(launcher.contains("import server from './server/index.js';"));
        assert!(launcher.contains("const env_prefix = 'APP_';"));
        assert!(launcher.contains("const base = '/_app';"));
        assert!(launcher.contains("function to_request(req, url)"));
        assert!(launcher.contains("const recovered = await recover(server, error);"));
        assert!(!dir.path().join(".kiln/adapter-node").exists());
    }
}
