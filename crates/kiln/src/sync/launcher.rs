// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Writes `dev-server.mjs`, the module the dev runtime executes.
//!
//! The entry only default-exports `{ fetch, onError? }`. The launcher
//! imports it, listens on `PORT` with `node:http` and bridges requests and
//! responses. Failures that `onError` does not turn into a response are
//! answered with [`DEV_ERROR_HEADER`] set and a JSON body
//! `{ message, stack }`, so the dev server can render its overlay.

use super::views::relative_import;
use super::{ArtifactWriter, GENERATED_HEADER};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// File name of the dev launcher inside the generated directory.
pub const DEV_LAUNCHER: &str = "dev-server.mjs";

/// Response header marking an unhandled entry failure.
pub const DEV_ERROR_HEADER: &str = "x-kiln-error";

/// Node request/response bridging shared by the dev launcher and the Node
/// adapter. Expects `Readable` from `node:stream` in scope.
pub const REQUEST_BRIDGE: &str = r#"function to_request(req, url) {
	const has_body = req.method !== 'GET' && req.method !== 'HEAD';
	return new Request(url, {
		method: req.method,
		headers: Object.entries(req.headers).flatMap(([key, value]) =>
			Array.isArray(value) ? value.map((v) => [key, v]) : [[key, value ?? '']]
		),
		body: has_body ? Readable.toWeb(req) : undefined,
		duplex: has_body ? 'half' : undefined
	});
}

async function recover(handler, error) {
	if (typeof handler.onError !== 'function') return null;
	try {
		return (await handler.onError(error)) ?? null;
	} catch (inner) {
		console.error(inner);
		return null;
	}
}

function send_response(res, response) {
	const headers = {};
	for (const [key, value] of response.headers) {
		if (key !== 'set-cookie') headers[key] = value;
	}
	const cookies = response.headers.getSetCookie?.() ?? [];
	if (cookies.length > 0) headers['set-cookie'] = cookies;
	res.writeHead(response.status, headers);
	if (!response.body) {
		res.end();
		return;
	}
	Readable.fromWeb(response.body)
		.on('error', (error) => {
			console.error(error);
			res.destroy(error);
		})
		.pipe(res);
}
"#;

/// Generates the source of the dev launcher for `entry`.
pub fn render_dev_launcher(generated: &Path, entry: &Path) -> String {
    let specifier = relative_import(generated, entry);
    let specifier = serde_json::to_string(&specifier).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        r#"{header}
import {{ createServer }} from 'node:http';
import {{ Readable }} from 'node:stream';
import handler from {specifier};

const port = Number(process.env.PORT);

createServer(async (req, res) => {{
	const request = to_request(req, new URL(req.url, `http://${{req.headers.host ?? 'localhost'}}`));
	let response;
	try {{
		response = await handler.fetch(request);
	}} catch (error) {{
		response = await recover(handler, error);
		if (!response) {{
			res.writeHead(500, {{ 'content-type': 'application/json', '{error_header}': '1' }});
			res.end(JSON.stringify({{ message: String(error?.message ?? error), stack: error?.stack ?? null }}));
			return;
		}}
	}}
	send_response(res, response);
}}).listen(port, '127.0.0.1');

{bridge}"#,
        header = GENERATED_HEADER.trim_end(),
        specifier = specifier,
        error_header = DEV_ERROR_HEADER,
        bridge = REQUEST_BRIDGE,
    )
}

/// Writes `<generated>/dev-server.mjs` and returns its path.
pub fn write_dev_launcher(writer: &ArtifactWriter, generated: &Path, entry: &Path) -> Result<PathBuf> {
    let path = generated.join(DEV_LAUNCHER);
    writer.write_if_changed(&path, &render_dev_launcher(generated, entry))?;
    Ok(path)
}
