// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Writes `internal.js`, the runtime's view of the resolved configuration.

use super::{ArtifactWriter, GENERATED_HEADER};
use crate::config::ValidatedConfig;
use crate::error::Result;
use serde_json::json;
use std::path::Path;

/// Generates the source of `internal.js`.
pub fn render_config(config: &ValidatedConfig, has_service_worker: bool) -> String {
    let options = json!({
        "app_dir": config.app_dir,
        "base": config.paths.base,
        "assets": config.paths.assets,
        "service_worker": has_service_worker && config.service_worker.register,
        "env_public_prefix": config.env.public_prefix,
        "env_private_prefix": config.env.private_prefix,
    });

    // serde_json::Value serializes object keys in sorted order.
    let body = serde_json::to_string_pretty(&options).unwrap_or_else(|_| "{}".to_string());
    format!("{}\nexport const options = {};\n", GENERATED_HEADER, body)
}

/// Writes `<generated>/internal.js`.
pub fn write_config(
    writer: &ArtifactWriter,
    generated: &Path,
    config: &ValidatedConfig,
    has_service_worker: bool,
) -> Result<()> {
    let content = render_config(config, has_service_worker);
    writer.write_if_changed(&generated.join("internal.js"), &content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_render_config_options() {
        let mut raw = Config::default();
        raw.paths.base = "/docs".into();
        let config = ValidatedConfig::resolve(raw, Path::new("/p")).unwrap();

        let source = render_config(&config, true);
        assert!(source.starts_with(GENERATED_HEADER));
        assert!(source.contains("export const options = {"));
        assert!(source.contains("\"service_worker\": true"));
        assert!(source.contains("\"env_public_prefix\": \"PUBLIC_\""));
        assert!(source.contains("\"base\": \"/docs\""));
    }

    #[test]
    fn test_service_worker_requires_register() {
        let mut raw = Config::default();
        raw.service_worker.register = false;
        let config = ValidatedConfig::resolve(raw, Path::new("/p")).unwrap();
        assert!(render_config(&config, true).contains("\"service_worker\": false"));
    }
}
