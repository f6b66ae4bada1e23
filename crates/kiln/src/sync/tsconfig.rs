// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Editor TypeScript configuration.
//!
//! Writes `<out_dir>/tsconfig.json` and checks that the project's own
//! `tsconfig.json` (or `jsconfig.json`) extends it. Problems with the user's
//! file are warnings only.

use super::ArtifactWriter;
use crate::config::ValidatedConfig;
use crate::error::Result;
use crate::resolve::{normalize_path, to_posix};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

lazy_static! {
    static ref COMMENTS: Regex =
        Regex::new(r#"("(?:[^"\\]|\\.)*")|//[^\n]*|/\*[\s\S]*?\*/"#).unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",(\s*[}\]])").unwrap();
}

/// Path of `to` relative to `from`, posix separated, `.` prefixed.
fn relative(from: &Path, to: &Path) -> String {
    let path = pathdiff::diff_paths(to, from).unwrap_or_else(|| to.to_path_buf());
    let path = to_posix(path);
    if path.is_empty() {
        ".".to_string()
    } else if path.starts_with("..") {
        path
    } else {
        format!("./{}", path)
    }
}

/// Generates the content of `<out_dir>/tsconfig.json`.
pub fn render_tsconfig(config: &ValidatedConfig) -> String {
    let out = &config.out_dir;
    let root = relative(out, &config.root);
    let src = relative(out, &config.root.join("src"));

    let tsconfig = json!({
        "compilerOptions": {
            "paths": {
                "$lib": [format!("{}/lib", src)],
                "$lib/*": [format!("{}/lib/*", src)]
            },
            "rootDirs": [root, "./types"],
            "moduleResolution": "bundler",
            "module": "esnext",
            "target": "esnext",
            "lib": ["esnext", "DOM", "DOM.Iterable"],
            "isolatedModules": true,
            "noEmit": true,
            "skipLibCheck": true
        },
        "include": [
            "ambient.d.ts",
            format!("{}/**/*.js", src),
            format!("{}/**/*.ts", src)
        ],
        "exclude": [
            format!("{}/node_modules/**", root),
            format!("{}/**/*.js", relative(out, &config.output_dir()))
        ]
    });

    let mut content = serde_json::to_string_pretty(&tsconfig).unwrap_or_else(|_| "{}".to_string());
    content.push('\n');
    content
}

/// Removes `//` and `/* */` comments and trailing commas from a JSONC document.
pub fn strip_jsonc(source: &str) -> String {
    let without_comments = COMMENTS.replace_all(source, "$1");
    TRAILING_COMMA.replace_all(&without_comments, "$1").into_owned()
}

/// Checks the project's tsconfig/jsconfig and returns advisory warnings.
pub fn validate_user_tsconfig(config: &ValidatedConfig) -> Vec<String> {
    let user_file = ["tsconfig.json", "jsconfig.json"]
        .iter()
        .map(|name| config.root.join(name))
        .find(|path| path.is_file());

    let Some(user_file) = user_file else {
        return Vec::new();
    };
    let name = user_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let content = match fs::read_to_string(&user_file) {
        Ok(content) => content,
        Err(e) => return vec![format!("Could not read {}: {}", name, e)],
    };
    let parsed: Value = match serde_json::from_str(&strip_jsonc(&content)) {
        Ok(value) => value,
        Err(e) => return vec![format!("Could not parse {}: {}", name, e)],
    };

    let generated = normalize_path(&config.out_dir.join("tsconfig.json"));
    let expected = relative(&config.root, &config.out_dir.join("tsconfig.json"));
    let mut warnings = Vec::new();

    let extends: Vec<&str> = match parsed.get("extends") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let extends_generated = extends
        .iter()
        .any(|e| normalize_path(&config.root.join(e)) == generated);
    if !extends_generated {
        warnings.push(format!(
            "Your {} should extend the configuration generated by kiln: \"extends\": \"{}\"",
            name, expected
        ));
    }

    if parsed
        .get("compilerOptions")
        .and_then(|options| options.get("paths"))
        .is_some()
    {
        warnings.push(format!(
            "You have specified compilerOptions.paths in {}, which overrides the generated aliases",
            name
        ));
    }

    warnings
}

/// Writes `<out_dir>/tsconfig.json` and logs warnings about the user's config.
pub fn write_tsconfig(writer: &ArtifactWriter, config: &ValidatedConfig) -> Result<()> {
    writer.write_if_changed(&config.out_dir.join("tsconfig.json"), &render_tsconfig(config))?;

    for warning in validate_user_tsconfig(config) {
        tracing::warn!("{}", warning);
    }
    Ok(())
}
