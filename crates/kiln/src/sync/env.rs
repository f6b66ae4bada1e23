// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Environment variable modules.
//!
//! Variables are split into a public and a private half by prefix and
//! exposed through four virtual modules:
//!
//! | Module | Values |
//! |---|---|
//! | `$env/static/private` | private, inlined at build time |
//! | `$env/static/public` | public, inlined at build time |
//! | `$env/dynamic/private` | private, read at runtime |
//! | `$env/dynamic/public` | public, read at runtime |
//!
//! Keeping private modules out of client bundles is the job of
//! [`crate::guard`], not of this module.

use super::{ArtifactWriter, GENERATED_HEADER};
use crate::config::{Mode, ResolvedEnv};
use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

lazy_static! {
    static ref VALID_IDENTIFIER: Regex = Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$").unwrap();
    static ref RESERVED: HashSet<&'static str> = [
        "annotations", "arguments", "await", "break", "case", "catch", "class", "const",
        "continue", "debugger", "default", "delete", "do", "else", "enum", "eval", "export",
        "extends", "false", "finally", "for", "function", "if", "implements", "import", "in",
        "instanceof", "interface", "let", "new", "null", "package", "private", "protected",
        "public", "return", "static", "super", "switch", "this", "throw", "true", "try",
        "typeof", "var", "void", "while", "with", "yield",
    ]
    .into_iter()
    .collect();
}

/// Identifier of one of the four environment modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VirtualModuleId {
    /// `$env/static/private`
    StaticPrivate,
    /// `$env/static/public`
    StaticPublic,
    /// `$env/dynamic/private`
    DynamicPrivate,
    /// `$env/dynamic/public`
    DynamicPublic,
}

impl VirtualModuleId {
    /// Every environment module.
    pub const ALL: [VirtualModuleId; 4] = [
        VirtualModuleId::StaticPrivate,
        VirtualModuleId::StaticPublic,
        VirtualModuleId::DynamicPrivate,
        VirtualModuleId::DynamicPublic,
    ];

    /// Parses an import specifier.
    pub fn parse(id: &str) -> Option<Self> {
        match id {
            "$env/static/private" => Some(Self::StaticPrivate),
            "$env/static/public" => Some(Self::StaticPublic),
            "$env/dynamic/private" => Some(Self::DynamicPrivate),
            "$env/dynamic/public" => Some(Self::DynamicPublic),
            _ => None,
        }
    }

    /// The import specifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaticPrivate => "$env/static/private",
            Self::StaticPublic => "$env/static/public",
            Self::DynamicPrivate => "$env/dynamic/private",
            Self::DynamicPublic => "$env/dynamic/public",
        }
    }

    /// File name under `generated/env/`.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::StaticPrivate => "static-private.js",
            Self::StaticPublic => "static-public.js",
            Self::DynamicPrivate => "dynamic-private.js",
            Self::DynamicPublic => "dynamic-public.js",
        }
    }

    /// Whether the module exposes private values.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::StaticPrivate | Self::DynamicPrivate)
    }
}

impl fmt::Display for VirtualModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved virtual module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualModule {
    /// Which module this is.
    pub id: VirtualModuleId,
    /// JavaScript source.
    pub code: String,
}

/// Environment variables split by visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    /// Variables safe for client code.
    pub public: BTreeMap<String, String>,
    /// Server-only variables.
    pub private: BTreeMap<String, String>,
}

/// Returns true if `key` can be exported as a JavaScript binding.
pub fn is_valid_identifier(key: &str) -> bool {
    VALID_IDENTIFIER.is_match(key) && !RESERVED.contains(key)
}

fn is_public(key: &str, public_prefix: &str, private_prefix: &str) -> bool {
    key.starts_with(public_prefix) && (private_prefix.is_empty() || !key.starts_with(private_prefix))
}

fn is_private(key: &str, public_prefix: &str, private_prefix: &str) -> bool {
    key.starts_with(private_prefix) && (public_prefix.is_empty() || !key.starts_with(public_prefix))
}

/// Splits `vars` into public and private halves, dropping unusable keys.
pub fn filter_env(
    vars: &BTreeMap<String, String>,
    public_prefix: &str,
    private_prefix: &str,
) -> EnvVars {
    let mut result = EnvVars::default();

    for (key, value) in vars {
        if !is_valid_identifier(key) {
            tracing::debug!("Skipping environment variable {}: not a valid identifier", key);
            continue;
        }
        if is_public(key, public_prefix, private_prefix) {
            result.public.insert(key.clone(), value.clone());
        }
        if is_private(key, public_prefix, private_prefix) {
            result.private.insert(key.clone(), value.clone());
        }
    }

    result
}

/// Reads `.env` files for `mode`, then overlays the process environment.
///
/// Files are read in order `.env`, `.env.local`, `.env.<mode>`,
/// `.env.<mode>.local`; later files win and the process environment wins
/// over all of them.
pub fn load_env(config: &ResolvedEnv, mode: Mode) -> EnvVars {
    let mut vars = BTreeMap::new();

    let files = [
        ".env".to_string(),
        ".env.local".to_string(),
        format!(".env.{}", mode.as_str()),
        format!(".env.{}.local", mode.as_str()),
    ];

    for name in &files {
        let path = config.dir.join(name);
        if path.is_file() {
            read_env_file(&path, &mut vars);
        }
    }

    for (key, value) in std::env::vars() {
        vars.insert(key, value);
    }

    filter_env(&vars, &config.public_prefix, &config.private_prefix)
}

fn read_env_file(path: &Path, vars: &mut BTreeMap<String, String>) {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return;
        }
    };

    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                break;
            }
        }
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// The four environment modules for one set of variables.
#[derive(Debug, Clone)]
pub struct EnvModules {
    vars: EnvVars,
    public_prefix: String,
    private_prefix: String,
}

impl EnvModules {
    /// Creates the modules for `vars`.
    pub fn new(vars: EnvVars, env: &ResolvedEnv) -> Self {
        Self {
            vars,
            public_prefix: env.public_prefix.clone(),
            private_prefix: env.private_prefix.clone(),
        }
    }

    /// The variables behind the modules.
    pub fn vars(&self) -> &EnvVars {
        &self.vars
    }

    /// Resolves an import specifier to a virtual module.
    ///
    /// Returns `None` for anything that is not an environment module.
    pub fn resolve_virtual(&self, id: &str) -> Option<VirtualModule> {
        VirtualModuleId::parse(id).map(|id| self.module(id))
    }

    /// Generates the module for `id`.
    pub fn module(&self, id: VirtualModuleId) -> VirtualModule {
        let code = match id {
            VirtualModuleId::StaticPrivate => self.static_module(&self.vars.private),
            VirtualModuleId::StaticPublic => self.static_module(&self.vars.public),
            VirtualModuleId::DynamicPrivate => self.dynamic_module(false),
            VirtualModuleId::DynamicPublic => self.dynamic_module(true),
        };
        VirtualModule { id, code }
    }

    fn static_module(&self, vars: &BTreeMap<String, String>) -> String {
        let mut out = String::from(GENERATED_HEADER);
        for (key, value) in vars {
            let _ = writeln!(out, "export const {} = {};", key, js_string(value));
        }
        out
    }

    fn dynamic_module(&self, public: bool) -> String {
        let public_prefix = js_string(&self.public_prefix);
        let private_prefix = js_string(&self.private_prefix);
        let predicate = if public {
            "(key) => key.startsWith(public_prefix) && (private_prefix === '' || !key.startsWith(private_prefix))"
        } else {
            "(key) => key.startsWith(private_prefix) && (public_prefix === '' || !key.startsWith(public_prefix))"
        };

        format!(
            "{header}
const public_prefix = {public_prefix};
const private_prefix = {private_prefix};
const visible = {predicate};
const source = globalThis.__kiln_env ?? globalThis.process?.env ?? {{}};

export const env = Object.freeze(
\tObject.fromEntries(Object.entries(source).filter(([key]) => visible(key)))
);
",
            header = GENERATED_HEADER,
            public_prefix = public_prefix,
            private_prefix = private_prefix,
            predicate = predicate,
        )
    }

    /// Generates `ambient.d.ts` declaring all four modules.
    pub fn ambient_declarations(&self) -> String {
        let mut out = String::from("// generated by kiln, do not edit\n\n");

        for (id, vars) in [
            (VirtualModuleId::StaticPrivate, &self.vars.private),
            (VirtualModuleId::StaticPublic, &self.vars.public),
        ] {
            let _ = writeln!(out, "declare module '{}' {{", id);
            for key in vars.keys() {
                let _ = writeln!(out, "\texport const {}: string;", key);
            }
            out.push_str("}\n\n");
        }

        for (id, vars, prefix) in [
            (VirtualModuleId::DynamicPrivate, &self.vars.private, &self.private_prefix),
            (VirtualModuleId::DynamicPublic, &self.vars.public, &self.public_prefix),
        ] {
            let _ = writeln!(out, "declare module '{}' {{", id);
            out.push_str("\texport const env: {\n");
            for key in vars.keys() {
                let _ = writeln!(out, "\t\t{}: string;", key);
            }
            let _ = writeln!(out, "\t\t[key: `{}${{string}}`]: string | undefined;", prefix);
            out.push_str("\t};\n}\n\n");
        }

        out
    }
}

/// Writes `<out_dir>/ambient.d.ts` and `<out_dir>/generated/env/*.js`.
pub fn write_env(writer: &ArtifactWriter, out_dir: &Path, modules: &EnvModules) -> Result<()> {
    writer.write_if_changed(&out_dir.join("ambient.d.ts"), &modules.ambient_declarations())?;

    let env_dir = out_dir.join("generated").join("env");
    for id in VirtualModuleId::ALL {
        let module = modules.module(id);
        writer.write_if_changed(&env_dir.join(id.file_name()), &module.code)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ArtifactCache;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn env_config(dir: PathBuf, public: &str, private: &str) -> ResolvedEnv {
        ResolvedEnv {
            dir,
            public_prefix: public.into(),
            private_prefix: private.into(),
        }
    }

    #[test]
    fn test_filter_with_empty_private_prefix() {
        let split = filter_env(
            &vars(&[("PUBLIC_API", "https://api"), ("SECRET", "s"), ("PATH", "/bin")]),
            "PUBLIC_",
            "",
        );
        assert_eq!(split.public.keys().collect::<Vec<_>>(), vec!["PUBLIC_API"]);
        assert_eq!(split.private.keys().collect::<Vec<_>>(), vec!["PATH", "SECRET"]);
    }

    #[test]
    fn test_filter_with_overlapping_prefixes() {
        let split = filter_env(
            &vars(&[("PUBLIC_A", "1"), ("PUBLIC_PRIVATE_B", "2"), ("OTHER", "3")]),
            "PUBLIC_",
            "PUBLIC_PRIVATE_",
        );
        assert_eq!(split.public.keys().collect::<Vec<_>>(), vec!["PUBLIC_A"]);
        assert!(split.private.is_empty());
    }

    #[test]
    fn test_invalid_and_reserved_keys_are_dropped() {
        let split = filter_env(
            &vars(&[("default", "x"), ("MY-VAR", "x"), ("1ABC", "x"), ("OK_1", "x")]),
            "PUBLIC_",
            "",
        );
        assert_eq!(split.private.keys().collect::<Vec<_>>(), vec!["OK_1"]);
        assert!(is_valid_identifier("$scope"));
        assert!(!is_valid_identifier("class"));
    }

    #[test]
    fn test_load_env_file_precedence() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".env"), "KILN_TEST_A=base\nKILN_TEST_B=base\n").unwrap();
        fs::write(dir.path().join(".env.production"), "KILN_TEST_B=prod\n").unwrap();
        fs::write(dir.path().join(".env.development"), "KILN_TEST_B=dev\n").unwrap();

        let split = load_env(&env_config(dir.path().to_path_buf(), "PUBLIC_", ""), Mode::Production);
        assert_eq!(split.private.get("KILN_TEST_A").map(String::as_str), Some("base"));
        assert_eq!(split.private.get("KILN_TEST_B").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_resolve_virtual() {
        let modules = EnvModules::new(
            filter_env(&vars(&[("PUBLIC_URL", "https://x"), ("TOKEN", "t\"q")]), "PUBLIC_", ""),
            &env_config(PathBuf::from("."), "PUBLIC_", ""),
        );

        let public = modules.resolve_virtual("$env/static/public").unwrap();
        assert_eq!(public.id, VirtualModuleId::StaticPublic);
        assert!(public.code.contains("export const PUBLIC_URL = \"https://x\";"));
        assert!(!public.code.contains("TOKEN"));

        let private = modules.resolve_virtual("$env/static/private").unwrap();
        assert!(private.code.contains("export const TOKEN = \"t\\\"q\";"));

        let dynamic = modules.resolve_virtual("$env/dynamic/public").unwrap();
        assert!(dynamic.code.contains("export const env = Object.freeze("));
        assert!(!dynamic.code.contains("https://x"));

        assert!(modules.resolve_virtual("$env/static/secret").is_none());
        assert!(modules.resolve_virtual("./env.js").is_none());
    }

    #[test]
    fn test_ambient_declarations() {
        let modules = EnvModules::new(
            filter_env(&vars(&[("PUBLIC_URL", "u"), ("TOKEN", "t")]), "PUBLIC_", ""),
            &env_config(PathBuf::from("."), "PUBLIC_", ""),
        );
        let dts = modules.ambient_declarations();
        assert!(dts.contains("declare module '$env/static/private' {\n\texport const TOKEN: string;\n}"));
        assert!(dts.contains("[key: `PUBLIC_${string}`]: string | undefined;"));
        assert!(dts.contains("[key: `${string}`]: string | undefined;"));
        assert!(!dts.contains("\"u\""));
    }

    #[test]
    fn test_write_env_files() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(ArtifactCache::new());
        let modules = EnvModules::new(EnvVars::default(), &env_config(dir.path().into(), "PUBLIC_", ""));
        write_env(&writer, dir.path(), &modules).unwrap();

        assert!(dir.path().join("ambient.d.ts").is_file());
        for id in VirtualModuleId::ALL {
            assert!(dir.path().join("generated/env").join(id.file_name()).is_file());
        }
        assert_eq!(writer.write_count(), 5);
    }
}
