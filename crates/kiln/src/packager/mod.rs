// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Serverless function packaging.
//!
//! [`create_function_bundle`] traces every file the server entry needs,
//! lays them out under the common ancestor directory and writes the
//! platform manifest next to them.
//!
//! # Steps
//!
//! 1. Trace dependencies from the entry ([`DependencyTracer`])
//! 2. Aggregate unresolved imports per importer and warn once
//! 3. Compute the [`common_ancestor`] of every traced file
//! 4. Build a [`BundlePlan`] without touching the output directory
//! 5. Apply it: copy real files, recreate symlinks as relative links
//! 6. Write `.vc-config.json` and `package.json`

/// Static import tracer.
pub mod trace;

use crate::builder::{mkdirp, Builder};
use crate::error::Result;
use crate::resolve::to_posix;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub use trace::StaticTracer;

/// Something the tracer could not follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceWarning {
    /// A runtime built-in such as `node:fs`. Always ignorable.
    Builtin {
        /// The specifier.
        specifier: String,
        /// File that imported it.
        importer: PathBuf,
    },
    /// A file that could not be read as source. Ignorable.
    ParseFailure {
        /// The file.
        file: PathBuf,
        /// Why it failed.
        message: String,
    },
    /// An import that did not resolve to a file.
    Unresolved {
        /// The specifier.
        specifier: String,
        /// File that imported it.
        importer: PathBuf,
    },
}

/// Result of a dependency trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    /// Every file reachable from the entries, entries included.
    pub files: BTreeSet<PathBuf>,
    /// Imports that could not be followed.
    pub warnings: Vec<TraceWarning>,
}

/// Finds the files a module depends on.
pub trait DependencyTracer {
    /// Traces from `entries`.
    fn trace(&self, entries: &[PathBuf]) -> Result<Trace>;
}

/// Collects unresolved imports by importer, dropping ignorable warnings.
pub fn resolution_failures(warnings: &[TraceWarning]) -> BTreeMap<PathBuf, Vec<String>> {
    let mut failures: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for warning in warnings {
        if let TraceWarning::Unresolved { specifier, importer } = warning {
            failures.entry(importer.clone()).or_default().push(specifier.clone());
        }
    }
    failures
}

/// The deepest directory containing every file in `files`.
///
/// Unrelated absolute paths share only the root (`/`); unrelated relative
/// paths share nothing and yield an empty path.
pub fn common_ancestor(files: &[PathBuf]) -> PathBuf {
    let mut iter = files.iter();
    let Some(first) = iter.next() else {
        return PathBuf::new();
    };

    let mut common = parent_components(first);
    for file in iter {
        let components = parent_components(file);
        let shared = common
            .iter()
            .zip(components.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }

    common.iter().collect()
}

fn parent_components(file: &Path) -> Vec<Component<'_>> {
    let mut components: Vec<_> = file.components().collect();
    components.pop();
    components
}

/// A file copied verbatim into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CopyAction {
    /// Source file.
    pub from: PathBuf,
    /// Destination file.
    pub to: PathBuf,
}

/// Every filesystem change needed to lay out a bundle.
///
/// Built in a single read-only pass; [`BundlePlan::apply`] performs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundlePlan {
    /// Directory all destinations are relative to.
    pub ancestor: PathBuf,
    /// Output directory.
    pub out_dir: PathBuf,
    /// Real files to copy.
    pub copies: BTreeSet<CopyAction>,
    /// Real path to every destination that must link to it.
    pub links: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

fn destination(out_dir: &Path, ancestor: &Path, file: &Path) -> PathBuf {
    match file.strip_prefix(ancestor) {
        Ok(relative) => out_dir.join(relative),
        Err(_) => out_dir.join(file.file_name().unwrap_or(file.as_os_str())),
    }
}

impl BundlePlan {
    /// Plans the layout of `files` under `out_dir`.
    ///
    /// Files reached through a symlink become links to their real path,
    /// which is copied once no matter how many links point at it.
    pub fn build(files: &BTreeSet<PathBuf>, out_dir: &Path) -> Result<Self> {
        let mut resolved = Vec::with_capacity(files.len());
        for file in files {
            let real = fs::canonicalize(file)?;
            resolved.push((file.clone(), real));
        }

        let mut all: Vec<PathBuf> = Vec::new();
        for (file, real) in &resolved {
            all.push(file.clone());
            all.push(real.clone());
        }
        let ancestor = common_ancestor(&all);

        let mut plan = BundlePlan {
            ancestor: ancestor.clone(),
            out_dir: out_dir.to_path_buf(),
            ..Default::default()
        };

        for (file, real) in resolved {
            if fs::symlink_metadata(&real).map(|m| m.is_dir()).unwrap_or(false) {
                continue;
            }

            plan.copies.insert(CopyAction {
                from: real.clone(),
                to: destination(out_dir, &ancestor, &real),
            });

            if file != real {
                plan.links
                    .entry(real)
                    .or_default()
                    .insert(destination(out_dir, &ancestor, &file));
            }
        }

        Ok(plan)
    }

    /// Destination of a traced file.
    pub fn destination(&self, file: &Path) -> PathBuf {
        destination(&self.out_dir, &self.ancestor, file)
    }

    /// Performs the plan: copies first, then relative symlinks.
    pub fn apply(&self) -> Result<()> {
        for action in &self.copies {
            if let Some(parent) = action.to.parent() {
                mkdirp(parent)?;
            }
            fs::copy(&action.from, &action.to)?;
        }

        for (real, links) in &self.links {
            let real_dest = self.destination(real);
            for link in links {
                // A real file may sit where a link belongs when paths alias.
                if *link == real_dest {
                    continue;
                }
                let parent = link.parent().unwrap_or(&self.out_dir);
                mkdirp(parent)?;
                let target = pathdiff::diff_paths(&real_dest, parent).unwrap_or_else(|| real_dest.clone());
                if fs::symlink_metadata(link).is_ok() {
                    fs::remove_file(link)?;
                }
                symlink(&target, link)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Function settings written to `.vc-config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionOptions {
    /// Runtime identifier, e.g. `nodejs20.x`.
    pub runtime: String,
    /// Deployment regions.
    pub regions: Vec<String>,
    /// Memory in MB.
    pub memory: Option<u32>,
    /// Maximum duration in seconds.
    pub max_duration: Option<u32>,
}

/// The platform manifest of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VcConfig {
    /// Runtime identifier.
    pub runtime: String,
    /// Deployment regions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    /// Memory in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    /// Maximum duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u32>,
    /// Entry path relative to the function root.
    pub handler: String,
    /// How the platform starts the handler.
    pub launcher_type: String,
}

/// Packages `entry` and its dependencies into `out_dir`.
pub fn create_function_bundle(
    builder: &Builder,
    tracer: &dyn DependencyTracer,
    entry: &Path,
    out_dir: &Path,
    options: &FunctionOptions,
) -> Result<BundlePlan> {
    let trace = tracer.trace(&[entry.to_path_buf()])?;

    let failures = resolution_failures(&trace.warnings);
    if !failures.is_empty() {
        let mut message = String::from(
            "The following modules failed to locate dependencies that may (or may not) be required for your app to work:",
        );
        for (importer, modules) in &failures {
            message.push_str(&format!("\n  {}", importer.display()));
            for module in modules {
                message.push_str(&format!("\n    - {}", module));
            }
        }
        builder.log().warn(message);
    }

    let plan = BundlePlan::build(&trace.files, out_dir)?;
    builder.rimraf(out_dir)?;
    plan.apply()?;

    let real_entry = fs::canonicalize(entry)?;
    let handler = real_entry
        .strip_prefix(&plan.ancestor)
        .map(to_posix)
        .unwrap_or_else(|_| to_posix(&real_entry));

    let vc_config = VcConfig {
        runtime: options.runtime.clone(),
        regions: if options.regions.is_empty() {
            None
        } else {
            Some(options.regions.clone())
        },
        memory: options.memory,
        max_duration: options.max_duration,
        handler,
        launcher_type: "Nodejs".to_string(),
    };
    fs::write(out_dir.join(".vc-config.json"), serde_json::to_string_pretty(&vc_config)?)?;
    fs::write(out_dir.join("package.json"), "{ \"type\": \"module\" }\n")?;

    builder
        .log()
        .minor(format!("Packaged {} files into {}", plan.copies.len(), out_dir.display()));
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildData, Logger};
    use crate::config::{Config, ValidatedConfig};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FixedTracer(Trace);

    impl DependencyTracer for FixedTracer {
        fn trace(&self, _entries: &[PathBuf]) -> Result<Trace> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_common_ancestor() {
        assert_eq!(
            common_ancestor(&[
                PathBuf::from("/app/build/server/index.js"),
                PathBuf::from("/app/node_modules/x/index.js"),
            ]),
            PathBuf::from("/app")
        );
        assert_eq!(
            common_ancestor(&[PathBuf::from("/a/x.js"), PathBuf::from("/b/y.js")]),
            PathBuf::from("/")
        );
        assert_eq!(
            common_ancestor(&[PathBuf::from("a/x.js"), PathBuf::from("b/y.js")]),
            PathBuf::new()
        );
        assert_eq!(
            common_ancestor(&[PathBuf::from("/app/index.js")]),
            PathBuf::from("/app")
        );
        assert_eq!(common_ancestor(&[]), PathBuf::new());
    }

    #[test]
    fn test_resolution_failures_ignore_builtins_and_parse_errors() {
        let warnings = vec![
            TraceWarning::Builtin {
                specifier: "node:fs".into(),
                importer: "/a.js".into(),
            },
            TraceWarning::ParseFailure {
                file: "/data.bin".into(),
                message: "not utf-8".into(),
            },
            TraceWarning::Unresolved {
                specifier: "optional-dep".into(),
                importer: "/a.js".into(),
            },
            TraceWarning::Unresolved {
                specifier: "./missing.js".into(),
                importer: "/a.js".into(),
            },
        ];
        let failures = resolution_failures(&warnings);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[Path::new("/a.js")], vec!["optional-dep", "./missing.js"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_dependency_becomes_relative_link() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let store = root.join("node_modules/.store/dep");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("index.js"), "export default 1;").unwrap();
        std::os::unix::fs::symlink(".store/dep", root.join("node_modules/dep")).unwrap();
        fs::create_dir_all(root.join("server")).unwrap();
        fs::write(root.join("server/index.js"), "import dep from 'dep';").unwrap();

        let files: BTreeSet<PathBuf> = [
            root.join("server/index.js"),
            root.join("node_modules/dep/index.js"),
            root.join("node_modules/.store/dep/index.js"),
        ]
        .into_iter()
        .collect();

        let out = root.join("out");
        let plan = BundlePlan::build(&files, &out).unwrap();
        assert_eq!(plan.ancestor, root);
        assert_eq!(plan.copies.len(), 2);
        assert!(out.read_dir().is_err(), "planning must not touch the output");

        plan.apply().unwrap();
        let link = out.join("node_modules/dep/index.js");
        let meta = fs::symlink_metadata(&link).unwrap();
        assert!(meta.file_type().is_symlink());
        assert!(fs::read_link(&link).unwrap().is_relative());
        assert_eq!(fs::read_to_string(&link).unwrap(), "export default 1;");
    }

    #[test]
    fn test_create_function_bundle_writes_manifest() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("build/server")).unwrap();
        fs::write(root.join("build/index.js"), "import './server/app.js';").unwrap();
        fs::write(root.join("build/server/app.js"), "").unwrap();

        let config = Arc::new(ValidatedConfig::resolve(Config::default(), &root).unwrap());
        let builder = Builder::new(config.clone(), BuildData::new(&config, Vec::new()), Logger::new(true));
        let tracer = FixedTracer(Trace {
            files: [root.join("build/index.js"), root.join("build/server/app.js")]
                .into_iter()
                .collect(),
            warnings: Vec::new(),
        });

        let out = root.join("fn.func");
        let options = FunctionOptions {
            runtime: "nodejs20.x".into(),
            regions: vec!["fra1".into()],
            memory: Some(1024),
            max_duration: None,
        };
        create_function_bundle(&builder, &tracer, &root.join("build/index.js"), &out, &options).unwrap();

        assert!(out.join("index.js").is_file());
        assert!(out.join("server/app.js").is_file());
        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(".vc-config.json")).unwrap()).unwrap();
        assert_eq!(manifest["handler"], "index.js");
        assert_eq!(manifest["launcherType"], "Nodejs");
        assert_eq!(manifest["regions"][0], "fra1");
        assert_eq!(manifest["memory"], 1024);
        assert!(manifest.get("maxDuration").is_none());
        assert_eq!(
            fs::read_to_string(out.join("package.json")).unwrap(),
            "{ \"type\": \"module\" }\n"
        );
    }
}
