// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Writes `views.js`, the view registry module.
//!
//! The module maps each view name to a lazy loader of the compiled
//! component's `render` export, and exports a `resolve(name)` helper that
//! falls back through `name.<ext>` and `name/index.<ext>` for every
//! configured template extension.

use super::{ArtifactWriter, GENERATED_HEADER};
use crate::config::ValidatedConfig;
use crate::error::Result;
use crate::manifest::View;
use crate::resolve::to_posix;
use std::fmt::Write as _;
use std::path::Path;

/// Import specifier of `file` as seen from a module in `from_dir`.
pub fn relative_import(from_dir: &Path, file: &Path) -> String {
    let relative = pathdiff::diff_paths(file, from_dir).unwrap_or_else(|| file.to_path_buf());
    let relative = to_posix(relative);
    if relative.starts_with("../") || relative.starts_with('/') {
        relative
    } else {
        format!("./{}", relative)
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Generates the source of `views.js`.
pub fn render_views(generated: &Path, extensions: &[String], views: &[View]) -> String {
    let mut out = String::from(GENERATED_HEADER);

    out.push_str("\nexport const views = {\n");
    for view in views {
        let _ = writeln!(
            out,
            "\t{}: () => import({}).then((module) => module.render),",
            js_string(&view.name),
            js_string(&relative_import(generated, &view.file))
        );
    }
    out.push_str("};\n");

    let extensions = extensions
        .iter()
        .map(|e| js_string(e))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = write!(
        out,
        "
const extensions = [{}];

export function resolve(name) {{
\tif (name in views) return views[name];
\tfor (const ext of extensions) {{
\t\tconst file = `${{name}}.${{ext}}`;
\t\tif (file in views) return views[file];
\t}}
\tfor (const ext of extensions) {{
\t\tconst index = name === '' ? `index.${{ext}}` : `${{name}}/index.${{ext}}`;
\t\tif (index in views) return views[index];
\t}}
\treturn undefined;
}}
",
        extensions
    );

    out
}

/// Writes `<generated>/views.js`.
pub fn write_views(
    writer: &ArtifactWriter,
    generated: &Path,
    config: &ValidatedConfig,
    views: &[View],
) -> Result<()> {
    let content = render_views(generated, &config.view_extensions, views);
    writer.write_if_changed(&generated.join("views.js"), &content)?;
    Ok(())
}
