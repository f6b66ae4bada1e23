// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Static import scanning.
//!
//! Finds the module specifiers a JavaScript (or template) source refers to
//! through `import`, `export ... from`, `import()` and `require()`. Only
//! string literal specifiers are reported.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref COMMENTS: Regex = Regex::new(
        r#"("(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|`(?:[^`\\]|\\.)*`)|//[^\n]*|/\*[\s\S]*?\*/"#
    )
    .unwrap();
    static ref STATIC_IMPORT: Regex = Regex::new(
        r#"(?:^|[^.\w$])(?:import|export)\s*(?:[\w$*{}\s,]*?\s*from\s*)?["']([^"'\n]+)["']"#
    )
    .unwrap();
    static ref DYNAMIC_IMPORT: Regex =
        Regex::new(r#"(?:^|[^.\w$])(?:import|require)\s*\(\s*["']([^"'\n]+)["']\s*\)"#).unwrap();
}

/// Removes comments, keeping string literals intact.
fn strip_comments(source: &str) -> String {
    COMMENTS.replace_all(source, "$1").into_owned()
}

/// Returns the specifiers imported by `source`, in order of first appearance.
pub fn scan_imports(source: &str) -> Vec<String> {
    let source = strip_comments(source);
    let mut found: Vec<(usize, String)> = Vec::new();

    for regex in [&*STATIC_IMPORT, &*DYNAMIC_IMPORT] {
        for captures in regex.captures_iter(&source) {
            if let Some(specifier) = captures.get(1) {
                found.push((specifier.start(), specifier.as_str().to_string()));
            }
        }
    }

    found.sort_by_key(|(position, _)| *position);
    let mut specifiers: Vec<String> = Vec::new();
    for (_, specifier) in found {
        if !specifiers.contains(&specifier) {
            specifiers.push(specifier);
        }
    }
    specifiers
}

/// Whether `specifier` is relative to the importing file.
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_import_forms() {
        let source = r#"
import { env } from '$env/dynamic/private';
import Header from "./Header.html";
import * as utils from "../lib/utils.js";
import "./side-effect.js";
export { helper } from './helper.js';
export * from "./all.js";
const lazy = await import('./lazy.js');
const fs = require("node:fs");
"#;
        assert_eq!(
            scan_imports(source),
            vec![
                "$env/dynamic/private",
                "./Header.html",
                "../lib/utils.js",
                "./side-effect.js",
                "./helper.js",
                "./all.js",
                "./lazy.js",
                "node:fs",
            ]
        );
    }

    #[test]
    fn test_scan_multiline_named_imports() {
        let source = "import {\n  a,\n  b\n} from './ab.js';";
        assert_eq!(scan_imports(source), vec!["./ab.js"]);
    }

    #[test]
    fn test_comments_are_ignored() {
        let source = r#"
// import secret from '$env/static/private';
/* import other from './other.js'; */
const url = "http://example.com";
import ok from './ok.js';
"#;
        assert_eq!(scan_imports(source), vec!["./ok.js"]);
    }

    #[test]
    fn test_template_script_block() {
        let source = r#"<script>
  import { PUBLIC_URL } from '$env/static/public';
</script>
<a href="{PUBLIC_URL}">link</a>"#;
        assert_eq!(scan_imports(source), vec!["$env/static/public"]);
    }

    #[test]
    fn test_member_calls_are_not_imports() {
        assert!(scan_imports("loader.import('./x.js'); obj.require('./y.js');").is_empty());
    }

    #[test]
    fn test_is_relative() {
        assert!(is_relative("./a.js"));
        assert!(is_relative("../a.js"));
        assert!(!is_relative("lodash"));
        assert!(!is_relative("$env/static/public"));
    }
}
