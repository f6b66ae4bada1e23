// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Regenerates generated modules without building.

use console::style;
use kiln::{ArtifactCache, ArtifactWriter, Manifest, Mode, ValidatedConfig};
use std::time::Instant;

/// Writes the config module, view registry, env modules and tsconfig.
pub async fn run(quiet: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let root = std::env::current_dir()?;
    let config = ValidatedConfig::load(&root)?;

    let manifest = Manifest::collect(&config)?;
    let writer = ArtifactWriter::new(ArtifactCache::new());
    kiln::sync::sync_all(&writer, &config, &manifest, Mode::Development)?;

    if !quiet {
        println!(
            "{} {} {}",
            style("✓").green(),
            format_args!(
                "Synced {} views, {} assets ({} files written)",
                manifest.views.len(),
                manifest.assets.len(),
                writer.write_count()
            ),
            style(format!("{}ms", start.elapsed().as_millis())).dim()
        );
    }

    Ok(())
}
