// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Production build command.

use crate::build::{BuildOrchestrator, CommandBundler};
use console::style;
use kiln::{ArtifactCache, ArtifactWriter, Logger, Mode, ValidatedConfig};
use std::sync::Arc;
use std::time::Instant;

/// Builds the project and runs the configured adapter.
pub async fn run(mode: &str, verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let mode: Mode = mode.parse().map_err(anyhow::Error::msg)?;
    let root = std::env::current_dir()?;
    let config = Arc::new(ValidatedConfig::load(&root)?);

    if !quiet {
        println!(
            "{} {}",
            style("Building").cyan(),
            style(format!("{} ({})", root.display(), mode.as_str())).dim()
        );
    }

    let bundler = CommandBundler::new(
        config.bundler.command.clone(),
        config.bundler.args.clone(),
        &config.out_dir,
    )
    .with_verbose(verbose);

    let mut orchestrator = BuildOrchestrator::new(
        config.clone(),
        Arc::new(bundler),
        ArtifactWriter::new(ArtifactCache::new()),
        mode,
        Logger::new(quiet),
    );

    let report = match orchestrator.build().await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("  {} {}", style("✗").red(), style(format!("Build failed: {}", e)).red());
            return Err(e.into());
        }
    };

    if !orchestrator.adapt(report.build_data).await? && !quiet {
        println!();
        println!(
            "{} {}",
            style("!").yellow(),
            style("No adapter configured, the app was built but not packaged for deployment.").yellow()
        );
        println!(
            "  {}",
            style("Add an [adapter] section to kiln.toml, for example: name = \"node\"").dim()
        );
    }

    if !quiet {
        println!(
            "{} {} {}",
            style("✓").green(),
            style("Build complete").bold(),
            style(format!("{}ms", start.elapsed().as_millis())).dim()
        );
    }

    Ok(())
}
