// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server command with hot reload support.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kiln::resolve::resolve_entry;
use kiln::sync::launcher::write_dev_launcher;
use kiln::{ArtifactCache, ArtifactWriter, KilnError, Manifest, Mode, ValidatedConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::server::{create_server, DevState, ProcessEntryLoader};
use crate::watcher::{apply_changes, watch_roots, FileWatcher};

/// Runs the development server.
///
/// `host` and `port` override `dev.host` and `dev.port`.
pub async fn run(host: Option<String>, port: Option<u16>, verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let root = std::env::current_dir()?;
    let config = Arc::new(ValidatedConfig::load(&root)?);

    let entry = resolve_entry(&config.files.entry)
        .ok_or_else(|| KilnError::NoEntryFile(config.files.entry.clone()))?;

    // Initial sync so the entry can import generated modules
    let start = Instant::now();
    let manifest = Manifest::collect(&config)?;
    let writer = Arc::new(ArtifactWriter::new(ArtifactCache::new()));
    kiln::sync::sync_all(&writer, &config, &manifest, Mode::Development)?;
    if !quiet {
        println!(
            "  {} {} {}",
            style("✓").green(),
            style(format!(
                "Synced {} views, {} assets",
                manifest.views.len(),
                manifest.assets.len()
            ))
            .dim(),
            style(format!("{}ms", start.elapsed().as_millis())).dim()
        );
    }

    let launcher = write_dev_launcher(&writer, &config.generated_dir(), &entry)?;
    let loader = ProcessEntryLoader::new(
        &config.root,
        &launcher,
        config.dev.runtime.clone(),
        config.dev.runtime_port,
    )?;
    let state = Arc::new(DevState::new(config.clone(), manifest, Arc::new(loader)));

    // Changes arrive on the watcher thread and are applied on the runtime
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = FileWatcher::new(&watch_roots(&state), move |changes| {
        let _ = tx.send(changes);
    })?;

    let watch_state = state.clone();
    let watch_writer = writer.clone();
    tokio::spawn(async move {
        while let Some(changes) = rx.recv().await {
            let start = Instant::now();
            let display = changes
                .iter()
                .map(|c| {
                    c.path
                        .strip_prefix(&watch_state.config.root)
                        .unwrap_or(&c.path)
                        .display()
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join(", ");

            let spinner = (!quiet).then(|| {
                let pb = ProgressBar::new_spinner();
                if let Ok(template) = ProgressStyle::default_spinner().template("  {spinner:.cyan} kiln {msg}") {
                    pb.set_style(template);
                }
                pb.set_message(display.clone());
                pb.enable_steady_tick(Duration::from_millis(80));
                pb
            });

            match apply_changes(&watch_state, &watch_writer, &changes).await {
                Ok(reload) => {
                    if verbose {
                        tracing::info!("Reload: {:?}", reload);
                    }
                    if let Some(pb) = spinner {
                        pb.finish_with_message(format!(
                            "{} {} {}",
                            style("✓").green(),
                            style(&display).dim(),
                            style(format!("{}ms", start.elapsed().as_millis())).dim()
                        ));
                    }
                }
                Err(e) => {
                    if let Some(pb) = spinner {
                        pb.finish_and_clear();
                    }
                    eprintln!("  {} {}", style("✗").red(), style(e.to_string()).red());
                }
            }
        }
    });

    let host = host.unwrap_or_else(|| config.dev.host.clone());
    let port = port.unwrap_or(config.dev.port);
    let addr = format!("{}:{}", host, port);
    if !quiet {
        println!(
            "{} {}",
            style("Server:").cyan(),
            style(format!("http://{}", addr)).green().bold()
        );
        println!(
            "{} {}",
            style("Entry:").cyan(),
            style(entry.strip_prefix(&config.root).unwrap_or(&entry).display()).dim()
        );
        println!(
            "{} {}",
            style("Status:").cyan(),
            style("Watching for changes...").dim()
        );
        println!();
    }

    create_server(&addr, state).await?;

    Ok(())
}
