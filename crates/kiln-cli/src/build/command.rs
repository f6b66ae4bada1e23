// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Bundling through an external command.
//!
//! Each job is written to `<out_dir>/jobs/<phase>.json` and the configured
//! command runs with `{job}`, `{phase}` and `{outdir}` substituted in its
//! arguments. Without a command, inputs are copied unchanged.

use async_trait::async_trait;
use console::style;
use kiln::packager::common_ancestor;
use kiln::{BundleJob, BundleOutput, Bundler, CompileError, KilnError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;

/// Runs `bundler.command` for every job.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    command: Option<String>,
    args: Vec<String>,
    jobs_dir: PathBuf,
    verbose: bool,
}

impl CommandBundler {
    /// Creates a bundler. `command` of `None` copies inputs instead.
    pub fn new(command: Option<String>, args: Vec<String>, out_dir: &Path) -> Self {
        Self {
            command,
            args,
            jobs_dir: out_dir.join("jobs"),
            verbose: false,
        }
    }

    /// Prints bundler stdout.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Substitutes placeholders in the configured arguments.
    pub fn expand_args(&self, job_file: &Path, job: &BundleJob) -> Vec<String> {
        let job_file = job_file.to_string_lossy();
        let out_dir = job.out_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{job}", &job_file)
                    .replace("{phase}", job.phase.as_str())
                    .replace("{outdir}", &out_dir)
            })
            .collect()
    }

    fn write_job(&self, job: &BundleJob) -> Result<PathBuf> {
        fs::create_dir_all(&self.jobs_dir)?;
        let path = self.jobs_dir.join(format!("{}.json", job.phase.as_str()));
        fs::write(&path, serde_json::to_string_pretty(job)?)?;
        Ok(path)
    }

    async fn run(&self, program: &str, job_file: &Path, job: &BundleJob) -> Result<()> {
        let args = self.expand_args(job_file, job);
        tracing::debug!("Running bundler: {} {:?}", program, args);

        let output = TokioCommand::new(program)
            .args(&args)
            .current_dir(&job.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if self.verbose {
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                println!("  {} {}", style("bundler").dim(), line);
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(KilnError::Compile(
                CompileError::new(format!(
                    "{} failed for the {} bundle ({})",
                    program,
                    job.phase.as_str(),
                    output.status
                ))
                .with_stack(stderr),
            ));
        }
        Ok(())
    }
}

/// Copies every input into `out_dir`, keeping its path relative to the
/// deepest directory shared by all inputs.
fn copy_inputs(job: &BundleJob) -> Result<()> {
    fs::create_dir_all(&job.out_dir)?;
    let ancestor = common_ancestor(&job.inputs);
    for input in &job.inputs {
        let relative = match input.strip_prefix(&ancestor) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let destination = job.out_dir.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(input, destination)?;
    }
    Ok(())
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn bundle(&self, job: BundleJob) -> Result<BundleOutput> {
        let job_file = self.write_job(&job)?;

        match &self.command {
            Some(program) => self.run(program, &job_file, &job).await?,
            None => {
                tracing::warn!(
                    "No bundler configured, copying {} {} inputs",
                    job.inputs.len(),
                    job.phase.as_str()
                );
                copy_inputs(&job)?;
            }
        }

        BundleOutput::scan(&job.out_dir)
    }
}
