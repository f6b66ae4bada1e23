// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use kiln_cli::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Build and dev-server orchestration for server-rendered web apps", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Verbose mode: show all bundler output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: only show errors (useful for CI)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the development server
    Dev {
        /// Port to run the dev server on (defaults to dev.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (defaults to dev.host)
        #[arg(long)]
        host: Option<String>,
    },
    /// Build for production and run the configured adapter
    Build {
        /// Mode used to pick .env files: development, production
        #[arg(short, long, default_value = "production")]
        mode: String,
    },
    /// Regenerate views, config, env modules and tsconfig
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Dev { port, host } => {
            commands::dev::run(host, port, cli.verbose, cli.quiet).await?;
        }
        Commands::Build { mode } => {
            commands::build::run(&mode, cli.verbose, cli.quiet).await?;
        }
        Commands::Sync => {
            commands::sync::run(cli.quiet).await?;
        }
    }

    Ok(())
}
