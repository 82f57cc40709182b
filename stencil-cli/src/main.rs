//! Stencil: keep scaffolded repositories in step with their software template.
//!
//! # Usage
//!
//! ```text
//! stencil sync <template-ref> --current-version <v> [--previous-version <v>] [--target <ref>]... [--dry-run] [--json]
//! stencil diff <template-ref> [--target <ref>]...
//! stencil providers [--json]
//! stencil resolve <url> [--json]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use commands::{
    diff::DiffArgs, providers::ProvidersArgs, resolve::ResolveArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stencil",
    version,
    about = "Open template-upgrade pull requests across scaffolded repositories",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file to use instead of `~/.stencil/config.yaml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open pull requests on every target that drifted from the template.
    Sync(SyncArgs),

    /// Show unified diffs of what `sync` would propose.
    Diff(DiffArgs),

    /// List the configured VCS providers in match order.
    Providers(ProvidersArgs),

    /// Show which provider handles a URL and how it is parsed.
    Resolve(ResolveArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_json);
    match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Diff(args) => args.run(&cli.global),
        Commands::Providers(args) => args.run(&cli.global),
        Commands::Resolve(args) => args.run(&cli.global),
    }
}
