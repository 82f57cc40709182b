//! `stencil sync`: open template-upgrade pull requests on drifted targets.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use stencil_sync::{FailureStage, SkipReason, SyncReport, SyncResult};

use super::{run_batch, BatchArgs, BatchMode, Environment};
use crate::GlobalArgs;

/// Arguments for `stencil sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Template version the pull requests upgrade to.
    #[arg(long)]
    pub current_version: String,

    /// Report what would be proposed without opening pull requests.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let env = Environment::load(global)?;
        let mode = if self.dry_run {
            BatchMode::Preview
        } else {
            BatchMode::Submit
        };
        let report = run_batch(&env, &self.batch, &self.current_version, mode)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report, self.dry_run);
        }
        finish(&report)
    }
}

/// Non-zero exit when the run aborted or any target failed.
pub(crate) fn finish(report: &SyncReport) -> Result<()> {
    if let Some(err) = &report.aborted {
        bail!("template sync aborted: {err}");
    }
    let failed = report.summary().failed;
    if failed > 0 {
        bail!("{failed} target(s) failed");
    }
    Ok(())
}

fn print_report(report: &SyncReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    if report.aborted.is_some() {
        return;
    }
    if report.results.is_empty() {
        println!("{prefix}No targets for '{}'.", report.template);
        return;
    }

    for (target, result) in &report.results {
        match result {
            SyncResult::Created(pr) => {
                println!("  {}  {target}  #{} {}", "✓".green(), pr.number, pr.url)
            }
            SyncResult::Previewed(preview) => println!(
                "  {}  {target}  {} file(s) would change",
                "~".yellow(),
                preview.changes.len()
            ),
            SyncResult::Skipped { reason } => {
                println!("  {}  {target}  {}", "·".dimmed(), skip_label(*reason))
            }
            SyncResult::Failed { stage, message } => println!(
                "  {}  {target}  {} failed: {message}",
                "✗".red(),
                stage_label(*stage)
            ),
        }
    }

    let summary = report.summary();
    println!(
        "{prefix}'{}': {} created, {} previewed, {} skipped, {} failed",
        report.template, summary.created, summary.previewed, summary.skipped, summary.failed
    );
}

pub(crate) fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NoDrift => "up to date",
        SkipReason::EntityNotFound => "not in catalog",
        SkipReason::NoProvider => "no provider for repository",
        SkipReason::NoRepositoryUrl => "no repository url",
        SkipReason::Cancelled => "cancelled",
    }
}

pub(crate) fn stage_label(stage: FailureStage) -> &'static str {
    match stage {
        FailureStage::Resolve => "resolve",
        FailureStage::Fetch => "fetch",
        FailureStage::Submit => "submit",
        FailureStage::Timeout => "timeout",
    }
}
