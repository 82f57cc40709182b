//! `stencil diff <template>`: show unified diffs for what sync would propose.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use stencil_sync::{unified_diff, SyncResult};

use super::sync::{finish, skip_label, stage_label};
use super::{run_batch, BatchArgs, BatchMode, Environment};
use crate::GlobalArgs;

/// Arguments for `stencil diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Version recorded in the previews; only affects logging.
    #[arg(long, default_value = "")]
    pub current_version: String,
}

impl DiffArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let env = Environment::load(global)?;
        let report = run_batch(&env, &self.batch, &self.current_version, BatchMode::Preview)?;

        let mut any = false;
        for (target, result) in &report.results {
            match result {
                SyncResult::Previewed(preview) => {
                    any = true;
                    println!("{} {target} ({})", "==>".bold(), preview.url);
                    for (path, change) in preview.changes.iter() {
                        let current = preview.current.get(path).unwrap_or_default();
                        let proposed = change.content().unwrap_or_default();
                        let diff = unified_diff(path, current, proposed);
                        print!("{diff}");
                        if !diff.ends_with('\n') {
                            println!();
                        }
                    }
                }
                SyncResult::Skipped { reason } => {
                    tracing::debug!(entity = %target, reason = skip_label(*reason), "no diff");
                }
                SyncResult::Failed { stage, message } => {
                    eprintln!("{} {target}: {} failed: {message}", "✗".red(), stage_label(*stage));
                }
                SyncResult::Created(_) => {}
            }
        }

        if !any && report.aborted.is_none() {
            println!("No differences for '{}'.", report.template);
        }
        finish(&report)
    }
}
