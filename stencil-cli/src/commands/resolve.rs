//! `stencil resolve <url>`: which provider owns a URL, and what it parses to.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use stencil_core::RepositoryLocation;

use super::Environment;
use crate::GlobalArgs;

/// Arguments for `stencil resolve`.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Repository URL, optionally with `/tree/<ref>/<path>`.
    pub url: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Resolution<'a> {
    provider: &'a str,
    host: &'a str,
    location: &'a RepositoryLocation,
}

impl ResolveArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let env = Environment::load(global)?;
        let registry = env.registry()?;
        let Some(provider) = registry.provider_for_url(&self.url) else {
            bail!("no provider handles {}", self.url);
        };
        let Some(location) = provider.parse_url(&self.url) else {
            bail!("{} could not parse {}", provider.name(), self.url);
        };

        if self.json {
            let resolution = Resolution {
                provider: provider.name(),
                host: provider.host(),
                location: &location,
            };
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            return Ok(());
        }

        println!("{} {}@{}", "provider".bold(), provider.name(), provider.host());
        println!("  owner   {}", location.owner());
        println!("  repo    {}", location.repo());
        println!("  branch  {}", location.branch().unwrap_or("(default)"));
        println!("  path    {}", location.path().unwrap_or("(root)"));
        Ok(())
    }
}
