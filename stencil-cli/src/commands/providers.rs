//! `stencil providers`: configured hosts in match order.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use super::Environment;
use crate::GlobalArgs;

/// Arguments for `stencil providers`.
#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct ProviderRow {
    #[tabled(rename = "#")]
    order: usize,
    #[tabled(rename = "provider")]
    name: String,
    #[tabled(rename = "host")]
    host: String,
}

impl ProvidersArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let env = Environment::load(global)?;
        let registry = env.registry()?;
        let rows: Vec<ProviderRow> = registry
            .providers()
            .iter()
            .enumerate()
            .map(|(i, provider)| ProviderRow {
                order: i + 1,
                name: provider.name().to_string(),
                host: provider.host().to_string(),
            })
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
