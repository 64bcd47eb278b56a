//! `facility resolve <site-id>`: read-only chain preview.

use anyhow::{Context, Result};
use clap::Args;

use facility_core::SourceId;
use facility_sync::phcu::PhcuPlan;
use facility_sync::pipeline::{self, ChainPreview};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Registry site id.
    pub site_id: String,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let config = super::load_config(&home)?;
        let site_id = SourceId::from(self.site_id.as_str());

        let preview = pipeline::preview_chain(&config, &site_id)
            .with_context(|| format!("cannot resolve the chain for site {site_id}"))?;
        print_preview(&preview);
        Ok(())
    }
}

fn print_preview(preview: &ChainPreview) {
    if preview.steps.is_empty() {
        println!("✓ {} is already in the target", preview.leaf);
        return;
    }

    match &preview.anchor {
        Some(anchor) => println!(
            "{} needs {} units under {} ({})",
            preview.leaf,
            preview.steps.len(),
            anchor.display_name.as_deref().unwrap_or("existing unit"),
            anchor.id
        ),
        None => println!(
            "{} needs {} units starting from a new hierarchy root",
            preview.leaf,
            preview.steps.len()
        ),
    }

    for (depth, step) in preview.steps.iter().enumerate() {
        let indent = "  ".repeat(depth + 1);
        match &step.plan {
            PhcuPlan::Simple => println!("{indent}+ {} {:?}", step.code, step.name),
            PhcuPlan::ShellThenChild { shell_code } => println!(
                "{indent}+ {shell_code} (new PHCU shell), then {} {:?} under it",
                step.code, step.name
            ),
            PhcuPlan::ChildOfExistingShell { shell_code } => println!(
                "{indent}+ {} {:?} under PHCU shell {shell_code}",
                step.code, step.name
            ),
        }
    }
}
