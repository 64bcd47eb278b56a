//! `facility sync`: run one pass in the foreground.

use anyhow::{bail, Context, Result};
use clap::Args;

use facility_sync::report::PassReport;
use facility_sync::target::StagedWrites;
use facility_sync::{pipeline, PassFailure};

/// Arguments for `facility sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Resolve and print what would be written; no writes, no watermark commit.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the pass envelope as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let config = super::load_config(&home)?;

        let run = pipeline::run_pass_at(&home, &config, self.dry_run);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&run.envelope())
                    .context("failed to serialize pass envelope")?
            );
        } else {
            match &run.result {
                Ok(report) => print_report(report),
                Err(failure) => print_failure(failure),
            }
            if let Some(staged) = &run.staged {
                print_staged(staged);
            }
        }

        if let Err(failure) = run.result {
            bail!("pass aborted in {}: {}", failure.state, failure.error);
        }
        Ok(())
    }
}

fn print_report(report: &PassReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let created = &report.created;
    let updated = &report.updated;

    println!(
        "{prefix}✓ created pass: {} sites over {} pages ({} created, {} already present, {} rejected)",
        created.sites,
        created.pages,
        created.created,
        created.already_present,
        created.rejected.len()
    );
    for code in &created.rejected {
        println!("  ✗  {code} rejected by target");
    }
    println!(
        "{prefix}✓ updated pass: {} units submitted over {} pages",
        updated.submitted, updated.pages
    );
    match &report.notified {
        Some(n) => println!(
            "{prefix}✓ notifications: {} sent, {} failed, {} not in target",
            n.sent, n.failed, n.not_in_target
        ),
        None => println!("{prefix}· notifications skipped (no recipients)"),
    }

    let cursors = &report.cursors;
    if let (Some(created), Some(updated)) = (&cursors.committed_created, &cursors.committed_updated) {
        println!("  watermarks → created {created}, updated {updated}");
    }
}

fn print_failure(failure: &PassFailure) {
    eprintln!("✗ pass failed in {}: {}", failure.state, failure.error);
    let created = &failure.report.created;
    if created.created > 0 {
        eprintln!("  {} units were created before the failure", created.created);
    }
}

fn print_staged(staged: &StagedWrites) {
    if staged.created.is_empty() && staged.updated.is_empty() && staged.messages.is_empty() {
        println!("[dry-run] nothing to write");
        return;
    }
    for entity in &staged.created {
        let parent = entity.parent_id().map_or("<root>", |id| id.as_str());
        println!("  +  {} {:?} under {parent}", entity.code, entity.name);
    }
    for entity in &staged.updated {
        println!("  ~  {} {:?}", entity.code, entity.name);
    }
    for message in &staged.messages {
        println!("  ✉  {}", message.subject);
    }
}
