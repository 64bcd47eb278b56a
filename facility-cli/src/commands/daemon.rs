//! `facility daemon`: foreground trigger service and manual triggering.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use facility_daemon::start_blocking;
use facility_sync::Envelope;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (trigger endpoint + schedule + config reload).
    Start,
    /// Ask a running daemon to run one pass and print its envelope.
    Trigger {
        /// Stage writes only; watermarks are not committed.
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Trigger { dry_run } => {
            let config = super::load_config(&home)?;
            let url = trigger_url(&config.daemon.listen, dry_run);
            let envelope = request_pass(&url)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&envelope)
                    .context("failed to render pass envelope")?
            );
            if !envelope.is_success() {
                bail!("daemon reported a failed pass (HTTP {})", envelope.http_status);
            }
        }
    }

    Ok(())
}

fn trigger_url(listen: &str, dry_run: bool) -> String {
    let base = if listen.starts_with("http://") || listen.starts_with("https://") {
        listen.trim_end_matches('/').to_string()
    } else {
        format!("http://{listen}")
    };
    if dry_run {
        format!("{base}/sync?dry_run=true")
    } else {
        format!("{base}/sync")
    }
}

/// POST to the trigger and decode the envelope; a failed pass still carries one.
fn request_pass(url: &str) -> Result<Envelope> {
    // A pass can take as long as the sync itself.
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(3_600))
        .build();
    let response = match agent.post(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(err)) => {
            return Err(err).with_context(|| format!("daemon is not reachable at {url}"));
        }
    };
    response
        .into_json::<Envelope>()
        .with_context(|| format!("unexpected response from {url}"))
}
