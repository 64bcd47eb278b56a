//! `facility status`: watermark visibility.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use facility_core::{CursorKind, SyncConfig};
use facility_sync::cursor_store::{adjust_for_skew, format_stamp};
use facility_sync::{CursorStore, SyncError};

/// Arguments for `facility status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let config = super::load_config(&home)?;
        let cursors = CursorStore::for_config_at(&home, &config);

        let rows = CursorKind::all()
            .iter()
            .map(|kind| cursor_status(&cursors, *kind, config.sync.skew_hours))
            .collect::<Vec<_>>();

        if self.json {
            let payload = StatusJson {
                source: &config.source.base_url,
                target: &config.target.base_url,
                state_dir: cursors.dir().display().to_string(),
                recipients: config.notify.recipients.len(),
                cursors: rows,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&config, &cursors, rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CursorStatus {
    kind: String,
    path: String,
    /// Stored watermark, `None` when missing or unreadable.
    stored: Option<String>,
    /// Filter the next pass will send (stored minus skew).
    filter_from: Option<String>,
    age: String,
    error: Option<String>,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    source: &'a str,
    target: &'a str,
    state_dir: String,
    recipients: usize,
    cursors: Vec<CursorStatus>,
}

#[derive(Tabled)]
struct CursorRow {
    #[tabled(rename = "watermark")]
    kind: String,
    #[tabled(rename = "stored")]
    stored: String,
    #[tabled(rename = "next filter")]
    filter_from: String,
    #[tabled(rename = "age")]
    age: String,
}

fn cursor_status(cursors: &CursorStore, kind: CursorKind, skew_hours: i64) -> CursorStatus {
    let path = cursors.path(kind).display().to_string();
    match cursors.read(kind) {
        Ok(stamp) => CursorStatus {
            kind: kind.to_string(),
            path,
            stored: Some(format_stamp(stamp)),
            filter_from: Some(format_stamp(adjust_for_skew(stamp, skew_hours))),
            age: format_age(stamp, Utc::now()),
            error: None,
        },
        Err(err) => CursorStatus {
            kind: kind.to_string(),
            path,
            stored: None,
            filter_from: None,
            age: "never".to_string(),
            error: Some(describe(&err)),
        },
    }
}

fn describe(err: &SyncError) -> String {
    match err {
        SyncError::CursorUnavailable { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

fn format_age(stamp: DateTime<FixedOffset>, now: DateTime<Utc>) -> String {
    let secs = (now - stamp.with_timezone(&Utc)).num_seconds();
    if secs < 0 {
        return "in the future".to_string();
    }
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

fn print_table(config: &SyncConfig, cursors: &CursorStore, rows: Vec<CursorStatus>) {
    println!(
        "Facility v{} | {} → {} | {} recipients",
        env!("CARGO_PKG_VERSION"),
        config.source.base_url,
        config.target.base_url,
        config.notify.recipients.len(),
    );
    println!("state: {}", cursors.dir().display());

    let missing = rows.iter().filter(|r| r.stored.is_none()).count();
    let table_rows: Vec<CursorRow> = rows
        .into_iter()
        .map(|row| CursorRow {
            kind: row.kind,
            stored: match row.stored {
                Some(stored) => stored.green().to_string(),
                None => "MISSING".red().bold().to_string(),
            },
            filter_from: row.filter_from.unwrap_or_else(|| "-".to_string()),
            age: row.age,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if missing > 0 {
        println!("Run 'facility init' to seed missing watermarks; a pass cannot start without them.");
    }
}
