//! List command - list directory contents on a disc.
//!
//! # Examples
//!
//! ```bash
//! # List the partitions
//! discfst ls game.iso
//!
//! # List with details
//! discfst ls -l game.iso /0_metadata
//!
//! # Output as JSON for scripting
//! discfst ls --json game.iso /0 | jq '.entries[].name'
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use discfst_core::fs::Stat;

use super::normalize_path;
use crate::Disc;
use crate::output::{create_table, format_entry_type, format_size};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Path on the disc (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Show detailed information
    #[arg(short, long)]
    pub long: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// One entry per line (script-friendly)
    #[arg(short = '1')]
    pub one_per_line: bool,
}

/// JSON output format for ls command
#[derive(Serialize)]
struct LsOutput {
    path: String,
    entries: Vec<EntryInfo>,
}

#[derive(Serialize)]
struct EntryInfo {
    name: String,
    #[serde(rename = "type")]
    entry_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

impl EntryInfo {
    fn new(name: &str, stat: &Stat) -> Self {
        if stat.is_dir() {
            Self {
                name: name.to_string(),
                entry_type: "directory",
                size: None,
            }
        } else {
            Self {
                name: name.to_string(),
                entry_type: "file",
                size: Some(stat.size),
            }
        }
    }
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub fn execute(disc: &mut Disc, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let entries = disc.read_dir(&path)?;

    if args.json {
        print_json(&path, &entries)?;
    } else if args.long {
        print_long_format(&entries);
    } else {
        print_short_format(&entries, args.one_per_line);
    }

    Ok(())
}

fn print_json(path: &str, entries: &[(String, Stat)]) -> Result<()> {
    let output = LsOutput {
        path: path.to_string(),
        entries: entries
            .iter()
            .map(|(name, stat)| EntryInfo::new(name, stat))
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_long_format(entries: &[(String, Stat)]) {
    let mut table = create_table();
    table.set_header(vec!["Type", "Size", "Name"]);

    for (name, stat) in entries {
        if stat.is_dir() {
            table.add_row(vec![
                format_entry_type(true).to_string(),
                "-".to_string(),
                format!("{name}/"),
            ]);
        } else {
            table.add_row(vec![
                format_entry_type(false).to_string(),
                format_size(stat.size),
                name.clone(),
            ]);
        }
    }

    println!("{table}");
}

fn print_short_format(entries: &[(String, Stat)], one_per_line: bool) {
    let names: Vec<String> = entries
        .iter()
        .map(|(name, stat)| {
            if stat.is_dir() {
                format!("{name}/")
            } else {
                name.clone()
            }
        })
        .collect();

    if one_per_line || names.len() > 10 {
        for name in names {
            println!("{name}");
        }
    } else if !names.is_empty() {
        println!("{}", names.join("  "));
    }
}
