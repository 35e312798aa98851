//! Info command - show the disc header and its partitions.
//!
//! # Examples
//!
//! ```bash
//! # Show disc info in table format
//! discfst info game.iso
//!
//! # Output as JSON for scripting
//! discfst info --json game.iso
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use discfst_core::crypto::CommonKey;
use discfst_core::mount::MountedPartition;

use crate::Disc;
use crate::output::{create_table, format_offset, format_size};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output format for info command
#[derive(Serialize)]
struct DiscInfo {
    disc_id: String,
    game_code: String,
    maker_code: String,
    disc_number: u8,
    disc_version: u8,
    title: String,
    partitions: Vec<PartitionSummary>,
}

#[derive(Serialize)]
struct PartitionSummary {
    index: u32,
    kind: String,
    offset: u64,
    title_id: String,
    common_key: &'static str,
    data_offset: u64,
    data_size: u64,
    has_dol: bool,
    fst_entries: u32,
}

impl From<&MountedPartition> for PartitionSummary {
    fn from(mounted: &MountedPartition) -> Self {
        let partition = &mounted.partition;
        Self {
            index: partition.index,
            kind: partition.kind.to_string(),
            offset: partition.offset,
            title_id: partition.title_id_hex(),
            common_key: common_key_name(partition.common_key),
            data_offset: partition.data_start(),
            data_size: partition.info.data_size,
            has_dol: mounted.fst_info.has_dol(),
            fst_entries: mounted.fst_entries,
        }
    }
}

fn common_key_name(key: CommonKey) -> &'static str {
    match key {
        CommonKey::Standard => "standard",
        CommonKey::Korean => "korean",
    }
}

#[instrument(level = "info", name = "cmd::info", skip_all)]
pub fn execute(disc: &mut Disc, args: &Args) -> Result<()> {
    let header = disc.header();
    let info = DiscInfo {
        disc_id: hex::encode(disc.disc_id().to_be_bytes()),
        game_code: header.game_code.clone(),
        maker_code: header.maker_code.clone(),
        disc_number: header.disc_number,
        disc_version: header.disc_version,
        title: header.title.clone(),
        partitions: disc.partitions().iter().map(PartitionSummary::from).collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Title", &info.title]);
    table.add_row(vec!["Game Code", &info.game_code]);
    table.add_row(vec!["Maker Code", &info.maker_code]);
    table.add_row(vec!["Disc Number", &info.disc_number.to_string()]);
    table.add_row(vec!["Disc Version", &info.disc_version.to_string()]);
    table.add_row(vec!["Disc ID", &info.disc_id]);
    table.add_row(vec!["Partitions", &info.partitions.len().to_string()]);
    println!("{table}");

    if info.partitions.is_empty() {
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec![
        "#", "Type", "Offset", "Title ID", "Key", "Data", "Size", "DOL", "FST Entries",
    ]);
    for p in &info.partitions {
        table.add_row(vec![
            p.index.to_string(),
            p.kind.clone(),
            format_offset(p.offset),
            p.title_id.clone(),
            p.common_key.to_string(),
            format_offset(p.data_offset),
            format_size(p.data_size),
            if p.has_dol { "yes" } else { "no" }.to_string(),
            p.fst_entries.to_string(),
        ]);
    }
    println!("{table}");

    Ok(())
}
