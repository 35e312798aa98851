//! Extract command - copy files from a disc to the local filesystem.
//!
//! # Examples
//!
//! ```bash
//! # Extract a single file
//! discfst extract game.iso /0/opening.bnr ./
//!
//! # Extract a whole partition, metadata included
//! discfst extract game.iso / ./game
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{debug, instrument};

use super::{join_path, normalize_path};
use crate::Disc;
use crate::output::format_size;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Source path on the disc
    pub source: String,

    /// Destination directory on the local filesystem
    pub dest: PathBuf,

    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,
}

/// Statistics for an extract operation
#[derive(Default)]
struct ExtractStats {
    files_extracted: usize,
    directories_created: usize,
    bytes_extracted: u64,
}

#[instrument(level = "info", name = "cmd::extract", skip_all, fields(source = %args.source))]
pub fn execute(disc: &mut Disc, args: &Args) -> Result<()> {
    let source = normalize_path(&args.source);
    let id = disc.lookup(&source)?;
    let is_dir = disc.tree()[id].is_dir();
    let mut stats = ExtractStats::default();

    if is_dir {
        create_dir(&args.dest, &mut stats)?;
        let entries: Vec<_> = disc.walk(&source)?.collect();
        for (relative, stat) in entries {
            let target = target_path(&args.dest, &relative)?;
            if stat.is_dir() {
                create_dir(&target, &mut stats)?;
            } else {
                extract_file(disc, &join_path(&source, &relative), &target, args.force, &mut stats)?;
            }
        }
    } else {
        create_dir(&args.dest, &mut stats)?;
        let target = target_path(&args.dest, &disc.tree()[id].name)?;
        extract_file(disc, &source, &target, args.force, &mut stats)?;
    }

    eprintln!(
        "Extracted {} files ({}), created {} directories",
        stats.files_extracted,
        format_size(stats.bytes_extracted),
        stats.directories_created
    );
    Ok(())
}

/// Join a disc-relative path onto `dest`, refusing anything that would
/// land outside it.
fn target_path(dest: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let contained = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !contained || relative.as_os_str().is_empty() {
        anyhow::bail!(
            "Refusing to extract {} outside {}",
            relative.display(),
            dest.display()
        );
    }
    Ok(dest.join(relative))
}

fn create_dir(path: &Path, stats: &mut ExtractStats) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    stats.directories_created += 1;
    Ok(())
}

fn extract_file(
    disc: &mut Disc,
    source: &str,
    target: &Path,
    force: bool,
    stats: &mut ExtractStats,
) -> Result<()> {
    if target.exists() && !force {
        anyhow::bail!(
            "Destination already exists: {} (use --force to overwrite)",
            target.display()
        );
    }

    let contents = disc
        .read_to_end(source)
        .with_context(|| format!("Failed to read {source}"))?;
    fs::write(target, &contents)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    debug!(source, target = %target.display(), bytes = contents.len(), "Extracted file");

    stats.files_extracted += 1;
    stats.bytes_extracted += contents.len() as u64;
    Ok(())
}
