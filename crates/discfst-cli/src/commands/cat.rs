use std::io::{self, Write};

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use super::normalize_path;
use crate::Disc;

#[derive(ClapArgs)]
pub struct Args {
    /// File path on the disc
    pub file: String,
}

#[instrument(level = "info", name = "cmd::cat", skip_all, fields(file = %args.file))]
pub fn execute(disc: &mut Disc, args: &Args) -> Result<()> {
    let path = normalize_path(&args.file);
    let contents = disc.read_to_end(&path)?;
    io::stdout().write_all(&contents)?;
    Ok(())
}
