use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use super::{join_path, normalize_path};
use crate::Disc;
use crate::output::format_size;

#[derive(ClapArgs)]
pub struct Args {
    /// Starting path (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Maximum depth to display
    #[arg(short = 'd', long)]
    pub max_depth: Option<usize>,

    /// Show file sizes
    #[arg(short, long)]
    pub size: bool,
}

#[instrument(level = "info", name = "cmd::tree", skip_all, fields(path = %args.path))]
pub fn execute(disc: &mut Disc, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    // Fail early with the proper error if the start is missing or a file.
    disc.read_dir(&path)?;

    let name = if path == "/" { "." } else { &args.path };
    println!("{name}");
    let (dirs, files) = print_tree_recursive(disc, &path, "", 0, args)?;
    println!();
    println!("{dirs} directories, {files} files");

    Ok(())
}

fn print_tree_recursive(
    disc: &Disc,
    path: &str,
    prefix: &str,
    depth: usize,
    args: &Args,
) -> Result<(usize, usize)> {
    if args.max_depth.is_some_and(|max| depth >= max) {
        return Ok((0, 0));
    }

    let entries = disc.read_dir(path)?;
    let total = entries.len();
    let (mut dirs, mut files) = (0, 0);

    for (i, (name, stat)) in entries.iter().enumerate() {
        let is_last = i + 1 == total;
        let connector = if is_last { "└── " } else { "├── " };

        if stat.is_dir() {
            dirs += 1;
            println!("{prefix}{connector}{name}/");
            let new_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            let (d, f) =
                print_tree_recursive(disc, &join_path(path, name), &new_prefix, depth + 1, args)?;
            dirs += d;
            files += f;
        } else {
            files += 1;
            if args.size {
                println!("{prefix}{connector}{name} [{}]", format_size(stat.size));
            } else {
                println!("{prefix}{connector}{name}");
            }
        }
    }

    Ok((dirs, files))
}
