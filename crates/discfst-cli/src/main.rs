#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
// Disable with `--no-default-features` if debugging allocator issues.
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod config;
mod exit_code;
mod output;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use discfst_core::crypto::{Aes128Cbc, CryptoError};
use discfst_core::disc::{DiscError, FileBlockSource};
use discfst_core::mount::{FsError, MountError};
use discfst_core::{MountOptions, MountedDisc};

use crate::commands::{cat, completions, extract, info, ls, tree};
use crate::config::Config;

/// A disc image mounted from a file.
pub type Disc = MountedDisc<FileBlockSource, Aes128Cbc>;

/// Inspect the file systems of encrypted Wii disc images
#[derive(Parser)]
#[command(name = "discfst")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Show the disc header and partitions
    discfst info game.iso

    # List the first partition's root
    discfst ls game.iso /0

    # Dump the partition's executable
    discfst cat game.iso /0_metadata/main.dol > main.dol

    # Extract everything below a directory
    discfst extract game.iso /0 ./out

    # Use an image alias (from ~/.config/discfst/config.toml)
    discfst tree @zelda /0
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// When to use colored output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorChoice,

    /// Hide the per-partition metadata directories
    #[arg(long, global = true)]
    no_metadata: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show disc header and partition information
    Info(ImageCommand<info::Args>),

    /// List directory contents
    Ls(ImageCommand<ls::Args>),

    /// Show directory tree
    Tree(ImageCommand<tree::Args>),

    /// Write a file's contents to stdout
    Cat(ImageCommand<cat::Args>),

    /// Copy files from the disc to the local filesystem
    Extract(ImageCommand<extract::Args>),

    /// Generate shell completions
    Completions(completions::Args),
}

/// Wrapper for commands that operate on a disc image
#[derive(Parser, Clone)]
pub struct ImageCommand<T: clap::Args> {
    /// Path to the disc image (or @alias from config)
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    #[command(flatten)]
    pub args: T,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            // Only print error if not quiet mode (quiet is parsed separately for this)
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose, cli.color);
    }

    let no_metadata = cli.no_metadata;
    match cli.command {
        Commands::Completions(args) => completions::execute(&args),
        Commands::Info(cmd) => execute_image_command(&cmd, no_metadata, info::execute),
        Commands::Ls(cmd) => execute_image_command(&cmd, no_metadata, ls::execute),
        Commands::Tree(cmd) => execute_image_command(&cmd, no_metadata, tree::execute),
        Commands::Cat(cmd) => execute_image_command(&cmd, no_metadata, cat::execute),
        Commands::Extract(cmd) => execute_image_command(&cmd, no_metadata, extract::execute),
    }
}

/// Execute a command that requires a mounted image
fn execute_image_command<T, F>(cmd: &ImageCommand<T>, no_metadata: bool, f: F) -> Result<()>
where
    T: clap::Args,
    F: FnOnce(&mut Disc, &T) -> Result<()>,
{
    let config = Config::load()?;
    let image_path = config.resolve_image(&cmd.image.to_string_lossy())?;
    let mut options = config.mount;
    if no_metadata {
        options.expose_metadata = false;
    }

    let mut disc = mount_image(&image_path, &options)?;
    let result = f(&mut disc, &cmd.args);
    drop(disc.unmount());
    result
}

/// Open an image file and mount it.
fn mount_image(path: &Path, options: &MountOptions) -> Result<Disc> {
    let source = FileBlockSource::open(path)
        .with_context(|| format!("Failed to open disc image: {}", path.display()))?;
    MountedDisc::mount(source, Aes128Cbc::new(), options)
        .with_context(|| format!("Failed to mount disc image: {}", path.display()))
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8, color: ColorChoice) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .with_ansi(match color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stderr().is_terminal(),
        })
        .init();
}

fn disc_error_code(e: &DiscError) -> Option<u8> {
    match e {
        DiscError::BadMagic { .. } | DiscError::InvalidStructure { .. } => {
            Some(exit_code::IMAGE_INVALID)
        }
        DiscError::Crypto { .. } => Some(exit_code::KEY_FAILED),
        DiscError::Io { .. } => None,
    }
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(fs_err) = cause.downcast_ref::<FsError>() {
            match fs_err {
                FsError::NotFound(_) => return exit_code::NOT_FOUND,
                FsError::IsADirectory(_) | FsError::NotADirectory(_) => {
                    return exit_code::USAGE_ERROR;
                }
                _ => {}
            }
        }

        if let Some(mount_err) = cause.downcast_ref::<MountError>() {
            match mount_err {
                MountError::ScratchTooSmall { .. }
                | MountError::InvalidDeviceName(_)
                | MountError::DeviceExists(_) => return exit_code::MOUNT_FAILED,
                MountError::Metadata { .. } | MountError::Fst { .. } => {
                    return exit_code::IMAGE_INVALID;
                }
                // Transparent: the disc error itself is not in the chain
                MountError::Disc(disc_err) => {
                    if let Some(code) = disc_error_code(disc_err) {
                        return code;
                    }
                }
                MountError::RawMode(_) => {}
            }
        }

        if let Some(code) = cause.downcast_ref::<DiscError>().and_then(disc_error_code) {
            return code;
        }

        if cause.downcast_ref::<CryptoError>().is_some() {
            return exit_code::KEY_FAILED;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                io::ErrorKind::UnexpectedEof => return exit_code::IMAGE_INVALID,
                io::ErrorKind::Interrupted => return exit_code::CANCELLED,
                _ => {}
            }
        }

        if cause.downcast_ref::<toml::de::Error>().is_some() {
            return exit_code::USAGE_ERROR;
        }
    }

    let msg = format!("{e:#}").to_lowercase();
    if msg.contains("unknown image alias") {
        exit_code::USAGE_ERROR
    } else {
        exit_code::GENERAL_ERROR
    }
}
