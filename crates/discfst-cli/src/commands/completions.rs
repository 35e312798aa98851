//! Shell completion generation for the discfst CLI.
//!
//! # Examples
//!
//! ```bash
//! # Bash (add to ~/.bashrc)
//! eval "$(discfst completions bash)"
//!
//! # Fish (save to completions directory)
//! discfst completions fish > ~/.config/fish/completions/discfst.fish
//! ```

use std::io;

use anyhow::Result;
use clap::{Args as ClapArgs, CommandFactory, ValueEnum};
use clap_complete::{Shell, generate};

use crate::Cli;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ShellType {
    /// Bourne Again SHell
    Bash,
    /// Z shell
    Zsh,
    /// Friendly Interactive SHell
    Fish,
    /// PowerShell
    Powershell,
    /// Elvish
    Elvish,
}

impl From<ShellType> for Shell {
    fn from(shell: ShellType) -> Self {
        match shell {
            ShellType::Bash => Shell::Bash,
            ShellType::Zsh => Shell::Zsh,
            ShellType::Fish => Shell::Fish,
            ShellType::Powershell => Shell::PowerShell,
            ShellType::Elvish => Shell::Elvish,
        }
    }
}

pub fn execute(args: &Args) -> Result<()> {
    let mut cmd = Cli::command();
    let shell: Shell = args.shell.into();

    generate(shell, &mut cmd, "discfst", &mut io::stdout());

    Ok(())
}
