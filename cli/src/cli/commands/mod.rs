//! Command implementations.

pub mod auth;
pub mod branch;
pub mod changes;
pub mod remote;
pub mod repo;

use std::io;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;

/// Handle the `gitdeck completions` command.
pub fn handle_completions(shell: Shell) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut io::stdout());
}
