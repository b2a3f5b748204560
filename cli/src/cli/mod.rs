//! CLI module for gitdeck.

pub mod args;
pub mod commands;

pub use args::{AuthCommands, BranchCommands, Cli, Commands, RepoCommands};
