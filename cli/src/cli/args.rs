//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Git repository workbench.
///
/// Gitdeck keeps a list of your repositories, signs in to GitHub with the
/// device flow, and runs branch, staging and sync operations against the
/// active repository.
#[derive(Parser, Debug)]
#[command(name = "gitdeck")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Repository to operate on instead of the active one.
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage GitHub authentication.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Manage known repositories.
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// List, create, switch and merge branches.
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },

    /// Show working-tree changes, split into staged and unstaged.
    Status,

    /// Show the diff of a working-tree file against HEAD.
    Diff {
        /// File path relative to the repository root.
        path: String,
    },

    /// Stage a file for the next commit.
    Stage(PathSelection),

    /// Remove a file from the next commit.
    Unstage(PathSelection),

    /// Commit the staged changes.
    Commit {
        /// Commit message.
        #[arg(short, long)]
        message: String,
    },

    /// Show commit history of the checked-out branch.
    Log {
        /// Number of commits to show (defaults to the configured page size).
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Show the files a commit changed, or one file's diff within it.
    Show {
        /// Commit id or revision.
        commit: String,

        /// Show the diff of this file within the commit.
        path: Option<String>,
    },

    /// Fetch from the configured remote.
    Fetch,

    /// Push the checked-out branch.
    ///
    /// Fetches first unless disabled here or in the configuration.
    Push {
        /// Skip the fetch before pushing.
        #[arg(long)]
        no_fetch: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// A single path or every change.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct PathSelection {
    /// File path relative to the repository root.
    pub path: Option<String>,

    /// Apply to every changed file.
    #[arg(short, long)]
    pub all: bool,
}

/// Authentication subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Log in with the GitHub device flow.
    Login {
        /// Don't open the browser automatically.
        #[arg(long)]
        no_browser: bool,
    },

    /// Log out and remove the stored token.
    Logout,

    /// Show current authentication status.
    Status,
}

/// Repository registry subcommands.
#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Add an existing local repository.
    Add {
        /// Path to the repository.
        path: PathBuf,
    },

    /// List known repositories.
    List,

    /// Make a known repository the active one.
    Use {
        /// Path to the repository.
        path: PathBuf,
    },

    /// Forget a repository. Files on disk are untouched.
    Remove {
        /// Path to the repository.
        path: PathBuf,
    },

    /// Clone a remote repository and add it.
    Clone {
        /// Remote URL.
        url: String,

        /// Destination directory.
        destination: PathBuf,
    },

    /// List your GitHub repositories.
    Github,
}

/// Branch subcommands.
#[derive(Subcommand, Debug)]
pub enum BranchCommands {
    /// List local and remote branches.
    List,

    /// Create a branch at HEAD.
    Create {
        /// Name of the new branch.
        name: String,
    },

    /// Check out a branch.
    ///
    /// A name that only exists on the remote gets a local tracking branch.
    Checkout {
        /// Branch name.
        name: String,
    },

    /// Report how SOURCE would merge into TARGET without changing anything.
    Analyze {
        /// Branch to merge from.
        source: String,

        /// Branch to merge into.
        target: String,
    },

    /// Merge SOURCE into TARGET.
    Merge {
        /// Branch to merge from.
        source: String,

        /// Branch to merge into.
        target: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_repo_flag_is_accepted_after_subcommand() {
        let cli = Cli::parse_from(["gitdeck", "branch", "list", "--repo", "/repo/a"]);
        assert_eq!(cli.repo, Some(PathBuf::from("/repo/a")));
        assert!(matches!(
            cli.command,
            Commands::Branch {
                command: BranchCommands::List
            }
        ));
    }

    #[test]
    fn stage_requires_path_or_all() {
        assert!(Cli::try_parse_from(["gitdeck", "stage"]).is_err());
        assert!(Cli::try_parse_from(["gitdeck", "stage", "a.txt", "--all"]).is_err());

        let cli = Cli::parse_from(["gitdeck", "unstage", "--all"]);
        assert!(matches!(
            cli.command,
            Commands::Unstage(PathSelection { path: None, all: true })
        ));
    }

    #[test]
    fn push_parses_no_fetch() {
        let cli = Cli::parse_from(["gitdeck", "push", "--no-fetch"]);
        assert!(matches!(cli.command, Commands::Push { no_fetch: true }));
    }
}
