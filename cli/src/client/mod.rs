//! GitHub REST client.

pub mod api;
pub mod middleware;

pub use api::{GitHubClient, GitHubOwner, GitHubRepository};
