//! Gitdeck - Git repository workbench.
//!
//! The core of a Git desktop client without the desktop: a registry of
//! known repositories, a typed git engine boundary, a sync orchestrator
//! that sequences mutations and keeps cached views coherent, and GitHub
//! device-flow login.
//!
//! Start from [`AppContext`], which wires the pieces together.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use context::AppContext;
pub use error::{AppError, Result};
