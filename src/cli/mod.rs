//! `soulreplay` command line

pub mod app;
pub mod cache;
pub mod config;
pub mod env;
pub mod plan;

pub use app::run;
pub use env::{CliArgs, Commands};
