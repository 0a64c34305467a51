//! CLI command implementations.

pub mod args;
pub mod config;
pub mod render;
