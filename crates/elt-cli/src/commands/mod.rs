//! Command handler modules for the `elt` binary.
//!
//! Each submodule covers one noun (`state`, `job`, `schedule`, `sync`);
//! `main.rs` only does argument parsing and dispatch.

pub mod job;
pub mod schedule;
pub mod state;
pub mod sync;

use anyhow::{Context, Result};
use std::path::Path;

/// Parses `a,b,c` into `["a", "b", "c"]`, trimming whitespace and dropping
/// empty segments — how every subcommand that takes `--streams` reads it.
pub fn parse_streams(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

pub fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialize output")?);
    Ok(())
}

pub fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse JSON from {}", path.display()))
}
