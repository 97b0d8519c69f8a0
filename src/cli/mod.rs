//! Command-line interface for labforge.
//!
//! Provides commands for validating BDDL task descriptions and inspecting
//! and consolidating demonstration containers.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
