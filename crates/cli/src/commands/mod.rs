//! CLI subcommands.

pub mod provision;
