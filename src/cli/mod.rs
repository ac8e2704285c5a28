//! CLI module for wiggum - command-line interface and subcommands.

pub mod commands;
pub mod display;

pub use commands::Cli;
