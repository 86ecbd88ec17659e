//! CLI module for improvr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running a training
//! loop and inspecting recorded checkpoints.

pub mod commands;

pub use commands::Cli;
