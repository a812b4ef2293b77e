//! Command Line Interface (CLI) layer for seathru.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for single-file and batch
//! restoration flows. It wires user-provided options to the underlying
//! library functionality exposed via `seathru::api`.
//!
//! If you are embedding seathru into another application, prefer using
//! the high-level `seathru::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
