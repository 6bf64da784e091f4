//! The stdio server: a thin JSON-line front door onto the same `cli::commands`
//! functions the CLI itself calls.

pub mod stdio;
