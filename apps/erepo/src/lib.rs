//! # erepo
//!
//! Library half of the `erepo` binary: the CLI definition and its commands.

pub mod cli;
