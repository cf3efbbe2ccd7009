//! Shared runtime helpers for the premium store binaries.

pub mod env;
pub mod utils;
