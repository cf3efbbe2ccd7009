//! Storage abstractions for service layer
//!
//! Contains the file-backed map store used by the premium database to
//! persist its records as a single JSON document.

pub mod json_map_store;
