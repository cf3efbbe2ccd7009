//! Service layer for premium subscription state.
//! - `storage` holds the generic JSON file-backed map.
//! - `premium` implements the subscription lifecycle on top of it.

pub mod errors;
pub mod premium;
pub mod storage;
