//! Premium and demo subscription tracking backed by a single JSON file.

pub mod database;
pub mod record;
pub mod store;

pub use database::{PremiumDatabase, PremiumSettings};
pub use record::{ExpiringUser, PremiumStats, PremiumStatus, SubscriptionRecord};
pub use store::PremiumStore;
