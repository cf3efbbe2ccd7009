use async_trait::async_trait;

use super::record::{ExpiringUser, PremiumStats, PremiumStatus, SubscriptionRecord};

/// Trait abstraction over premium subscription storage.
/// Callers such as a bot command layer receive an `Arc<dyn PremiumStore>`.
///
/// No method returns an error: persistence failures are logged by the
/// implementation and reflected only in the returned values.
#[async_trait]
pub trait PremiumStore: Send + Sync {
    /// Grant a full subscription; `None` duration means the configured default.
    async fn add_premium_user(
        &self,
        user_id: i64,
        transaction_id: Option<String>,
        duration_days: Option<i64>,
    ) -> bool;
    async fn check_premium_status(&self, user_id: i64) -> PremiumStatus;
    async fn can_activate_demo(&self, user_id: i64) -> bool;
    /// Returns success and a user-facing message.
    async fn activate_demo(&self, user_id: i64) -> (bool, String);
    async fn extend_premium(&self, user_id: i64, days: i64) -> bool;
    async fn get_user_info(&self, user_id: i64) -> Option<SubscriptionRecord>;
    async fn get_stats(&self) -> PremiumStats;
    async fn cleanup_expired(&self) -> usize;
    /// `None` window means the configured default.
    async fn get_expiring_soon(&self, days_ahead: Option<i64>) -> Vec<ExpiringUser>;
}
