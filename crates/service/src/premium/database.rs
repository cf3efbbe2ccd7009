use std::{collections::HashMap, path::{Path, PathBuf}, sync::Arc};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, instrument};

use crate::errors::StoreError;
use crate::storage::json_map_store::JsonMapStore;
use super::record::{
    add_days, format_timestamp, local_now, ExpiringUser, PremiumStats, PremiumStatus, SubscriptionRecord,
};
use super::store::PremiumStore;

/// Placeholder key allowed in hand-edited data files; never a user.
pub const EXAMPLE_COMMENT_KEY: &str = "example_comment";

const MSG_DEMO_ALREADY_USED: &str = "❌ Вы уже использовали демо-версию ранее";
const MSG_DEMO_ALREADY_ACTIVE: &str = "❌ У вас уже есть активная демо-подписка";
const MSG_PREMIUM_ALREADY_ACTIVE: &str = "❌ У вас уже есть активная подписка";
const MSG_DEMO_FAILED: &str = "❌ Ошибка при активации демо-режима";

/// Construction parameters for [`PremiumDatabase`].
#[derive(Clone, Debug)]
pub struct PremiumSettings {
    pub data_file: PathBuf,
    pub default_duration_days: i64,
    pub demo_duration_days: i64,
    pub expiring_soon_days: i64,
}

impl Default for PremiumSettings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("premium_users.json"),
            default_duration_days: 30,
            demo_duration_days: 14,
            expiring_soon_days: 3,
        }
    }
}

impl PremiumSettings {
    pub fn with_data_file<P: Into<PathBuf>>(path: P) -> Self {
        Self { data_file: path.into(), ..Self::default() }
    }
}

/// File-backed subscription store: user id -> [`SubscriptionRecord`].
///
/// The map is loaded once on [`PremiumDatabase::open`] and the whole file is
/// rewritten after every mutation. Expiry is lazy: a record only turns
/// non-premium when an operation reads it past its `expires_at`, or when
/// [`PremiumDatabase::cleanup_expired`] sweeps the map.
pub struct PremiumDatabase {
    store: Arc<JsonMapStore<SubscriptionRecord>>,
    settings: PremiumSettings,
}

type Records = HashMap<String, SubscriptionRecord>;

enum Extension {
    Missing,
    Extended(NaiveDateTime),
    Failed(StoreError),
}

/// Status of one record at `now`, flipping `is_premium` off once the expiry has passed.
/// The second value reports whether the record changed.
fn resolve_status(records: &mut Records, key: &str, now: NaiveDateTime) -> (PremiumStatus, bool) {
    let Some(record) = records.get_mut(key) else {
        return (PremiumStatus::Free, false);
    };
    if !record.is_premium {
        return (PremiumStatus::Free, false);
    }
    match record.expiry() {
        None => (PremiumStatus::Premium, false),
        Some(Err(e)) => {
            error!(user_id = %key, error = %e, "malformed expires_at");
            (PremiumStatus::Error, false)
        }
        Some(Ok(expires)) if now > expires => {
            // is_demo stays as is; cleanup_expired is what clears it
            record.is_premium = false;
            info!(user_id = %key, event = "premium_expired", "premium subscription expired");
            (PremiumStatus::Expired, true)
        }
        Some(Ok(_)) if record.is_demo => (PremiumStatus::Demo, false),
        Some(Ok(_)) => (PremiumStatus::Premium, false),
    }
}

impl PremiumDatabase {
    /// Load the data file named in `settings`. Never fails: a missing or
    /// corrupt file is logged and the store starts empty.
    pub async fn open(settings: PremiumSettings) -> Arc<Self> {
        let store = JsonMapStore::open(settings.data_file.clone(), &[EXAMPLE_COMMENT_KEY]).await;
        Arc::new(Self { store, settings })
    }

    pub fn data_file(&self) -> &Path {
        self.store.file_path()
    }

    /// Grant a full (non-demo) subscription from now, replacing any existing
    /// grant but keeping the user's `demo_used` history.
    #[instrument(skip(self, transaction_id))]
    pub async fn add_premium_user(
        &self,
        user_id: i64,
        transaction_id: Option<String>,
        duration_days: Option<i64>,
    ) -> bool {
        let days = duration_days.unwrap_or(self.settings.default_duration_days);
        let now = local_now();
        let expires = match add_days(now, days) {
            Ok(t) => t,
            Err(e) => {
                error!(user_id, error = %e, "failed to add premium user");
                return false;
            }
        };

        let key = user_id.to_string();
        self.store
            .update_map(|records| {
                let demo_used = records.get(&key).is_some_and(|r| r.demo_used);
                let record = SubscriptionRecord::premium(now, expires, transaction_id, days, demo_used);
                records.insert(key, record);
                ((), true)
            })
            .await;
        info!(user_id, until = %expires.format("%Y-%m-%d"), event = "premium_added", "premium user added");
        true
    }

    /// Current entitlement of a user. Has a side effect: an expired record is
    /// flipped to non-premium and the file is rewritten.
    pub async fn check_premium_status(&self, user_id: i64) -> PremiumStatus {
        let key = user_id.to_string();
        let now = local_now();
        self.store.update_map(|records| resolve_status(records, &key, now)).await
    }

    pub async fn can_activate_demo(&self, user_id: i64) -> bool {
        let key = user_id.to_string();
        let now = local_now();
        self.store
            .update_map(|records| {
                if records.get(&key).is_some_and(|r| r.demo_used) {
                    return (false, false);
                }
                let (status, changed) = resolve_status(records, &key, now);
                (!status.is_premium(), changed)
            })
            .await
    }

    /// Start the one-time trial. The returned message is shown to the user as is.
    #[instrument(skip(self))]
    pub async fn activate_demo(&self, user_id: i64) -> (bool, String) {
        let now = Local::now();
        let days = self.settings.demo_duration_days;
        let expires = match add_days(now.naive_local(), days) {
            Ok(t) => t,
            Err(e) => {
                error!(user_id, error = %e, "failed to activate demo");
                return (false, MSG_DEMO_FAILED.to_string());
            }
        };

        let key = user_id.to_string();
        let outcome = self
            .store
            .update_map(|records| {
                if records.get(&key).is_some_and(|r| r.demo_used) {
                    return (Err(MSG_DEMO_ALREADY_USED), false);
                }
                let (status, changed) = resolve_status(records, &key, now.naive_local());
                match status {
                    PremiumStatus::Demo => return (Err(MSG_DEMO_ALREADY_ACTIVE), changed),
                    PremiumStatus::Premium => return (Err(MSG_PREMIUM_ALREADY_ACTIVE), changed),
                    _ => {}
                }
                records.insert(key, SubscriptionRecord::demo(now, expires, days));
                (Ok(()), true)
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(user_id, until = %expires, event = "demo_activated", "demo activated");
                (true, format!("🎉 Демо-режим активирован до {}", expires.format("%d.%m.%Y %H:%M")))
            }
            Err(msg) => {
                debug!(user_id, reason = msg, "demo activation refused");
                (false, msg.to_string())
            }
        }
    }

    /// Add `days` on top of the remaining time, or from now when already
    /// expired. Reactivates the record without touching `is_demo`.
    #[instrument(skip(self))]
    pub async fn extend_premium(&self, user_id: i64, days: i64) -> bool {
        let key = user_id.to_string();
        let now = local_now();
        let outcome = self
            .store
            .update_map(|records| {
                let Some(record) = records.get_mut(&key) else {
                    return (Extension::Missing, false);
                };
                let base = match record.expiry() {
                    Some(Ok(current)) if current > now => current,
                    Some(Ok(_)) | None => now,
                    Some(Err(e)) => return (Extension::Failed(e), false),
                };
                match add_days(base, days) {
                    Ok(new_expiry) => {
                        record.expires_at = Some(format_timestamp(new_expiry));
                        record.is_premium = true;
                        (Extension::Extended(new_expiry), true)
                    }
                    Err(e) => (Extension::Failed(e), false),
                }
            })
            .await;

        match outcome {
            Extension::Missing => self.add_premium_user(user_id, None, Some(days)).await,
            Extension::Extended(until) => {
                info!(
                    user_id,
                    until = %until.format("%Y-%m-%d"),
                    event = "premium_extended",
                    "premium extended"
                );
                true
            }
            Extension::Failed(e) => {
                error!(user_id, error = %e, "failed to extend premium");
                false
            }
        }
    }

    /// Raw record lookup; no expiry evaluation.
    pub async fn get_user_info(&self, user_id: i64) -> Option<SubscriptionRecord> {
        self.store.get(&user_id.to_string()).await
    }

    /// Counters computed from the stored flags and expiry dates without
    /// flipping anything. A record past its expiry but not yet flipped counts
    /// as `expired_premium` until a status check or cleanup touches it.
    pub async fn get_stats(&self) -> PremiumStats {
        let now = local_now();
        self.store
            .read_map(|records| {
                let mut stats = PremiumStats { total_users: records.len(), ..PremiumStats::default() };
                for record in records.values() {
                    if record.demo_used {
                        stats.demo_used_total += 1;
                    }
                    if !record.is_premium {
                        continue;
                    }
                    match record.expiry() {
                        None => stats.active_premium += 1,
                        Some(Ok(expires)) if expires > now => {
                            if record.is_demo {
                                stats.active_demo += 1;
                            } else {
                                stats.active_premium += 1;
                            }
                        }
                        // past or unparseable
                        Some(_) => stats.expired_premium += 1,
                    }
                }
                stats.free_users =
                    stats.total_users - stats.active_premium - stats.active_demo - stats.expired_premium;
                stats
            })
            .await
    }

    /// Flip every past-due premium record to free, clearing the demo flag too.
    /// Returns how many records changed; the file is rewritten once if any did.
    pub async fn cleanup_expired(&self) -> usize {
        let now = local_now();
        let cleaned = self
            .store
            .update_map(|records| {
                let mut cleaned = 0usize;
                for (key, record) in records.iter_mut() {
                    if !record.is_premium {
                        continue;
                    }
                    match record.expiry() {
                        Some(Ok(expires)) if expires < now => {
                            record.is_premium = false;
                            record.is_demo = false;
                            cleaned += 1;
                        }
                        Some(Err(e)) => {
                            debug!(user_id = %key, error = %e, "cleanup skipped malformed expires_at")
                        }
                        _ => {}
                    }
                }
                (cleaned, cleaned > 0)
            })
            .await;
        if cleaned > 0 {
            info!(cleaned, event = "cleanup", "expired subscriptions cleaned up");
        }
        cleaned
    }

    /// Active subscriptions ending within `(now, now + days_ahead]`, soonest first.
    pub async fn get_expiring_soon(&self, days_ahead: Option<i64>) -> Vec<ExpiringUser> {
        let days_ahead = days_ahead.unwrap_or(self.settings.expiring_soon_days);
        let now = local_now();
        let threshold = match add_days(now, days_ahead) {
            Ok(t) => t,
            Err(e) => {
                error!(days_ahead, error = %e, "invalid expiring-soon window");
                return Vec::new();
            }
        };

        let mut users = self
            .store
            .read_map(|records| {
                records
                    .iter()
                    .filter(|(_, record)| record.is_premium)
                    .filter_map(|(key, record)| {
                        let expires = record.expiry()?.ok()?;
                        if expires <= now || expires > threshold {
                            return None;
                        }
                        let Ok(user_id) = key.parse::<i64>() else {
                            debug!(%key, "skipping non-numeric user id");
                            return None;
                        };
                        Some(ExpiringUser {
                            user_id,
                            expires_at: expires,
                            is_demo: record.is_demo,
                            days_left: (expires - now).num_days(),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .await;
        users.sort_by_key(|u| u.expires_at);
        users
    }
}

#[async_trait]
impl PremiumStore for PremiumDatabase {
    async fn add_premium_user(
        &self,
        user_id: i64,
        transaction_id: Option<String>,
        duration_days: Option<i64>,
    ) -> bool {
        self.add_premium_user(user_id, transaction_id, duration_days).await
    }

    async fn check_premium_status(&self, user_id: i64) -> PremiumStatus {
        self.check_premium_status(user_id).await
    }

    async fn can_activate_demo(&self, user_id: i64) -> bool {
        self.can_activate_demo(user_id).await
    }

    async fn activate_demo(&self, user_id: i64) -> (bool, String) {
        self.activate_demo(user_id).await
    }

    async fn extend_premium(&self, user_id: i64, days: i64) -> bool {
        self.extend_premium(user_id, days).await
    }

    async fn get_user_info(&self, user_id: i64) -> Option<SubscriptionRecord> {
        self.get_user_info(user_id).await
    }

    async fn get_stats(&self) -> PremiumStats {
        self.get_stats().await
    }

    async fn cleanup_expired(&self) -> usize {
        self.cleanup_expired().await
    }

    async fn get_expiring_soon(&self, days_ahead: Option<i64>) -> Vec<ExpiringUser> {
        self.get_expiring_soon(days_ahead).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn tmp_settings() -> PremiumSettings {
        let path = std::env::temp_dir().join(format!("premium_db_{}.json", Uuid::new_v4()));
        PremiumSettings::with_data_file(path)
    }

    fn record_ending_in(offset: Duration, is_demo: bool) -> SubscriptionRecord {
        let now = local_now();
        SubscriptionRecord {
            is_premium: true,
            is_demo,
            demo_used: is_demo,
            activated_at: Some(format_timestamp(now - Duration::days(30))),
            expires_at: Some(format_timestamp(now + offset)),
            transaction_id: None,
            duration_days: 30,
        }
    }

    async fn open_with(records: &[(&str, SubscriptionRecord)]) -> anyhow::Result<Arc<PremiumDatabase>> {
        let settings = tmp_settings();
        let map: HashMap<&str, &SubscriptionRecord> = records.iter().map(|(k, v)| (*k, v)).collect();
        tokio::fs::write(&settings.data_file, serde_json::to_vec_pretty(&map)?).await?;
        Ok(PremiumDatabase::open(settings).await)
    }

    async fn cleanup(db: &PremiumDatabase) {
        let _ = tokio::fs::remove_file(db.store.file_path()).await;
        let _ = tokio::fs::remove_file(db.store.backup_path()).await;
    }

    #[tokio::test]
    async fn unknown_user_is_free_and_demo_eligible() {
        let db = PremiumDatabase::open(tmp_settings()).await;
        assert_eq!(db.check_premium_status(7).await, PremiumStatus::Free);
        assert!(db.can_activate_demo(7).await);
        assert!(db.get_user_info(7).await.is_none());
        // pure reads of an unknown user never create the file
        assert!(!tokio::fs::try_exists(db.data_file()).await.unwrap_or(true));
    }

    #[tokio::test]
    async fn demo_is_one_time_even_after_cleanup() -> anyhow::Result<()> {
        let db = PremiumDatabase::open(tmp_settings()).await;

        let (ok, msg) = db.activate_demo(5).await;
        assert!(ok, "{msg}");
        assert!(msg.starts_with("🎉"));
        assert_eq!(db.check_premium_status(5).await, PremiumStatus::Demo);
        assert!(!db.can_activate_demo(5).await);

        let (ok, msg) = db.activate_demo(5).await;
        assert!(!ok);
        assert_eq!(msg, MSG_DEMO_ALREADY_USED);

        db.store
            .update_map(|records| {
                if let Some(r) = records.get_mut("5") {
                    r.expires_at = Some(format_timestamp(local_now() - Duration::hours(1)));
                }
                ((), true)
            })
            .await;
        assert_eq!(db.cleanup_expired().await, 1);

        let rec = db.get_user_info(5).await.expect("record kept");
        assert!(!rec.is_premium && !rec.is_demo && rec.demo_used);
        assert!(!db.can_activate_demo(5).await);
        let (ok, msg) = db.activate_demo(5).await;
        assert!(!ok);
        assert_eq!(msg, MSG_DEMO_ALREADY_USED);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn active_paid_subscription_blocks_demo() -> anyhow::Result<()> {
        let db = PremiumDatabase::open(tmp_settings()).await;
        assert!(db.add_premium_user(9, Some("tx-1".into()), None).await);

        assert!(!db.can_activate_demo(9).await);
        let (ok, msg) = db.activate_demo(9).await;
        assert!(!ok);
        assert_eq!(msg, MSG_PREMIUM_ALREADY_ACTIVE);
        assert!(!db.get_user_info(9).await.expect("record").demo_used);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn active_demo_without_history_blocks_demo() -> anyhow::Result<()> {
        let seeded = SubscriptionRecord { demo_used: false, ..record_ending_in(Duration::days(5), true) };
        let db = open_with(&[("60", seeded.clone())]).await?;

        assert!(!db.can_activate_demo(60).await);
        let (ok, msg) = db.activate_demo(60).await;
        assert!(!ok);
        assert_eq!(msg, MSG_DEMO_ALREADY_ACTIVE);
        assert_eq!(db.get_user_info(60).await, Some(seeded));
        assert!(!tokio::fs::try_exists(db.store.backup_path()).await?);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn demo_replaces_stale_paid_grant_in_one_save() -> anyhow::Result<()> {
        let db = open_with(&[("61", record_ending_in(-Duration::days(1), false))]).await?;

        let (ok, msg) = db.activate_demo(61).await;
        assert!(ok, "{msg}");
        let rec = db.get_user_info(61).await.expect("record");
        assert!(rec.is_premium && rec.is_demo && rec.demo_used);
        assert_eq!(rec.duration_days, 14);

        // the backup is the seeded file, so the expiry flip was not saved on its own
        let backup: HashMap<String, SubscriptionRecord> =
            serde_json::from_slice(&tokio::fs::read(db.store.backup_path()).await?)?;
        let previous = backup.get("61").expect("seeded record");
        assert!(previous.is_premium && !previous.is_demo);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn blank_expiry_is_treated_as_unset() -> anyhow::Result<()> {
        let blank = SubscriptionRecord {
            expires_at: Some(String::new()),
            ..record_ending_in(Duration::days(1), false)
        };
        let db = open_with(&[("70", blank.clone()), ("71", blank)]).await?;

        assert_eq!(db.check_premium_status(70).await, PremiumStatus::Premium);
        let stats = db.get_stats().await;
        assert_eq!(stats.active_premium, 2);
        assert_eq!(stats.expired_premium, 0);

        let before = local_now();
        assert!(db.extend_premium(71, 5).await);
        let expiry = db.get_user_info(71).await.expect("record").expiry().expect("set")?;
        assert!(expiry >= before + Duration::days(5) - Duration::seconds(1));
        assert!(expiry <= local_now() + Duration::days(5));

        assert_eq!(db.cleanup_expired().await, 0);
        assert!(db.get_user_info(70).await.expect("record").is_premium);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn status_check_expires_lazily_and_persists() -> anyhow::Result<()> {
        let db = open_with(&[
            ("1", record_ending_in(-Duration::days(1), false)),
            ("2", record_ending_in(-Duration::days(1), true)),
        ])
        .await?;

        assert_eq!(db.check_premium_status(1).await, PremiumStatus::Expired);
        assert_eq!(db.check_premium_status(1).await, PremiumStatus::Free);

        assert_eq!(db.check_premium_status(2).await, PremiumStatus::Expired);
        let demo = db.get_user_info(2).await.expect("record");
        assert!(!demo.is_premium);
        assert!(demo.is_demo, "lazy expiry leaves the demo flag alone");

        let reloaded = PremiumDatabase::open(PremiumSettings::with_data_file(db.data_file())).await;
        assert!(!reloaded.get_user_info(1).await.expect("record").is_premium);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn malformed_expiry_reports_error_without_mutation() -> anyhow::Result<()> {
        let mut broken = record_ending_in(Duration::days(1), false);
        broken.expires_at = Some("not-a-date".into());
        let db = open_with(&[("3", broken.clone())]).await?;

        assert_eq!(db.check_premium_status(3).await, PremiumStatus::Error);
        assert_eq!(db.get_user_info(3).await, Some(broken));
        assert!(!db.extend_premium(3, 5).await);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn premium_without_expiry_is_unlimited() -> anyhow::Result<()> {
        let mut open_ended = record_ending_in(Duration::days(1), false);
        open_ended.expires_at = None;
        let db = open_with(&[("4", open_ended)]).await?;

        assert_eq!(db.check_premium_status(4).await, PremiumStatus::Premium);
        assert_eq!(db.get_stats().await.active_premium, 1);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn extend_stacks_onto_remaining_time() -> anyhow::Result<()> {
        let active = record_ending_in(Duration::days(5), false);
        let old_expiry = active.expiry().expect("set")?;
        let db = open_with(&[("10", active)]).await?;

        assert!(db.extend_premium(10, 10).await);
        let rec = db.get_user_info(10).await.expect("record");
        assert_eq!(rec.expiry().expect("set")?, old_expiry + Duration::days(10));
        assert_eq!(rec.duration_days, 30);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn extend_after_expiry_starts_from_now_and_keeps_demo_flag() -> anyhow::Result<()> {
        let db = open_with(&[("11", record_ending_in(-Duration::days(3), true))]).await?;

        let before = local_now();
        assert!(db.extend_premium(11, 10).await);
        let rec = db.get_user_info(11).await.expect("record");
        let expiry = rec.expiry().expect("set")?;
        assert!(expiry >= before + Duration::days(10) - Duration::seconds(1));
        assert!(expiry <= local_now() + Duration::days(10));
        assert!(rec.is_premium && rec.is_demo);
        assert_eq!(db.check_premium_status(11).await, PremiumStatus::Demo);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn extend_unknown_user_grants_premium() -> anyhow::Result<()> {
        let db = PremiumDatabase::open(tmp_settings()).await;
        assert!(db.extend_premium(12, 7).await);

        let rec = db.get_user_info(12).await.expect("record");
        assert!(rec.is_premium && !rec.is_demo);
        assert_eq!(rec.duration_days, 7);
        assert_eq!(rec.transaction_id, None);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn add_premium_overflow_fails_without_record() {
        let db = PremiumDatabase::open(tmp_settings()).await;
        assert!(!db.add_premium_user(13, None, Some(i64::MAX)).await);
        assert!(db.get_user_info(13).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_clears_demo_and_skips_malformed() -> anyhow::Result<()> {
        let mut broken = record_ending_in(-Duration::days(1), false);
        broken.expires_at = Some("garbage".into());
        let db = open_with(&[
            ("20", record_ending_in(-Duration::days(2), true)),
            ("21", record_ending_in(-Duration::days(2), false)),
            ("22", record_ending_in(Duration::days(2), false)),
            ("23", broken),
        ])
        .await?;

        assert_eq!(db.cleanup_expired().await, 2);
        let demo = db.get_user_info(20).await.expect("record");
        assert!(!demo.is_premium && !demo.is_demo && demo.demo_used);
        assert_eq!(db.check_premium_status(20).await, PremiumStatus::Free);
        assert!(db.get_user_info(22).await.expect("record").is_premium);
        assert!(db.get_user_info(23).await.expect("record").is_premium);

        assert_eq!(db.cleanup_expired().await, 0);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn stats_count_stale_records_as_expired() -> anyhow::Result<()> {
        let mut broken = record_ending_in(Duration::days(1), false);
        broken.expires_at = Some("??".into());
        let free = SubscriptionRecord { demo_used: true, ..SubscriptionRecord::default() };
        let db = open_with(&[
            ("30", record_ending_in(Duration::days(10), false)),
            ("31", record_ending_in(Duration::days(10), true)),
            ("32", record_ending_in(-Duration::days(1), false)),
            ("33", broken),
            ("34", free),
        ])
        .await?;

        let stats = db.get_stats().await;
        assert_eq!(stats.total_users, 5);
        assert_eq!(stats.active_premium, 1);
        assert_eq!(stats.active_demo, 1);
        assert_eq!(stats.expired_premium, 2);
        assert_eq!(stats.demo_used_total, 2);
        assert_eq!(stats.free_users, 1);
        assert_eq!(
            stats.active_premium + stats.active_demo + stats.expired_premium + stats.free_users,
            stats.total_users
        );

        // stats never flip records themselves
        assert!(db.get_user_info(32).await.expect("record").is_premium);
        db.cleanup_expired().await;
        let after = db.get_stats().await;
        assert_eq!(after.expired_premium, 1);
        assert_eq!(after.free_users, 2);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn expiring_soon_respects_window() -> anyhow::Result<()> {
        let mut flipped = record_ending_in(Duration::days(1), false);
        flipped.is_premium = false;
        let mut broken = record_ending_in(Duration::days(1), false);
        broken.expires_at = Some("soon".into());
        let db = open_with(&[
            ("40", record_ending_in(Duration::hours(60), true)),
            ("41", record_ending_in(Duration::hours(12), false)),
            ("42", record_ending_in(Duration::days(5), false)),
            ("43", record_ending_in(-Duration::hours(1), false)),
            ("44", flipped),
            ("45", broken),
            ("admin", record_ending_in(Duration::days(1), false)),
        ])
        .await?;

        let soon = db.get_expiring_soon(None).await;
        let ids: Vec<i64> = soon.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![41, 40]);
        assert_eq!(soon[0].days_left, 0);
        assert_eq!(soon[1].days_left, 2);
        assert!(soon[1].is_demo);

        let wider = db.get_expiring_soon(Some(6)).await;
        assert_eq!(wider.len(), 3);

        cleanup(&db).await;
        Ok(())
    }

    #[tokio::test]
    async fn save_failure_is_swallowed() -> anyhow::Result<()> {
        let blocker = std::env::temp_dir().join(format!("premium_blocker_{}", Uuid::new_v4()));
        tokio::fs::write(&blocker, b"not a directory").await?;
        let db = PremiumDatabase::open(PremiumSettings::with_data_file(blocker.join("premium.json"))).await;

        assert!(db.add_premium_user(50, None, None).await);
        assert_eq!(db.check_premium_status(50).await, PremiumStatus::Premium);

        let _ = tokio::fs::remove_file(&blocker).await;
        Ok(())
    }
}
