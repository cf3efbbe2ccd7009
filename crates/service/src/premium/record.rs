use std::fmt;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Persisted subscription state for one user.
///
/// Every field has a default so partially written records load cleanly;
/// timestamps stay as the stored strings and are parsed when an operation
/// needs them, which keeps malformed values visible to the status check.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubscriptionRecord {
    pub is_premium: bool,
    pub is_demo: bool,
    /// Sticky: once set it is never cleared.
    pub demo_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub transaction_id: Option<String>,
    pub duration_days: i64,
}

impl SubscriptionRecord {
    /// Full paid grant starting at `now`.
    pub fn premium(
        now: NaiveDateTime,
        expires_at: NaiveDateTime,
        transaction_id: Option<String>,
        duration_days: i64,
        demo_used: bool,
    ) -> Self {
        Self {
            is_premium: true,
            is_demo: false,
            demo_used,
            activated_at: Some(format_timestamp(now)),
            expires_at: Some(format_timestamp(expires_at)),
            transaction_id,
            duration_days,
        }
    }

    /// Trial grant; marks the demo allowance as consumed.
    pub fn demo(now: DateTime<Local>, expires_at: NaiveDateTime, duration_days: i64) -> Self {
        Self {
            is_premium: true,
            is_demo: true,
            demo_used: true,
            activated_at: Some(format_timestamp(now.naive_local())),
            expires_at: Some(format_timestamp(expires_at)),
            transaction_id: Some(format!("demo_{}", now.timestamp())),
            duration_days,
        }
    }

    /// Parsed expiry, `None` when the record has no expiry at all.
    /// A blank string counts as no expiry.
    pub fn expiry(&self) -> Option<Result<NaiveDateTime, StoreError>> {
        self.expires_at
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_timestamp)
    }
}

/// Outcome of a status check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PremiumStatus {
    Free,
    Expired,
    Demo,
    Premium,
    /// The stored expiry could not be parsed.
    Error,
}

impl PremiumStatus {
    /// Whether the user is currently entitled to premium features.
    pub fn is_premium(self) -> bool {
        matches!(self, Self::Demo | Self::Premium)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Expired => "expired",
            Self::Demo => "demo",
            Self::Premium => "premium",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PremiumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counters over every stored record.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PremiumStats {
    pub total_users: usize,
    pub active_premium: usize,
    pub active_demo: usize,
    pub expired_premium: usize,
    pub demo_used_total: usize,
    pub free_users: usize,
}

/// A currently active subscription that ends within the requested window.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpiringUser {
    pub user_id: i64,
    pub expires_at: NaiveDateTime,
    pub is_demo: bool,
    pub days_left: i64,
}

const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

const READ_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Local naive ISO-8601 with microseconds.
pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(WRITE_FORMAT).to_string()
}

/// Parse a stored timestamp as local wall-clock time.
///
/// Offset-carrying values are converted to local time; a bare date means midnight.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, StoreError> {
    let raw = raw.trim();
    for fmt in READ_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(t);
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Local).naive_local());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| StoreError::timestamp(raw))
}

/// `t + days`, failing instead of panicking when the calendar overflows.
pub fn add_days(t: NaiveDateTime, days: i64) -> Result<NaiveDateTime, StoreError> {
    Duration::try_days(days)
        .and_then(|d| t.checked_add_signed(d))
        .ok_or(StoreError::Overflow(days))
}
