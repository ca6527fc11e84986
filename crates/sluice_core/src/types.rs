//! Core type definitions for the action queue.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique identifier for a queued action.
///
/// Assigned once at enqueue time and immutable afterwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses an identifier from its hyphenated string form.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the string is not a valid UUID.
    pub fn parse(s: &str) -> CoreResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CoreError::validation(format!("invalid action id: {s:?}")))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum length of an action type tag in bytes.
pub const MAX_ACTION_TYPE_LEN: usize = 64;

/// Tag selecting which dispatch handler applies to an action.
///
/// Tags are lowercase identifiers such as `alert` or `check-in`:
/// non-empty, at most [`MAX_ACTION_TYPE_LEN`] bytes, drawn from
/// `[a-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(String);

impl ActionType {
    /// Creates a validated action type tag.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the tag is empty, too long, or
    /// contains characters outside `[a-z0-9_-]`.
    pub fn new(tag: impl Into<String>) -> CoreResult<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(CoreError::validation("action type must not be empty"));
        }
        if tag.len() > MAX_ACTION_TYPE_LEN {
            return Err(CoreError::validation(format!(
                "action type exceeds {MAX_ACTION_TYPE_LEN} bytes: {tag:?}"
            )));
        }
        if !tag
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        {
            return Err(CoreError::validation(format!(
                "action type may only contain [a-z0-9_-]: {tag:?}"
            )));
        }
        Ok(Self(tag))
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority band of a queued action.
///
/// Variants are ordered so `Low < Medium < High < Critical`; drain order
/// sorts descending on this.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Best-effort, evicted first under pressure.
    Low,
    /// Normal traffic.
    Medium,
    /// Should not wait behind normal traffic.
    High,
    /// Dispatched before everything else; largest retry budget.
    Critical,
}

impl Priority {
    /// Default retry budget for this priority band.
    #[must_use]
    pub const fn default_max_retries(self) -> u32 {
        match self {
            Self::Critical => 10,
            Self::High => 5,
            Self::Medium => 3,
            Self::Low => 3,
        }
    }

    /// Returns the lowercase name of the band.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// All bands, highest first (drain order).
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milliseconds since the Unix epoch.
///
/// Stored on every action and event so age rules can be evaluated as pure
/// functions of an explicit `now`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(millis as u64)
    }

    /// Creates a timestamp from raw epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the raw epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Duration elapsed from `earlier` to `self`, zero if `earlier` is
    /// in the future.
    #[must_use]
    pub fn since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Returns this timestamp shifted forward by `delta`.
    #[must_use]
    pub fn plus(self, delta: Duration) -> Self {
        Self(self.0.saturating_add(delta.as_millis() as u64))
    }

    /// Returns this timestamp shifted backward by `delta`, saturating at
    /// the epoch.
    #[must_use]
    pub fn minus(self, delta: Duration) -> Self {
        Self(self.0.saturating_sub(delta.as_millis() as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_id_roundtrips_through_string() {
        let id = ActionId::generate();
        let parsed = ActionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn action_id_parse_rejects_garbage() {
        assert!(ActionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn action_type_accepts_typical_tags() {
        for tag in ["alert", "check-in", "request_create", "a1"] {
            assert!(ActionType::new(tag).is_ok(), "{tag} should be valid");
        }
    }

    #[test]
    fn action_type_rejects_invalid_tags() {
        assert!(ActionType::new("").is_err());
        assert!(ActionType::new("Upper").is_err());
        assert!(ActionType::new("spaced out").is_err());
        assert!(ActionType::new("x".repeat(65)).is_err());
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn priority_retry_budgets() {
        assert_eq!(Priority::Critical.default_max_retries(), 10);
        assert_eq!(Priority::High.default_max_retries(), 5);
        assert_eq!(Priority::Medium.default_max_retries(), 3);
        assert_eq!(Priority::Low.default_max_retries(), 3);
    }

    #[test]
    fn timestamp_since_saturates() {
        let t1 = Timestamp::from_millis(1_000);
        let t2 = Timestamp::from_millis(4_000);
        assert_eq!(t2.since(t1), Duration::from_millis(3_000));
        assert_eq!(t1.since(t2), Duration::ZERO);
    }

    #[test]
    fn timestamp_plus_minus() {
        let t = Timestamp::from_millis(10_000);
        assert_eq!(t.plus(Duration::from_secs(5)).as_millis(), 15_000);
        assert_eq!(t.minus(Duration::from_secs(5)).as_millis(), 5_000);
        assert_eq!(
            Timestamp::from_millis(1).minus(Duration::from_secs(1)).as_millis(),
            0
        );
    }
}
