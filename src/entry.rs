//! Ban lifecycle for a single CIDR block.
//!
//! An [`Entry`] moves between two states: living (banned) and expired.
//! Every ban bumps `ban_count` and restarts the timer with the next
//! escalation tier; expiring an already expired entry is a no-op.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seconds in one day
pub const DAY_SECS: i64 = 24 * 60 * 60;

/// Current time at second precision (persisted timestamps carry no fraction)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Render a timestamp the way it appears in change summaries
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Ban list action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Ban,
    Expire,
}

impl Action {
    pub const ALL: [Action; 2] = [Action::Ban, Action::Expire];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ban => "ban",
            Action::Expire => "expire",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ban" => Ok(Action::Ban),
            "expire" => Ok(Action::Expire),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// Strategy deciding how long a ban lasts when no explicit duration is given.
///
/// `ban_count` is the value after the increment, so the first ban sees 1.
/// Any `Fn(u32) -> Duration` closure is an escalation policy.
pub trait Escalation: Send + Sync {
    fn ban_duration(&self, ban_count: u32) -> Duration;
}

impl<F> Escalation for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn ban_duration(&self, ban_count: u32) -> Duration {
        self(ban_count)
    }
}

/// Fixed table: 1, 2, 3, 7, 14 days, then 30 days for every later ban.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEscalation;

impl Escalation for DefaultEscalation {
    fn ban_duration(&self, ban_count: u32) -> Duration {
        let days = match ban_count {
            0 => 0,
            1 => 1,
            2 => 2,
            3 => 3,
            4 => 7,
            5 => 14,
            _ => 30,
        };
        Duration::seconds(days * DAY_SECS)
    }
}

/// Escalation read from configuration: `tiers[n - 1]` applies to the n-th ban,
/// the last tier repeats.
#[derive(Debug, Clone)]
pub struct TieredEscalation {
    tiers: Vec<Duration>,
}

impl TieredEscalation {
    pub fn from_days(days: &[u32]) -> Self {
        Self {
            tiers: days
                .iter()
                .map(|d| Duration::seconds(i64::from(*d) * DAY_SECS))
                .collect(),
        }
    }
}

impl Escalation for TieredEscalation {
    fn ban_duration(&self, ban_count: u32) -> Duration {
        if ban_count == 0 {
            return Duration::zero();
        }
        let idx = (ban_count as usize - 1).min(self.tiers.len().saturating_sub(1));
        self.tiers.get(idx).copied().unwrap_or_else(Duration::zero)
    }
}

/// One audit record; never mutated once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub action: Action,
    pub executed_at: DateTime<Utc>,
    /// Link to the approval conversation; `None` for automatic expiry
    #[serde(rename = "slack_link")]
    pub actor_link: Option<String>,
}

/// Summary of the last transition applied to an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: Action,
    pub cidr_block: String,
    pub ban_count: u32,
    pub expire_at: DateTime<Utc>,
}

impl Change {
    /// One-line human summary, optionally with a chat emoji prefix
    pub fn render(&self, decorate: bool) -> String {
        match self.action {
            Action::Ban => format!(
                "{}{} has been banned until {} (ban count: {})",
                if decorate { ":boom: " } else { "" },
                self.cidr_block,
                format_timestamp(&self.expire_at),
                self.ban_count
            ),
            Action::Expire => format!(
                "{}{} has expired (ban count: {})",
                if decorate { ":fire-extinguisher: " } else { "" },
                self.cidr_block,
                self.ban_count
            ),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

/// Ban record for one normalized CIDR block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    cidr_block: String,
    #[serde(default)]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    expire_at: Option<DateTime<Utc>>,
    #[serde(default)]
    expired: bool,
    #[serde(default)]
    ban_count: u32,
    #[serde(default)]
    histories: Vec<History>,
    #[serde(skip)]
    change: Option<Change>,
}

impl Entry {
    /// A never-banned entry (ban count 0)
    pub fn new(cidr_block: impl Into<String>) -> Self {
        Self {
            cidr_block: cidr_block.into(),
            since: None,
            expire_at: None,
            expired: false,
            ban_count: 0,
            histories: Vec::new(),
            change: None,
        }
    }

    /// Create an entry and apply its first ban
    pub fn build(
        cidr_block: impl Into<String>,
        actor_link: &str,
        expire_in: Option<Duration>,
        escalation: &dyn Escalation,
        now: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self::new(cidr_block);
        entry.ban(actor_link, expire_in, escalation, now);
        entry
    }

    /// Activate (or re-activate) the ban. Always legal.
    pub fn ban(
        &mut self,
        actor_link: &str,
        expire_in: Option<Duration>,
        escalation: &dyn Escalation,
        now: DateTime<Utc>,
    ) -> &mut Self {
        self.ban_count += 1;
        self.since = Some(now);
        self.expired = false;

        let expire_in = expire_in.unwrap_or_else(|| escalation.ban_duration(self.ban_count));
        let expire_at = now
            .checked_add_signed(expire_in)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.expire_at = Some(expire_at);

        self.histories.push(History {
            action: Action::Ban,
            executed_at: now,
            actor_link: Some(actor_link.to_string()),
        });
        self.change = Some(Change {
            action: Action::Ban,
            cidr_block: self.cidr_block.clone(),
            ban_count: self.ban_count,
            expire_at,
        });

        self
    }

    /// Record expiry. Returns `false` (and touches nothing) if already expired.
    pub fn expire(&mut self, actor_link: Option<&str>, now: DateTime<Utc>) -> bool {
        if self.expired {
            return false;
        }

        self.expired = true;
        self.expire_at = Some(now);
        self.histories.push(History {
            action: Action::Expire,
            executed_at: now,
            actor_link: actor_link.map(str::to_string),
        });
        self.change = Some(Change {
            action: Action::Expire,
            cidr_block: self.cidr_block.clone(),
            ban_count: self.ban_count,
            expire_at: now,
        });

        true
    }

    /// True iff the entry is living and its timer has run out
    pub fn should_expire(&self, now: DateTime<Utc>) -> bool {
        self.living() && self.expire_at.is_some_and(|at| at <= now)
    }

    pub fn living(&self) -> bool {
        !self.expired
    }

    pub fn expired(&self) -> bool {
        self.expired
    }

    pub fn cidr_block(&self) -> &str {
        &self.cidr_block
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        self.expire_at
    }

    pub fn ban_count(&self) -> u32 {
        self.ban_count
    }

    pub fn histories(&self) -> &[History] {
        &self.histories
    }

    /// Last transition produced by `ban`/`expire` on this value
    pub fn change(&self) -> Option<&Change> {
        self.change.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CIDR: &str = "192.0.2.1/32";
    const LINK: &str = "dummy";

    fn built_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 12, 31, 17, 0, 0).unwrap()
    }

    fn days(n: i64) -> Duration {
        Duration::seconds(n * DAY_SECS)
    }

    #[test]
    fn test_build_sets_change() {
        let entry = Entry::build(CIDR, LINK, Some(days(3)), &DefaultEscalation, built_time());
        let change = entry.change().unwrap();
        assert_eq!(change.action, Action::Ban);
        assert_eq!(change.expire_at, built_time() + days(3));
        assert_eq!(entry.ban_count(), 1);
    }

    #[test]
    fn test_build_with_custom_escalation() {
        let escalation = |count: u32| if count == 1 { days(3) } else { Duration::zero() };
        let entry = Entry::build(CIDR, LINK, None, &escalation, built_time());
        assert_eq!(entry.expire_at(), Some(built_time() + days(3)));
    }

    #[test]
    fn test_default_escalation_table() {
        let e = DefaultEscalation;
        assert_eq!(e.ban_duration(0), Duration::zero());
        assert_eq!(e.ban_duration(1), days(1));
        assert_eq!(e.ban_duration(2), days(2));
        assert_eq!(e.ban_duration(3), days(3));
        assert_eq!(e.ban_duration(4), days(7));
        assert_eq!(e.ban_duration(5), days(14));
        assert_eq!(e.ban_duration(6), days(30));
        assert_eq!(e.ban_duration(100), days(30));
    }

    #[test]
    fn test_tiered_escalation_repeats_last_tier() {
        let e = TieredEscalation::from_days(&[1, 5]);
        assert_eq!(e.ban_duration(0), Duration::zero());
        assert_eq!(e.ban_duration(1), days(1));
        assert_eq!(e.ban_duration(2), days(5));
        assert_eq!(e.ban_duration(9), days(5));
    }

    #[test]
    fn test_tiered_escalation_empty_is_zero() {
        let e = TieredEscalation::from_days(&[]);
        assert_eq!(e.ban_duration(3), Duration::zero());
    }

    #[test]
    fn test_rebanning_living_entry_escalates() {
        let mut entry = Entry::build(CIDR, LINK, None, &DefaultEscalation, built_time());
        let now = built_time() + days(1);
        entry.ban(LINK, None, &DefaultEscalation, now);

        assert_eq!(entry.cidr_block(), CIDR);
        assert_eq!(entry.since(), Some(now));
        assert!(!entry.expired());
        assert_eq!(entry.expire_at(), Some(now + days(2)));
        assert_eq!(entry.ban_count(), 2);

        let last = entry.histories().last().unwrap();
        assert_eq!(last.action, Action::Ban);
        assert_eq!(last.executed_at, now);
        assert_eq!(last.actor_link.as_deref(), Some(LINK));

        let change = entry.change().unwrap();
        assert_eq!(change.action, Action::Ban);
        assert_eq!(change.cidr_block, CIDR);
        assert_eq!(change.ban_count, 2);
        assert_eq!(Some(change.expire_at), entry.expire_at());
    }

    #[test]
    fn test_ban_past_representable_time_saturates() {
        let escalation = |_: u32| days(100_000_000);
        let entry = Entry::build(CIDR, LINK, None, &escalation, built_time());
        assert_eq!(entry.expire_at(), Some(DateTime::<Utc>::MAX_UTC));
        assert!(entry.living());
        assert!(!entry.should_expire(built_time() + days(36_500)));
    }

    #[test]
    fn test_rebanning_expired_entry_escalates() {
        let mut entry = Entry::build(CIDR, LINK, None, &DefaultEscalation, built_time());
        entry.expire(Some(LINK), built_time());
        let now = built_time() + days(1);
        entry.ban(LINK, None, &DefaultEscalation, now);

        assert!(entry.living());
        assert_eq!(entry.expire_at(), Some(now + days(2)));
        assert_eq!(entry.ban_count(), 2);
        assert_eq!(entry.histories().len(), 3);
    }

    #[test]
    fn test_explicit_duration_wins_over_escalation() {
        let mut entry = Entry::build(CIDR, LINK, None, &DefaultEscalation, built_time());
        entry.ban(LINK, Some(days(5)), &DefaultEscalation, built_time());
        let since = entry.since().unwrap();
        assert_eq!(entry.expire_at().unwrap() - since, days(5));
    }

    #[test]
    fn test_custom_escalation_per_ban() {
        let escalation = |count: u32| if count <= 2 { days(1) } else { days(3) };
        let mut entry = Entry::new(CIDR);
        let t = built_time();

        entry.ban(LINK, None, &escalation, t);
        assert_eq!(entry.expire_at().unwrap() - t, days(1));
        entry.ban(LINK, None, &escalation, t);
        assert_eq!(entry.expire_at().unwrap() - t, days(1));
        entry.ban(LINK, None, &escalation, t);
        assert_eq!(entry.expire_at().unwrap() - t, days(3));
    }

    #[test]
    fn test_ban_count_counts_activations_across_expires() {
        let mut entry = Entry::new(CIDR);
        let mut t = built_time();
        for n in 1..=6u32 {
            entry.ban(LINK, None, &DefaultEscalation, t);
            assert_eq!(entry.ban_count(), n);
            t += Duration::hours(1);
            if n % 2 == 0 {
                entry.expire(None, t);
            }
        }
        assert_eq!(entry.ban_count(), 6);
    }

    #[test]
    fn test_expire_living_entry() {
        let mut entry = Entry::build(CIDR, LINK, None, &DefaultEscalation, built_time());
        let now = built_time() + Duration::hours(1);

        assert!(entry.expire(Some(LINK), now));
        assert_eq!(entry.since(), Some(built_time()));
        assert!(entry.expired());
        assert_eq!(entry.expire_at(), Some(now));
        assert_eq!(entry.ban_count(), 1);

        let last = entry.histories().last().unwrap();
        assert_eq!(last.action, Action::Expire);
        assert_eq!(last.executed_at, now);

        let change = entry.change().unwrap();
        assert_eq!(change.action, Action::Expire);
        assert_eq!(change.ban_count, 1);
        assert_eq!(change.expire_at, now);
    }

    #[test]
    fn test_expire_is_idempotent() {
        let mut entry = Entry::build(CIDR, LINK, None, &DefaultEscalation, built_time());
        entry.expire(Some(LINK), built_time());
        let before = entry.clone();

        assert!(!entry.expire(Some(LINK), built_time() + Duration::hours(1)));
        assert_eq!(entry, before);
        assert_eq!(entry.histories().len(), 2);
        assert_eq!(entry.expire_at(), Some(built_time()));
    }

    #[test]
    fn test_should_expire() {
        let entry = Entry::build(CIDR, LINK, None, &DefaultEscalation, built_time());
        assert!(!entry.should_expire(built_time()));
        assert!(!entry.should_expire(built_time() + Duration::hours(23)));
        assert!(entry.should_expire(built_time() + days(1)));

        let mut expired = entry.clone();
        expired.expire(None, built_time());
        assert!(!expired.should_expire(built_time() + days(10)));
    }

    #[test]
    fn test_never_banned_entry_does_not_expire() {
        let entry = Entry::new(CIDR);
        assert!(!entry.should_expire(built_time()));
    }

    #[test]
    fn test_change_render() {
        let entry = Entry::build(CIDR, LINK, Some(days(1)), &DefaultEscalation, built_time());
        let change = entry.change().unwrap();
        assert_eq!(
            change.render(false),
            "192.0.2.1/32 has been banned until 2020-01-01T17:00:00Z (ban count: 1)"
        );
        assert!(change.render(true).starts_with(":boom: "));

        let mut entry = entry;
        entry.expire(None, built_time());
        let change = entry.change().unwrap();
        assert_eq!(change.to_string(), "192.0.2.1/32 has expired (ban count: 1)");
        assert!(change.render(true).starts_with(":fire-extinguisher: "));
    }

    #[test]
    fn test_serialized_shape() {
        let entry = Entry::build(CIDR, LINK, Some(days(1)), &DefaultEscalation, built_time());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["cidr_block"], CIDR);
        assert_eq!(json["since"], "2019-12-31T17:00:00Z");
        assert_eq!(json["expire_at"], "2020-01-01T17:00:00Z");
        assert_eq!(json["expired"], false);
        assert_eq!(json["ban_count"], 1);
        assert_eq!(json["histories"][0]["action"], "ban");
        assert_eq!(json["histories"][0]["slack_link"], LINK);
        assert!(json.get("change").is_none());
    }

    #[test]
    fn test_deserialize_accepts_offset_timestamps() {
        let json = r#"{
            "cidr_block": "192.0.2.1/32",
            "since": "2020-01-01T02:00:00+09:00",
            "expire_at": "2020-01-02T02:00:00+09:00",
            "expired": false,
            "ban_count": 1,
            "histories": [
                {"action": "ban", "executed_at": "2020-01-01T02:00:00+09:00", "slack_link": "dummy"}
            ]
        }"#;
        let entry: Entry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.since(), Some(built_time()));
        assert!(entry.change().is_none());
        assert!(entry.should_expire(built_time() + days(1)));
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("ban".parse::<Action>().unwrap(), Action::Ban);
        assert_eq!("expire".parse::<Action>().unwrap(), Action::Expire);
        assert!("unban".parse::<Action>().is_err());
    }
}
