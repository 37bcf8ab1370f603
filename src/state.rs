//! Ban list snapshot with a staging buffer and commit protocol.
//!
//! Mutations (`ban`, `expire`, `sweep`) only stage updated copies of entries.
//! [`State::commit`] folds the staged bans, then the staged expires, into the
//! committed mapping and records the resulting change log. Until then the
//! staged copies are visible through [`State::entries_to_ban`] and
//! [`State::entries_to_expire`] only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::entry::{Change, DefaultEscalation, Entry, Escalation};

pub struct State {
    entries: BTreeMap<String, Entry>,
    entries_to_ban: Vec<Entry>,
    entries_to_expire: Vec<Entry>,
    /// Latest staged version of each touched block, so repeated operations
    /// in one batch build on each other
    pending: BTreeMap<String, Entry>,
    changes: Vec<Change>,
    escalation: Arc<dyn Escalation>,
}

impl Default for State {
    fn default() -> Self {
        Self::from_entries(BTreeMap::new())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("entries", &self.entries)
            .field("entries_to_ban", &self.entries_to_ban)
            .field("entries_to_expire", &self.entries_to_expire)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, Entry>) -> Self {
        Self {
            entries,
            entries_to_ban: Vec::new(),
            entries_to_expire: Vec::new(),
            pending: BTreeMap::new(),
            changes: Vec::new(),
            escalation: Arc::new(DefaultEscalation),
        }
    }

    /// Replace the escalation policy used for bans without explicit duration
    pub fn with_escalation(mut self, escalation: Arc<dyn Escalation>) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Persisted representation, sorted by CIDR block
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn current(&self, cidr_block: &str) -> Option<&Entry> {
        self.pending
            .get(cidr_block)
            .or_else(|| self.entries.get(cidr_block))
    }

    /// Stage a ban. Creates the entry if the block was never seen.
    pub fn ban(
        &mut self,
        cidr_block: &str,
        actor_link: &str,
        expire_in: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        let mut entry = self
            .current(cidr_block)
            .cloned()
            .unwrap_or_else(|| Entry::new(cidr_block));
        entry.ban(actor_link, expire_in, self.escalation.as_ref(), now);

        debug!(
            "Staged ban of {} (ban count {})",
            cidr_block,
            entry.ban_count()
        );
        self.pending.insert(cidr_block.to_string(), entry.clone());
        self.entries_to_ban.push(entry);
    }

    /// Stage an expire. Unknown or already expired blocks are ignored.
    pub fn expire(&mut self, cidr_block: &str, actor_link: Option<&str>, now: DateTime<Utc>) {
        let Some(mut entry) = self.current(cidr_block).filter(|e| e.living()).cloned() else {
            debug!("Nothing to expire for {}", cidr_block);
            return;
        };
        entry.expire(actor_link, now);

        debug!("Staged expire of {}", cidr_block);
        self.pending.insert(cidr_block.to_string(), entry.clone());
        self.entries_to_expire.push(entry);
    }

    /// Stage an automatic expire for every entry whose timer ran out.
    ///
    /// Returns whether anything was staged.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> bool {
        let due: Vec<String> = self
            .entries
            .keys()
            .filter(|k| self.current(k).is_some_and(|e| e.should_expire(now)))
            .cloned()
            .collect();

        for cidr_block in &due {
            self.expire(cidr_block, None, now);
        }

        !due.is_empty()
    }

    /// Apply staged bans, then staged expires, and rebuild the change log.
    pub fn commit(&mut self) -> &mut Self {
        let bans = std::mem::take(&mut self.entries_to_ban);
        let expires = std::mem::take(&mut self.entries_to_expire);
        self.pending.clear();

        self.changes = bans
            .iter()
            .chain(expires.iter())
            .filter_map(|e| e.change().cloned())
            .collect();

        for entry in bans.into_iter().chain(expires) {
            self.entries.insert(entry.cidr_block().to_string(), entry);
        }

        self
    }

    /// Whether the last commit changed anything
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Change log of the last commit, one line per change
    pub fn changes(&self, decorate: bool) -> String {
        self.changes
            .iter()
            .map(|c| c.render(decorate))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn change_log(&self) -> &[Change] {
        &self.changes
    }

    /// Committed entries in CIDR block order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Committed entries that are currently banned
    pub fn living_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(|e| e.living())
    }

    pub fn entry(&self, cidr_block: &str) -> Option<&Entry> {
        self.entries.get(cidr_block)
    }

    pub fn entries_to_ban(&self) -> &[Entry] {
        &self.entries_to_ban
    }

    pub fn entries_to_expire(&self) -> &[Entry] {
        &self.entries_to_expire
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, Entry>::deserialize(deserializer).map(Self::from_entries)
    }
}
