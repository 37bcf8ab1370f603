//! Ban list commands and their text grammar.

mod builder;
mod parser;

use chrono::Duration;
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::OnceLock;

pub use builder::Builder;
pub use parser::{help, parse};

use crate::entry::Action;
use crate::error::{BanError, BanResult};

/// A validated ban or expire request.
///
/// Only [`Builder`] (directly or through [`parse`]) produces commands, so every
/// CIDR block is already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Command {
    action: Action,
    cidr_blocks: Vec<String>,
    #[serde(default)]
    expire_in_sec: Option<u64>,
}

impl Command {
    pub(crate) fn new(action: Action, cidr_blocks: Vec<String>, expire_in_sec: Option<u64>) -> Self {
        Self {
            action,
            cidr_blocks,
            expire_in_sec,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn cidr_blocks(&self) -> &[String] {
        &self.cidr_blocks
    }

    pub fn expire_in_sec(&self) -> Option<u64> {
        self.expire_in_sec
    }

    /// Explicit ban duration, if one was given
    pub fn expire_in(&self) -> Option<Duration> {
        self.expire_in_sec.map(|s| Duration::seconds(s as i64))
    }

    /// Canonical JSON form, pretty printed
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Fenced block embedded in approval requests
    pub fn to_code_block(&self) -> String {
        format!("```\n{}\n```\n", self.to_json())
    }

    /// Rebuild the command embedded in an approval request message.
    ///
    /// The decoded command is validated again: the message text comes back
    /// from the chat platform and is not trusted.
    pub fn from_original_message(message: &str) -> BanResult<Self> {
        let block = code_block_pattern()
            .captures(message)
            .and_then(|c| c.get(1))
            .ok_or_else(|| BanError::Syntax("no command block in original message".to_string()))?;

        let command: Command = serde_json::from_str(block.as_str().trim())
            .map_err(|e| BanError::Syntax(format!("malformed command block: {}", e)))?;

        Builder::revalidate(command)
    }
}

/// `expire_in_sec` is written for ban commands only (as `null` when unset).
impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let with_duration = self.action == Action::Ban;
        let mut s = serializer.serialize_struct("Command", if with_duration { 3 } else { 2 })?;
        s.serialize_field("action", &self.action)?;
        s.serialize_field("cidr_blocks", &self.cidr_blocks)?;
        if with_duration {
            s.serialize_field("expire_in_sec", &self.expire_in_sec)?;
        }
        s.end()
    }
}

fn code_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```([^`]+)```").expect("static pattern"))
}
