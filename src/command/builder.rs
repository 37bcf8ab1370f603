//! Validation and normalization of raw command parts.

use super::Command;
use crate::entry::{Action, DAY_SECS};
use crate::error::{BanError, BanResult};
use crate::validation::{normalize_cidr_block, parse_expire_in, MAX_EXPIRE_IN_DAYS};

/// Raw, unvalidated command parts
#[derive(Debug, Default)]
pub struct Builder<'a> {
    action: Option<&'a str>,
    cidr_blocks: Vec<&'a str>,
    expire_in: Option<&'a str>,
}

impl<'a> Builder<'a> {
    pub fn new(action: Option<&'a str>, cidr_blocks: Vec<&'a str>, expire_in: Option<&'a str>) -> Self {
        Self {
            action,
            cidr_blocks,
            expire_in,
        }
    }

    /// Validate in order: action, CIDR blocks, duration.
    pub fn build(self) -> BanResult<Command> {
        let action = validate_action(self.action)?;

        if self.cidr_blocks.is_empty() {
            return Err(BanError::InvalidCidrBlock(
                "at least one cidr_block is required".to_string(),
            ));
        }
        let cidr_blocks = self
            .cidr_blocks
            .iter()
            .map(|c| normalize_cidr_block(c))
            .collect::<BanResult<Vec<_>>>()?;

        let expire_in_sec = match self.expire_in {
            None => None,
            Some(_) if action != Action::Ban => return Err(duration_not_permitted(action)),
            Some(token) => Some(parse_expire_in(token)?),
        };

        Ok(Command::new(action, cidr_blocks, expire_in_sec))
    }

    /// Re-run the invariants on a command decoded from JSON.
    pub(crate) fn revalidate(command: Command) -> BanResult<Command> {
        if command.cidr_blocks.is_empty() {
            return Err(BanError::InvalidCidrBlock(
                "at least one cidr_block is required".to_string(),
            ));
        }
        let cidr_blocks = command
            .cidr_blocks
            .iter()
            .map(|c| normalize_cidr_block(c))
            .collect::<BanResult<Vec<_>>>()?;

        match command.expire_in_sec {
            Some(_) if command.action != Action::Ban => {
                return Err(duration_not_permitted(command.action))
            }
            Some(0) => {
                return Err(BanError::InvalidDuration(
                    "expire_in_sec must be positive".to_string(),
                ))
            }
            Some(secs) if secs > MAX_EXPIRE_IN_DAYS * DAY_SECS as u64 => {
                return Err(BanError::InvalidDuration(format!(
                    "expire_in_sec {} exceeds the maximum of {}d",
                    secs, MAX_EXPIRE_IN_DAYS
                )))
            }
            _ => {}
        }

        Ok(Command::new(command.action, cidr_blocks, command.expire_in_sec))
    }
}

fn validate_action(action: Option<&str>) -> BanResult<Action> {
    action.and_then(|a| a.parse().ok()).ok_or_else(|| {
        let permitted: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();
        BanError::InvalidAction(format!("permitted actions are: {}", permitted.join("|")))
    })
}

fn duration_not_permitted(action: Action) -> BanError {
    BanError::InvalidDuration(format!("{} does not take expire_in", action))
}
