//! `<action> <cidr,cidr,...> [expire_in]` parser.

use super::{Builder, Command};
use crate::error::{BanError, BanResult};

const MAX_TOKENS: usize = 3;

/// One-line grammar summary shown by `help`
pub fn help() -> &'static str {
    "(ban|expire) cidr_blocks [expire_in (optional, e.g. 3d)]"
}

/// Parse and validate command text.
///
/// # Examples
/// ```
/// use banwarden::command::parse;
/// let command = parse("ban 192.0.2.1,192.0.2.2/24 3d").unwrap();
/// assert_eq!(command.cidr_blocks(), ["192.0.2.1/32", "192.0.2.2/24"]);
/// assert_eq!(command.expire_in_sec(), Some(259_200));
/// ```
pub fn parse(text: &str) -> BanResult<Command> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() > MAX_TOKENS {
        return Err(BanError::Syntax("too many arguments".to_string()));
    }

    let action = tokens.first().copied();
    let cidr_blocks = tokens.get(1).map(|s| split_cidr_blocks(s)).unwrap_or_default();
    let expire_in = tokens.get(2).copied();

    Builder::new(action, cidr_blocks, expire_in).build()
}

/// Split on commas; trailing separators are ignored, inner empty items are not.
fn split_cidr_blocks(list: &str) -> Vec<&str> {
    let list = list.trim_end_matches(',');
    if list.is_empty() {
        Vec::new()
    } else {
        list.split(',').collect()
    }
}
