//! Centralized validation functions for banwarden.
//!
//! This module provides unified validation for:
//! - CIDR blocks (parsing and canonical form)
//! - Ban durations (`3d`, `1d2d`, ...)
//! - Identifiers that end up inside nft scripts

use anyhow::{bail, Result};
use ipnet::IpNet;
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

use crate::entry::DAY_SECS;
use crate::error::{BanError, BanResult};

/// Longest accepted explicit ban (100 years)
pub const MAX_EXPIRE_IN_DAYS: u64 = 36_500;

/// Validate an IP address or CIDR string and return the parsed IpNet.
///
/// If the input is a plain IP address (without /prefix), it will be converted
/// to a /32 (IPv4) or /128 (IPv6) network. Host bits are kept as given.
///
/// # Examples
/// ```
/// use banwarden::validation::validate_ip_or_cidr;
/// assert!(validate_ip_or_cidr("192.168.1.1").is_ok());
/// assert!(validate_ip_or_cidr("192.168.0.0/24").is_ok());
/// assert!(validate_ip_or_cidr("invalid").is_err());
/// ```
pub fn validate_ip_or_cidr(ip_str: &str) -> Result<IpNet> {
    if ip_str.contains('/') {
        ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", ip_str))
    } else {
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))?;
        Ok(IpNet::from(ip))
    }
}

/// Rewrite a CIDR block to its canonical `address/prefix_length` form.
///
/// # Examples
/// ```
/// use banwarden::validation::normalize_cidr_block;
/// assert_eq!(normalize_cidr_block("192.0.2.1").unwrap(), "192.0.2.1/32");
/// assert_eq!(normalize_cidr_block("2001:DB8::1").unwrap(), "2001:db8::1/128");
/// ```
pub fn normalize_cidr_block(cidr_block: &str) -> BanResult<String> {
    validate_ip_or_cidr(cidr_block)
        .map(|net| net.to_string())
        .map_err(|_| BanError::InvalidCidrBlock(format!("{} is invalid address", cidr_block)))
}

fn expire_in_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:[0-9]+d)+$").expect("static pattern"))
}

fn expire_in_segment() -> &'static Regex {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| Regex::new(r"([0-9]+)d").expect("static pattern"))
}

/// Convert a ban duration token into seconds.
///
/// The token is one or more `<digits>d` segments; segments are summed.
///
/// # Examples
/// ```
/// use banwarden::validation::parse_expire_in;
/// assert_eq!(parse_expire_in("3d").unwrap(), 259_200);
/// assert_eq!(parse_expire_in("1d2d").unwrap(), 259_200);
/// assert!(parse_expire_in("0d").is_err());
/// assert!(parse_expire_in("3h").is_err());
/// ```
pub fn parse_expire_in(token: &str) -> BanResult<u64> {
    let invalid = || BanError::InvalidDuration(format!("{} is invalid expire_in. Use \\d+d", token));

    if !expire_in_pattern().is_match(token) {
        return Err(invalid());
    }

    let mut total_days: u64 = 0;
    for cap in expire_in_segment().captures_iter(token) {
        let days: u64 = cap[1].parse().map_err(|_| invalid())?;
        total_days = total_days.checked_add(days).ok_or_else(invalid)?;
    }

    if total_days == 0 {
        return Err(invalid());
    }
    if total_days > MAX_EXPIRE_IN_DAYS {
        return Err(BanError::InvalidDuration(format!(
            "{} exceeds the maximum of {}d",
            token, MAX_EXPIRE_IN_DAYS
        )));
    }

    Ok(total_days * DAY_SECS as u64)
}

/// Validate a name spliced into nft scripts (tables, sets).
pub fn validate_nft_identifier(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        bail!("Invalid nftables identifier '{}': length must be 1-64", name);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!(
            "Invalid nftables identifier '{}': only ASCII letters, digits and '_' allowed",
            name
        );
    }
    Ok(())
}
