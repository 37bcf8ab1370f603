//! Reconcilers push the living entries into external firewall rule-sets.
//!
//! Every reconciler computes the minimal insert/delete set against what the
//! target currently holds and reports whether it had to write anything.

mod ip_set;
mod nftables;

use anyhow::Result;
use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

pub use ip_set::{HttpIpSetApi, IpSetApi, IpSetReconciler, IpSetUpdate, UpdateAction};
pub use nftables::NftablesReconciler;

use crate::config::{Config, ReconcilerConfig};
use crate::state::State;

/// Address family of a rule-set element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    #[serde(rename = "IPV4")]
    V4,
    #[serde(rename = "IPV6")]
    V6,
}

impl IpFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamily::V4 => "IPV4",
            IpFamily::V6 => "IPV6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a remote rule-set: family plus normalized CIDR block
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IpSetDescriptor {
    #[serde(rename = "type")]
    pub kind: IpFamily,
    pub value: String,
}

impl IpSetDescriptor {
    /// Build from a normalized block; `None` if the text is not a CIDR block
    pub fn from_cidr_block(cidr_block: &str) -> Option<Self> {
        let net: IpNet = cidr_block.parse().ok()?;
        let kind = match net {
            IpNet::V4(_) => IpFamily::V4,
            IpNet::V6(_) => IpFamily::V6,
        };
        Some(Self {
            kind,
            value: cidr_block.to_string(),
        })
    }
}

/// Elements the rule-sets should contain: one per living entry
pub fn desired_descriptors(state: &State) -> BTreeSet<IpSetDescriptor> {
    state
        .living_entries()
        .filter_map(|e| {
            let descriptor = IpSetDescriptor::from_cidr_block(e.cidr_block());
            if descriptor.is_none() {
                warn!("Skipping unparsable CIDR block in state: {}", e.cidr_block());
            }
            descriptor
        })
        .collect()
}

/// Minimal change turning `current` into `desired`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpSetDiff {
    pub insert: Vec<IpSetDescriptor>,
    pub delete: Vec<IpSetDescriptor>,
}

impl IpSetDiff {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}

pub fn diff(desired: &BTreeSet<IpSetDescriptor>, current: &BTreeSet<IpSetDescriptor>) -> IpSetDiff {
    IpSetDiff {
        insert: desired.difference(current).cloned().collect(),
        delete: current.difference(desired).cloned().collect(),
    }
}

/// Trait for rule-set reconcilers
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Human readable target name, used in result lines
    fn description(&self) -> String;

    /// Bring the target in line with the living entries.
    ///
    /// Returns `Ok(true)` if anything was written, `Ok(false)` if the target
    /// already matched.
    async fn update(&self, state: &State) -> Result<bool>;
}

/// Create the reconcilers listed in configuration, in order
pub fn create_reconcilers(config: &Config) -> Result<Vec<Box<dyn Reconciler>>> {
    config
        .reconcilers
        .iter()
        .map(|r| -> Result<Box<dyn Reconciler>> {
            match r {
                ReconcilerConfig::IpSet(c) => {
                    let api = HttpIpSetApi::new(&c.endpoint, &c.region, c.get_token())?;
                    Ok(Box::new(IpSetReconciler::new(api, &c.ip_set_id)))
                }
                ReconcilerConfig::Nftables(c) => Ok(Box::new(NftablesReconciler::new(
                    &c.table, &c.set_v4, &c.set_v6,
                ))),
            }
        })
        .collect()
}
