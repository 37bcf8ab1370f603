//! nftables reconciler: keeps two named interval sets (IPv4, IPv6) in an
//! `inet` table equal to the living entries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{desired_descriptors, diff, IpFamily, IpSetDescriptor, IpSetDiff, Reconciler};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, RealCommandExecutor};
use crate::state::State;
use crate::validation::normalize_cidr_block;

const NFT_BIN: &str = "nft";

/// Validate that an IP/CIDR string is safe for nftables script inclusion.
fn is_safe_nft_element(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c))
}

/// Interval sets hold masked prefixes and reject overlapping elements, so
/// blocks are truncated to their network and collapsed before comparison.
fn to_set_elements<I: IntoIterator<Item = IpNet>>(nets: I) -> BTreeSet<IpSetDescriptor> {
    let nets: Vec<IpNet> = nets.into_iter().map(|n| n.trunc()).collect();
    IpNet::aggregate(&nets)
        .into_iter()
        .filter_map(|n| IpSetDescriptor::from_cidr_block(&n.to_string()))
        .collect()
}

fn desired_elements(state: &State) -> BTreeSet<IpSetDescriptor> {
    to_set_elements(
        desired_descriptors(state)
            .iter()
            .filter_map(|d| d.value.parse::<IpNet>().ok()),
    )
}

pub struct NftablesReconciler<E: CommandExecutor = RealCommandExecutor> {
    sets: Arc<NftSets<E>>,
}

/// Table and set names plus the executor running `nft`
struct NftSets<E> {
    executor: E,
    table: String,
    set_v4: String,
    set_v6: String,
}

impl NftablesReconciler<RealCommandExecutor> {
    pub fn new(table: &str, set_v4: &str, set_v6: &str) -> Self {
        Self::with_executor(RealCommandExecutor::new(), table, set_v4, set_v6)
    }
}

impl<E: CommandExecutor> NftablesReconciler<E> {
    pub fn with_executor(executor: E, table: &str, set_v4: &str, set_v6: &str) -> Self {
        Self {
            sets: Arc::new(NftSets {
                executor,
                table: table.to_string(),
                set_v4: set_v4.to_string(),
                set_v6: set_v6.to_string(),
            }),
        }
    }
}

impl<E: CommandExecutor> NftSets<E> {
    fn set_name(&self, family: IpFamily) -> &str {
        match family {
            IpFamily::V4 => &self.set_v4,
            IpFamily::V6 => &self.set_v6,
        }
    }

    /// Current elements of one set; `None` if the set does not exist yet
    fn list_set(&self, family: IpFamily) -> Result<Option<BTreeSet<IpSetDescriptor>>> {
        let args = args_to_strings(&["list", "set", "inet", self.table.as_str(), self.set_name(family)]);
        let output = self.executor.execute(NFT_BIN, &args)?;
        if !output.success {
            debug!(
                "nft set {} not listable: {}",
                self.set_name(family),
                output.stderr.trim()
            );
            return Ok(None);
        }

        let nets: Vec<IpNet> = parse_set_elements(&output.stdout)
            .into_iter()
            .filter_map(|e| match normalize_cidr_block(&e) {
                Ok(block) => block.parse::<IpNet>().ok(),
                Err(_) => {
                    warn!("Ignoring unexpected nft set element: {}", e);
                    None
                }
            })
            .collect();
        Ok(Some(to_set_elements(nets)))
    }

    /// Table, sets and drop rules, created only when the sets are missing
    fn generate_setup_script(&self) -> String {
        let mut script = String::new();
        script.push_str(&format!("add table inet {}\n", self.table));
        script.push_str(&format!(
            "add set inet {} {} {{ type ipv4_addr; flags interval; }}\n",
            self.table, self.set_v4
        ));
        script.push_str(&format!(
            "add set inet {} {} {{ type ipv6_addr; flags interval; }}\n",
            self.table, self.set_v6
        ));
        script.push_str(&format!(
            "add chain inet {} input {{ type filter hook input priority -1; policy accept; }}\n",
            self.table
        ));
        script.push_str(&format!(
            "add rule inet {} input ip saddr @{} counter drop\n",
            self.table, self.set_v4
        ));
        script.push_str(&format!(
            "add rule inet {} input ip6 saddr @{} counter drop\n",
            self.table, self.set_v6
        ));
        script
    }

    fn generate_update_script(&self, delta: &IpSetDiff) -> String {
        let mut script = String::new();
        for (verb, items) in [("delete", &delta.delete), ("add", &delta.insert)] {
            for family in [IpFamily::V4, IpFamily::V6] {
                let elements: Vec<&str> = items
                    .iter()
                    .filter(|d| d.kind == family)
                    .map(|d| d.value.as_str())
                    .filter(|s| {
                        let safe = is_safe_nft_element(s);
                        if !safe {
                            warn!("Filtered unsafe nftables element: {}", s);
                        }
                        safe
                    })
                    .collect();
                if elements.is_empty() {
                    continue;
                }
                script.push_str(&format!(
                    "{} element inet {} {} {{ {} }}\n",
                    verb,
                    self.table,
                    self.set_name(family),
                    elements.join(", ")
                ));
            }
        }
        script
    }

    fn exec_nft_script(&self, script: &str) -> Result<()> {
        debug!("Executing nft script:\n{}", script);
        let args = args_to_strings(&["-f", "-"]);
        let output = self.executor.execute_with_stdin(NFT_BIN, &args, script)?;
        if !output.success {
            anyhow::bail!("nft failed: {}", output.stderr.trim());
        }
        Ok(())
    }

    /// Blocking part of an update: list, diff, apply
    fn sync(&self, desired: &BTreeSet<IpSetDescriptor>) -> Result<bool> {
        let v4 = self.list_set(IpFamily::V4)?;
        let v6 = self.list_set(IpFamily::V6)?;
        let sets_exist = v4.is_some() && v6.is_some();
        let current: BTreeSet<IpSetDescriptor> =
            v4.into_iter().chain(v6).flatten().collect();

        let delta = diff(desired, &current);
        if delta.is_empty() && sets_exist {
            debug!("nftables table {} already in sync", self.table);
            return Ok(false);
        }

        let mut script = String::new();
        if !sets_exist {
            script.push_str(&self.generate_setup_script());
        }
        script.push_str(&self.generate_update_script(&delta));
        self.exec_nft_script(&script)?;

        info!(
            "nftables table {}: {} added, {} removed",
            self.table,
            delta.insert.len(),
            delta.delete.len()
        );
        Ok(true)
    }
}

#[async_trait]
impl<E: CommandExecutor + 'static> Reconciler for NftablesReconciler<E> {
    fn description(&self) -> String {
        format!("Update nftables sets in table {}", self.sets.table)
    }

    async fn update(&self, state: &State) -> Result<bool> {
        let desired = desired_elements(state);
        let sets = Arc::clone(&self.sets);
        tokio::task::spawn_blocking(move || sets.sync(&desired))
            .await
            .context("nft task failed")?
    }
}

/// Extract the items of the `elements = { ... }` clause, which nft may wrap
/// over several lines.
fn parse_set_elements(output: &str) -> Vec<String> {
    let Some(start) = output.find("elements") else {
        return Vec::new();
    };
    let rest = &output[start..];
    let (Some(open), Some(close)) = (rest.find('{'), rest.find('}')) else {
        return Vec::new();
    };
    if close < open {
        return Vec::new();
    }

    rest[open + 1..close]
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};
    use crate::entry::now;
    use chrono::Duration;

    const LISTED_V4: &str = "table inet banwarden {\n\tset banned_v4 {\n\t\ttype ipv4_addr\n\t\tflags interval\n\t\telements = { 192.0.2.1, 198.51.100.0/24,\n\t\t\t     203.0.113.7 }\n\t}\n}\n";
    const LISTED_V4_EMPTY: &str =
        "table inet banwarden {\n\tset banned_v4 {\n\t\ttype ipv4_addr\n\t\tflags interval\n\t}\n}\n";
    const LISTED_V6_EMPTY: &str =
        "table inet banwarden {\n\tset banned_v6 {\n\t\ttype ipv6_addr\n\t\tflags interval\n\t}\n}\n";

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    fn missing() -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: "Error: No such file or directory".to_string(),
            success: false,
            code: Some(1),
        }
    }

    fn state_with(blocks: &[&str]) -> State {
        let mut state = State::default();
        for block in blocks {
            state.ban(block, "link", Some(Duration::days(1)), now());
        }
        state.commit();
        state
    }

    fn expect_listing(mock: &mut MockCommandExecutor, v4: CommandOutput, v6: CommandOutput) {
        mock.expect_execute()
            .withf(|cmd, args| cmd == NFT_BIN && args.last().map(String::as_str) == Some("banned_v4"))
            .returning(move |_, _| Ok(v4.clone()));
        mock.expect_execute()
            .withf(|cmd, args| cmd == NFT_BIN && args.last().map(String::as_str) == Some("banned_v6"))
            .returning(move |_, _| Ok(v6.clone()));
    }

    #[test]
    fn test_parse_set_elements_multiline() {
        let elements = parse_set_elements(LISTED_V4);
        assert_eq!(elements, vec!["192.0.2.1", "198.51.100.0/24", "203.0.113.7"]);
    }

    #[test]
    fn test_parse_set_elements_empty_set() {
        assert!(parse_set_elements(LISTED_V6_EMPTY).is_empty());
    }

    #[test]
    fn test_is_safe_nft_element() {
        assert!(is_safe_nft_element("192.0.2.0/24"));
        assert!(is_safe_nft_element("2001:db8::/32"));
        assert!(!is_safe_nft_element("192.0.2.1; flush ruleset"));
        assert!(!is_safe_nft_element("192.0.2.1 }"));
    }

    #[tokio::test]
    async fn test_update_adds_and_deletes() {
        let mut mock = MockCommandExecutor::new();
        expect_listing(&mut mock, ok(LISTED_V4), ok(LISTED_V6_EMPTY));
        mock.expect_execute_with_stdin()
            .withf(|cmd, _, script| {
                cmd == NFT_BIN
                    && !script.contains("add table")
                    && script.contains("delete element inet banwarden banned_v4 { 192.0.2.1/32, 203.0.113.7/32 }")
                    && script.contains("add element inet banwarden banned_v6 { 2001:db8::/32 }")
            })
            .times(1)
            .returning(|_, _, _| Ok(ok("")));

        let reconciler =
            NftablesReconciler::with_executor(mock, "banwarden", "banned_v4", "banned_v6");
        let state = state_with(&["198.51.100.0/24", "2001:db8::/32"]);
        assert!(reconciler.update(&state).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_in_sync_runs_no_script() {
        let mut mock = MockCommandExecutor::new();
        expect_listing(&mut mock, ok(LISTED_V4), ok(LISTED_V6_EMPTY));
        mock.expect_execute_with_stdin().times(0);

        let reconciler =
            NftablesReconciler::with_executor(mock, "banwarden", "banned_v4", "banned_v6");
        let state = state_with(&["192.0.2.1/32", "198.51.100.0/24", "203.0.113.7/32"]);
        assert!(!reconciler.update(&state).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_creates_missing_sets() {
        let mut mock = MockCommandExecutor::new();
        expect_listing(&mut mock, missing(), missing());
        mock.expect_execute_with_stdin()
            .withf(|_, _, script| {
                script.starts_with("add table inet banwarden\n")
                    && script.contains("ip saddr @banned_v4 counter drop")
                    && script.contains("add element inet banwarden banned_v4 { 192.0.2.1/32 }")
            })
            .times(1)
            .returning(|_, _, _| Ok(ok("")));

        let reconciler =
            NftablesReconciler::with_executor(mock, "banwarden", "banned_v4", "banned_v6");
        assert!(reconciler.update(&state_with(&["192.0.2.1/32"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_host_bits_match_masked_listing() {
        let listed = "table inet banwarden {\n\tset banned_v4 {\n\t\ttype ipv4_addr\n\t\tflags interval\n\t\telements = { 192.0.2.0/24 }\n\t}\n}\n";
        let mut mock = MockCommandExecutor::new();
        expect_listing(&mut mock, ok(listed), ok(LISTED_V6_EMPTY));
        mock.expect_execute_with_stdin().times(0);

        let reconciler =
            NftablesReconciler::with_executor(mock, "banwarden", "banned_v4", "banned_v6");
        let state = state_with(&["192.0.2.2/24"]);
        assert!(!reconciler.update(&state).await.unwrap());
        assert!(!reconciler.update(&state).await.unwrap());
    }

    #[tokio::test]
    async fn test_overlapping_blocks_collapse_to_covering_prefix() {
        let mut mock = MockCommandExecutor::new();
        expect_listing(&mut mock, ok(LISTED_V4_EMPTY), ok(LISTED_V6_EMPTY));
        mock.expect_execute_with_stdin()
            .withf(|_, _, script| {
                script == "add element inet banwarden banned_v4 { 10.0.0.0/8 }\n"
            })
            .times(1)
            .returning(|_, _, _| Ok(ok("")));

        let reconciler =
            NftablesReconciler::with_executor(mock, "banwarden", "banned_v4", "banned_v6");
        let state = state_with(&["10.0.0.0/8", "10.1.2.3/32", "10.200.0.0/16"]);
        assert!(reconciler.update(&state).await.unwrap());
    }

    #[test]
    fn test_desired_elements_masked_and_aggregated() {
        let state = state_with(&["192.0.2.2/24", "198.51.100.0/25", "198.51.100.128/25", "2001:db8::1/32"]);
        let values: Vec<String> = desired_elements(&state).into_iter().map(|d| d.value).collect();
        assert_eq!(values, vec!["192.0.2.0/24", "198.51.100.0/24", "2001:db8::/32"]);
    }

    #[tokio::test]
    async fn test_update_script_failure_is_error() {
        let mut mock = MockCommandExecutor::new();
        expect_listing(&mut mock, ok(LISTED_V4), ok(LISTED_V6_EMPTY));
        mock.expect_execute_with_stdin().returning(|_, _, _| {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: "Error: Could not process rule".to_string(),
                success: false,
                code: Some(1),
            })
        });

        let reconciler =
            NftablesReconciler::with_executor(mock, "banwarden", "banned_v4", "banned_v6");
        let err = reconciler.update(&State::default()).await.unwrap_err();
        assert!(err.to_string().contains("Could not process rule"));
    }
}
