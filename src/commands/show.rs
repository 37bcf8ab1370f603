//! Show command implementation.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::state::State;
use crate::workflow::Workflow;

/// Print the persisted ban list as pretty JSON
pub async fn run(living_only: bool, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let workflow = Workflow::from_config(&config)?;

    let state = workflow.load_state().await?;
    println!("{}", render(&state, living_only)?);

    Ok(())
}

pub(crate) fn render(state: &State, living_only: bool) -> Result<String> {
    if !living_only {
        return Ok(state.to_json()?);
    }
    let living: BTreeMap<&str, _> = state
        .living_entries()
        .map(|e| (e.cidr_block(), e))
        .collect();
    Ok(serde_json::to_string_pretty(&living)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::now;
    use chrono::Duration;

    #[test]
    fn test_render_living_only() {
        let mut state = State::default();
        state.ban("192.0.2.1/32", "link", Some(Duration::days(1)), now());
        state.ban("192.0.2.2/32", "link", Some(Duration::days(1)), now());
        state.commit();
        state.expire("192.0.2.2/32", None, now());
        state.commit();

        let all: serde_json::Value = serde_json::from_str(&render(&state, false).unwrap()).unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);

        let living: serde_json::Value =
            serde_json::from_str(&render(&state, true).unwrap()).unwrap();
        let living = living.as_object().unwrap();
        assert_eq!(living.len(), 1);
        assert_eq!(living["192.0.2.1/32"]["ban_count"], 1);
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&State::default(), false).unwrap(), "{}");
    }
}
