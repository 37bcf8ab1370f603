//! Sweep command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::workflow::Workflow;

/// Expire due entries, persist and reconcile (suitable for a timer)
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let workflow = Workflow::from_config(&config)?;

    let result = workflow.sweep().await?;
    println!("{}", result.trim_end());

    Ok(())
}
