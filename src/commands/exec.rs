//! Exec command implementation.

use anyhow::Result;
use std::path::Path;

use crate::command;
use crate::config::Config;
use crate::workflow::Workflow;

/// Parse and execute one command without going through approval
pub async fn run(text: &str, actor_link: Option<&str>, config_path: &Path) -> Result<()> {
    let command = command::parse(text)?;

    let config = Config::load_or_default(config_path)?;
    let workflow = Workflow::from_config(&config)?;
    let actor_link = actor_link.unwrap_or(&config.actor_link);

    let result = workflow.execute(&command, actor_link).await?;
    println!("{}", result.trim_end());

    Ok(())
}
