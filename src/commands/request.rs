//! Request command implementation.

use anyhow::Result;
use std::path::Path;

use crate::approval::{ApprovalHandler, SlashRequest};
use crate::config::Config;

/// Print the approval request (or error) message for a slash command
pub async fn run(user_id: &str, text: &str, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let handler = ApprovalHandler::from_config(&config)?;

    let response = handler.handle_request(&SlashRequest {
        user_id: user_id.to_string(),
        text: text.to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
