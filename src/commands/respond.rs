//! Respond command implementation.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use crate::approval::{ApprovalHandler, InteractionPayload, Response};
use crate::config::Config;

/// Feed an interaction payload through the approval handler
pub async fn run(payload_path: &Path, config_path: &Path) -> Result<()> {
    let json = read_payload(payload_path)?;

    let config = Config::load_or_default(config_path)?;
    let handler = ApprovalHandler::from_config(&config)?;

    let response = match InteractionPayload::from_json(&json) {
        Ok(payload) => handler.handle_interaction(&payload).await,
        Err(e) => Response::error(&e),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

/// Read the payload file, `-` meaning stdin
fn read_payload(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut json = String::new();
        std::io::stdin()
            .read_to_string(&mut json)
            .context("Failed to read payload from stdin")?;
        return Ok(json);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read payload: {:?}", path))
}
