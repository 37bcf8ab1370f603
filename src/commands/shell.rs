//! Interactive shell implementation.

use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::command;
use crate::config::Config;
use crate::workflow::Workflow;

const PROMPT: &str = "> ";

/// Run the interactive prompt on stdin/stdout until `exit` or EOF
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let workflow = Workflow::from_config(&config)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_with(&workflow, &config.actor_link, stdin.lock(), &mut stdout).await
}

/// Prompt loop over arbitrary input/output
pub async fn run_with<R: BufRead, W: Write>(
    workflow: &Workflow,
    actor_link: &str,
    mut input: R,
    output: &mut W,
) -> Result<()> {
    let mut line = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }

        match line.trim() {
            "" => continue,
            "exit" => return Ok(()),
            "help" => writeln!(output, "{}", command::help())?,
            "show state" => match workflow.load_state().await {
                Ok(state) => writeln!(output, "{}", state.to_json()?)?,
                Err(e) => writeln!(output, "{}", e)?,
            },
            text => {
                let result = match command::parse(text) {
                    Ok(command) => workflow.execute(&command, actor_link).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(summary) => writeln!(output, "{}", summary.trim_end())?,
                    Err(e) => writeln!(output, "{}", e)?,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStateStore;
    use std::io::Cursor;
    use tempfile::TempDir;

    async fn session(dir: &TempDir, script: &str) -> String {
        let workflow = Workflow::new(Box::new(FileStateStore::new(dir.path().join("state.json"))));
        let mut output = Vec::new();
        run_with(&workflow, "cli", Cursor::new(script.to_string()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_shell_ban_then_show() {
        let dir = TempDir::new().unwrap();
        let out = session(&dir, "ban 192.0.2.1 2d\nshow state\nexit\nban 192.0.2.2\n").await;

        assert!(out.starts_with("> 192.0.2.1/32 has been banned until "));
        assert!(out.contains("\"cidr_block\": \"192.0.2.1/32\""));
        assert!(!out.contains("192.0.2.2"));
    }

    #[tokio::test]
    async fn test_shell_reports_parse_errors_and_continues() {
        let dir = TempDir::new().unwrap();
        let out = session(&dir, "unban 192.0.2.1\nhelp\n").await;

        assert!(out.contains("permitted actions are: ban|expire"));
        assert!(out.contains(command::help()));
    }

    #[tokio::test]
    async fn test_shell_no_change() {
        let dir = TempDir::new().unwrap();
        let out = session(&dir, "expire 192.0.2.1\n").await;
        assert!(out.contains("State has not changed."));
    }

    #[tokio::test]
    async fn test_shell_exits_on_eof() {
        let dir = TempDir::new().unwrap();
        assert_eq!(session(&dir, "").await, "> \n");
    }
}
