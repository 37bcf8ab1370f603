//! # banwarden - CIDR ban list with chat approval and firewall sync
//!
//! Keeps a persisted list of banned CIDR blocks. Operators request bans or
//! expiries through a chat slash command; an approver confirms with a button
//! click, the command runs against the ban list, and every configured
//! firewall rule-set is brought in line with the currently banned blocks.
//!
//! ## Features
//!
//! - **Escalating bans** - Repeat offenders are banned longer (1, 2, 3, 7, 14, 30 days)
//! - **Lazy expiry** - Timed-out bans are expired on the next command or `sweep`
//! - **Stateless approval** - The pending command lives in the request message itself
//! - **Minimal sync** - Reconcilers only insert/delete the difference
//! - **Audit trail** - Every ban/expire is recorded with a link to its approval
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        banwarden                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: shell, exec, show, sweep, request, respond │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Approval (slash command -> request -> approve/reject)      │
//! │    └── Authorizer (allow-all or configured members)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Command grammar: (ban|expire) cidr,cidr [Nd]               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Workflow                                                   │
//! │    ├── State (staging + commit) / Entry (ban history)       │
//! │    ├── StateStore (JSON file, atomic writes)                │
//! │    └── Notifier (Slack chat.postMessage, webhook)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciler trait                                           │
//! │    ├── IpSetReconciler (remote IP set, change tokens)       │
//! │    └── NftablesReconciler (named sets via nft -f)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use banwarden::command::parse;
//! use banwarden::config::Config;
//! use banwarden::workflow::Workflow;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/banwarden/config.yaml")?;
//!     let workflow = Workflow::from_config(&config)?;
//!
//!     let command = parse("ban 192.0.2.1,198.51.100.0/24 3d")?;
//!     let result = workflow.execute(&command, &config.actor_link).await?;
//!     println!("{}", result);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`approval`] - Slash command and button interaction handlers
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Mockable external command execution
//! - [`command`] - Command grammar, validation and canonical form
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`entry`] - Per-block ban record and escalation policy
//! - [`error`] - Domain error taxonomy
//! - [`notifier`] - Change notifications
//! - [`reconciler`] - Firewall rule-set synchronization
//! - [`state`] - Ban list snapshot with commit protocol
//! - [`store`] - Ban list persistence
//! - [`validation`] - CIDR and duration validation
//! - [`workflow`] - Command execution pipeline

pub mod approval;
pub mod cli;
pub mod cmd_abstraction;
pub mod command;
pub mod commands;
pub mod config;
pub mod entry;
pub mod error;
pub mod notifier;
pub mod reconciler;
pub mod state;
pub mod store;
pub mod validation;
pub mod workflow;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{BanError, BanResult};
pub use state::State;
pub use workflow::Workflow;
