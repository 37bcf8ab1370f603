//! Command execution: load, sweep, mutate, commit, persist, notify, reconcile.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::Config;
use crate::entry::{self, Action, Change, Escalation};
use crate::error::{BanError, BanResult};
use crate::notifier::{create_notifier, Notifier};
use crate::reconciler::{create_reconcilers, Reconciler};
use crate::state::State;
use crate::store::{FileStateStore, StateStore};

/// Summary line used when a command committed nothing
pub const NO_CHANGE: &str = "State has not changed.\n";

/// Executes commands against the persisted ban list and keeps the
/// configured rule-sets in sync.
pub struct Workflow {
    store: Box<dyn StateStore>,
    reconcilers: Vec<Box<dyn Reconciler>>,
    notifier: Option<Box<dyn Notifier>>,
    escalation: Arc<dyn Escalation>,
}

impl Workflow {
    pub fn new(store: Box<dyn StateStore>) -> Self {
        Self {
            store,
            reconcilers: Vec::new(),
            notifier: None,
            escalation: Arc::new(entry::DefaultEscalation),
        }
    }

    pub fn with_reconcilers(mut self, reconcilers: Vec<Box<dyn Reconciler>>) -> Self {
        self.reconcilers = reconcilers;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_escalation(mut self, escalation: Arc<dyn Escalation>) -> Self {
        self.escalation = escalation;
        self
    }

    /// Wire store, reconcilers, notifier and escalation from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut workflow = Self::new(Box::new(FileStateStore::new(&config.store.path)))
            .with_reconcilers(create_reconcilers(config)?)
            .with_escalation(config.escalation());
        if let Some(notifier) = create_notifier(config)? {
            workflow = workflow.with_notifier(notifier);
        }
        Ok(workflow)
    }

    /// Load the persisted state with this workflow's escalation policy
    pub async fn load_state(&self) -> BanResult<State> {
        let state = self
            .store
            .fetch_state()
            .await
            .map_err(|e| BanError::Storage(format!("{:#}", e)))?;
        Ok(state.with_escalation(Arc::clone(&self.escalation)))
    }

    /// Run one command and return the plain-text result summary.
    ///
    /// Expired bans are swept and committed before the command's own
    /// operations. Persisting happens only when something changed; if it
    /// fails no reconciler runs.
    pub async fn execute(&self, command: &Command, actor_link: &str) -> BanResult<String> {
        let mut state = self.load_state().await?;
        let now = entry::now();

        let mut changes = sweep_and_commit(&mut state, now);

        match command.action() {
            Action::Ban => {
                for cidr_block in command.cidr_blocks() {
                    state.ban(cidr_block, actor_link, command.expire_in(), now);
                }
            }
            Action::Expire => {
                for cidr_block in command.cidr_blocks() {
                    state.expire(cidr_block, Some(actor_link), now);
                }
            }
        }
        state.commit();
        changes.extend(state.change_log().iter().cloned());

        info!(
            "Executed {} on {} block(s): {} change(s)",
            command.action(),
            command.cidr_blocks().len(),
            changes.len()
        );

        self.finish(&state, &changes, command.action()).await
    }

    /// Expire every entry whose ban ran out, then persist and reconcile
    pub async fn sweep(&self) -> BanResult<String> {
        let mut state = self.load_state().await?;
        let changes = sweep_and_commit(&mut state, entry::now());
        info!("Sweep expired {} entr(ies)", changes.len());
        self.finish(&state, &changes, Action::Expire).await
    }

    async fn finish(&self, state: &State, changes: &[Change], action: Action) -> BanResult<String> {
        let summary = if changes.is_empty() {
            NO_CHANGE.to_string()
        } else {
            self.store
                .upload(state)
                .await
                .map_err(|e| BanError::Storage(format!("{:#}", e)))?;
            self.notify(&render_changes(changes, true)).await;
            format!("{}\n", render_changes(changes, false))
        };

        let mut lines = Vec::with_capacity(self.reconcilers.len());
        for reconciler in &self.reconcilers {
            lines.push(reconcile(reconciler.as_ref(), state, action).await);
        }

        Ok(summary + &lines.join("\n"))
    }

    async fn notify(&self, text: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.post_message(text).await {
            warn!("{}", BanError::Notify(format!("{:#}", e)));
        }
    }
}

fn sweep_and_commit(state: &mut State, now: chrono::DateTime<chrono::Utc>) -> Vec<Change> {
    if !state.sweep(now) {
        return Vec::new();
    }
    state.commit();
    debug!("Swept {} expired entr(ies)", state.change_log().len());
    state.change_log().to_vec()
}

fn render_changes(changes: &[Change], decorate: bool) -> String {
    changes
        .iter()
        .map(|c| c.render(decorate))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One result line; failures are contained here
async fn reconcile(reconciler: &dyn Reconciler, state: &State, action: Action) -> String {
    let description = reconciler.description();
    match reconciler.update(state).await {
        Ok(true) => format!("{} ({}): Succeeded", description, action),
        Ok(false) => format!("{} ({}): No change", description, action),
        Err(e) => {
            let err = BanError::Reconcile(format!("{:#}", e));
            warn!("{}: {}", description, err);
            format!("{} ({}): Failed ({:#})", description, action, e)
        }
    }
}
