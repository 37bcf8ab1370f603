//! Two-step chat approval: a slash command produces an approval request,
//! a button click on it approves, rejects or cancels.
//!
//! The request message embeds the canonical command in a code block, so no
//! pending request is stored anywhere. Every handler returns a terminal
//! [`Response`]; failures become an ephemeral error message.

mod authorizer;
mod message;

pub use authorizer::{AllowAll, Authorizer, MemberAuthorizer};
pub use message::{
    ActionButton, Attachment, Decision, IdRef, InteractionPayload, OriginalMessage, PayloadAction,
    Response, ResponseType, SlashRequest, Team, CALLBACK_ID,
};

use tracing::{info, warn};

use crate::command::{self, Command};
use crate::config::Config;
use crate::error::BanResult;
use crate::workflow::Workflow;

const DEFAULT_REQUEST_TEXT: &str = "*Approval Request*";

pub struct ApprovalHandler {
    workflow: Workflow,
    authorizer: Box<dyn Authorizer>,
    request_text: String,
}

impl ApprovalHandler {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            authorizer: Box::new(AllowAll),
            request_text: DEFAULT_REQUEST_TEXT.to_string(),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Box<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_request_text(mut self, request_text: &str) -> Self {
        self.request_text = request_text.to_string();
        self
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(Workflow::from_config(config)?)
            .with_authorizer(Box::new(MemberAuthorizer::from_config(&config.approval)))
            .with_request_text(&config.approval.request_text))
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Turn a slash command into an approval request (or an error message)
    pub fn handle_request(&self, request: &SlashRequest) -> Response {
        match self.build_request(request) {
            Ok(response) => response,
            Err(e) => {
                warn!("Rejected request from {}: {}", request.user_id, e);
                Response::error(&e)
            }
        }
    }

    fn build_request(&self, request: &SlashRequest) -> BanResult<Response> {
        self.authorizer.authorize_requester(&request.user_id)?;
        let command = command::parse(&request.text)?;

        info!(
            "Approval requested by {}: {} {}",
            request.user_id,
            command.action(),
            command.cidr_blocks().join(",")
        );

        let text = format!(
            "<@{}> wants to *{} CIDRs* under the following conditions:\n{}",
            request.user_id,
            command.action(),
            command.to_code_block()
        );
        let fallback = format!(
            "{} {} (approval required)",
            command.action(),
            command.cidr_blocks().join(",")
        );

        Ok(Response {
            response_type: ResponseType::InChannel,
            replace_original: None,
            text,
            attachments: vec![Attachment::approval_buttons(&self.request_text, fallback)],
        })
    }

    /// Handle a button click on an approval request
    pub async fn handle_interaction(&self, payload: &InteractionPayload) -> Response {
        match self.respond(payload).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Interaction from {} failed: {}", payload.user_id(), e);
                Response::error(&e)
            }
        }
    }

    async fn respond(&self, payload: &InteractionPayload) -> BanResult<Response> {
        let decision = payload.decision()?;
        self.authorizer
            .authorize_responder(decision, payload.user_id())?;

        let outcome = match decision {
            Decision::Approve => {
                let command = Command::from_original_message(&payload.original_message.text)?;
                let result = self
                    .workflow
                    .execute(&command, &payload.message_link())
                    .await?;
                Some(result)
            }
            Decision::Reject | Decision::Cancel => None,
        };

        info!(
            "Request {} by {} ({})",
            decision.past_tense(),
            payload.user_id(),
            payload.message_link()
        );
        Ok(render_decision(payload, decision, outcome))
    }
}

/// Replace the request with its original text, who decided, and the result
fn render_decision(
    payload: &InteractionPayload,
    decision: Decision,
    outcome: Option<String>,
) -> Response {
    let text = format!(
        "{}\n*<@{}> {} this request.*",
        payload.original_message.text.trim_end(),
        payload.user_id(),
        decision.past_tense()
    );

    let attachments = outcome
        .map(|result| Attachment {
            text: format!("```\n{}\n```", result.trim_end()),
            color: Some("good".to_string()),
            ..Default::default()
        })
        .into_iter()
        .collect();

    Response {
        response_type: ResponseType::InChannel,
        replace_original: Some(true),
        text,
        attachments,
    }
}
