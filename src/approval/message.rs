//! Slack message payloads exchanged by the approval handlers.

use serde::{Deserialize, Serialize};

use crate::error::BanError;

pub const CALLBACK_ID: &str = "banwarden_approval_request";
const BUTTON_COLOR: &str = "#3AA3E3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    Ephemeral,
}

/// Message returned to Slack from a slash command or interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_original: Option<bool>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Response {
    /// Ephemeral error shown only to the acting user
    pub fn error(err: &BanError) -> Self {
        Self {
            response_type: ResponseType::Ephemeral,
            replace_original: Some(false),
            text: format!("An error occurred: {}", err),
            attachments: Vec::new(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionButton>,
}

impl Attachment {
    /// Attachment carrying the approve / reject / cancel buttons
    pub fn approval_buttons(text: &str, fallback: String) -> Self {
        Self {
            text: text.to_string(),
            fallback: Some(fallback),
            callback_id: Some(CALLBACK_ID.to_string()),
            color: Some(BUTTON_COLOR.to_string()),
            attachment_type: Some("default".to_string()),
            actions: vec![
                ActionButton::new(Decision::Approve, Some("primary")),
                ActionButton::new(Decision::Reject, Some("danger")),
                ActionButton::new(Decision::Cancel, None),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ActionButton {
    fn new(decision: Decision, style: Option<&str>) -> Self {
        Self {
            name: decision.as_str().to_string(),
            text: decision.label().to_string(),
            kind: "button".to_string(),
            value: decision.as_str().to_string(),
            style: style.map(str::to_string),
        }
    }
}

/// Responder's choice on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Cancel,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
            Decision::Cancel => "cancel",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Decision::Approve => "Approve",
            Decision::Reject => "Reject",
            Decision::Cancel => "Cancel",
        }
    }

    /// Past tense used in the acknowledgement line
    pub fn past_tense(&self) -> &'static str {
        match self {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
            Decision::Cancel => "cancelled",
        }
    }

    fn from_value(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Decision::Approve),
            "reject" => Some(Decision::Reject),
            "cancel" => Some(Decision::Cancel),
            _ => None,
        }
    }
}

/// Slash command invocation (`/ban <text>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRequest {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PayloadAction {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub id: String,
    pub domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OriginalMessage {
    pub text: String,
}

/// Button click on an approval request, as posted by Slack
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InteractionPayload {
    pub actions: Vec<PayloadAction>,
    #[serde(default)]
    pub callback_id: String,
    pub team: Team,
    pub channel: IdRef,
    pub user: IdRef,
    pub message_ts: String,
    pub original_message: OriginalMessage,
}

impl InteractionPayload {
    pub fn from_json(json: &str) -> Result<Self, BanError> {
        serde_json::from_str(json)
            .map_err(|e| BanError::Syntax(format!("malformed interaction payload: {}", e)))
    }

    /// Decision carried by the first clicked button
    pub fn decision(&self) -> Result<Decision, BanError> {
        let action = self
            .actions
            .first()
            .ok_or_else(|| BanError::Syntax("interaction has no action".to_string()))?;
        let value = action.value.as_deref().unwrap_or(&action.name);
        Decision::from_value(value)
            .ok_or_else(|| BanError::InvalidAction(format!("unknown decision: {}", value)))
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Permalink to the approval request message
    pub fn message_link(&self) -> String {
        format!(
            "https://{}.slack.com/archives/{}/p{}",
            self.team.domain,
            self.channel.id,
            self.message_ts.replace('.', "")
        )
    }
}
