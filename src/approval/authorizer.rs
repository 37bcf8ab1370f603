//! Who may request and respond to ban requests.

use tracing::warn;

use super::message::Decision;
use crate::config::ApprovalConfig;
use crate::error::{BanError, BanResult};

/// Authorization policy for the approval workflow; permits everyone by default.
pub trait Authorizer: Send + Sync {
    fn authorize_requester(&self, _user_id: &str) -> BanResult<()> {
        Ok(())
    }

    fn authorize_responder(&self, _decision: Decision, _user_id: &str) -> BanResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {}

/// Allow-lists from configuration; an empty list permits everyone.
///
/// Approve and reject need an approver. Cancel is also open to requesters.
#[derive(Debug, Clone, Default)]
pub struct MemberAuthorizer {
    requesters: Vec<String>,
    approvers: Vec<String>,
}

impl MemberAuthorizer {
    pub fn new(requesters: Vec<String>, approvers: Vec<String>) -> Self {
        Self {
            requesters,
            approvers,
        }
    }

    pub fn from_config(config: &ApprovalConfig) -> Self {
        Self::new(config.requesters.clone(), config.approvers.clone())
    }
}

fn member(list: &[String], user_id: &str) -> bool {
    list.is_empty() || list.iter().any(|u| u == user_id)
}

fn denied(user_id: &str, what: &str) -> BanError {
    warn!("Denied {} for user {}", what, user_id);
    BanError::NotAuthorized(format!("<@{}> is not allowed to {}", user_id, what))
}

impl Authorizer for MemberAuthorizer {
    fn authorize_requester(&self, user_id: &str) -> BanResult<()> {
        if member(&self.requesters, user_id) {
            Ok(())
        } else {
            Err(denied(user_id, "request bans"))
        }
    }

    fn authorize_responder(&self, decision: Decision, user_id: &str) -> BanResult<()> {
        let allowed = match decision {
            Decision::Approve | Decision::Reject => member(&self.approvers, user_id),
            Decision::Cancel => {
                member(&self.approvers, user_id)
                    || (!self.requesters.is_empty() && member(&self.requesters, user_id))
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(denied(user_id, decision.as_str()))
        }
    }
}
