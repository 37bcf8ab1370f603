//! Remote IP set reconciler (web application firewall style API).
//!
//! Writes are guarded by a change token: one token per batched update.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::{desired_descriptors, diff, IpSetDescriptor, Reconciler};
use crate::config::SecureString;
use crate::state::State;

const TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateAction {
    Insert,
    Delete,
}

/// One element change in a batched update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSetUpdate {
    pub action: UpdateAction,
    #[serde(rename = "ip_set_descriptor")]
    pub descriptor: IpSetDescriptor,
}

/// Operations of the remote IP set service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IpSetApi: Send + Sync {
    async fn get_ip_set(&self, ip_set_id: &str) -> Result<Vec<IpSetDescriptor>>;

    async fn get_change_token(&self) -> Result<String>;

    async fn update_ip_set(
        &self,
        ip_set_id: &str,
        change_token: &str,
        updates: Vec<IpSetUpdate>,
    ) -> Result<()>;
}

#[derive(Deserialize)]
struct IpSetResponse {
    ip_set_descriptors: Vec<IpSetDescriptor>,
}

#[derive(Deserialize)]
struct ChangeTokenResponse {
    change_token: String,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    change_token: &'a str,
    updates: &'a [IpSetUpdate],
}

/// JSON-over-HTTPS client for the IP set service
pub struct HttpIpSetApi {
    client: Client,
    endpoint: String,
    region: String,
    token: SecureString,
}

impl HttpIpSetApi {
    pub fn new(endpoint: &str, region: &str, token: SecureString) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: region.to_string(),
            token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.endpoint, path))
            .header("X-Region", &self.region);
        if !self.token.is_empty() {
            request = request.bearer_auth(self.token.as_str());
        }
        request
    }
}

#[async_trait]
impl IpSetApi for HttpIpSetApi {
    async fn get_ip_set(&self, ip_set_id: &str) -> Result<Vec<IpSetDescriptor>> {
        let response: IpSetResponse = self
            .request(reqwest::Method::GET, &format!("/ip-sets/{}", ip_set_id))
            .send()
            .await
            .context("Failed to fetch ip set")?
            .error_for_status()
            .context("IP set service rejected get_ip_set")?
            .json()
            .await
            .context("Malformed get_ip_set response")?;
        Ok(response.ip_set_descriptors)
    }

    async fn get_change_token(&self) -> Result<String> {
        let response: ChangeTokenResponse = self
            .request(reqwest::Method::POST, "/change-token")
            .send()
            .await
            .context("Failed to fetch change token")?
            .error_for_status()
            .context("IP set service rejected get_change_token")?
            .json()
            .await
            .context("Malformed get_change_token response")?;
        Ok(response.change_token)
    }

    async fn update_ip_set(
        &self,
        ip_set_id: &str,
        change_token: &str,
        updates: Vec<IpSetUpdate>,
    ) -> Result<()> {
        self.request(reqwest::Method::POST, &format!("/ip-sets/{}/updates", ip_set_id))
            .json(&UpdateRequest {
                change_token,
                updates: &updates,
            })
            .send()
            .await
            .context("Failed to update ip set")?
            .error_for_status()
            .context("IP set service rejected update_ip_set")?;
        Ok(())
    }
}

/// Keeps one remote IP set equal to the living entries
pub struct IpSetReconciler<A: IpSetApi> {
    api: A,
    ip_set_id: String,
}

impl<A: IpSetApi> IpSetReconciler<A> {
    pub fn new(api: A, ip_set_id: &str) -> Self {
        Self {
            api,
            ip_set_id: ip_set_id.to_string(),
        }
    }
}

#[async_trait]
impl<A: IpSetApi> Reconciler for IpSetReconciler<A> {
    fn description(&self) -> String {
        "Update ip_set for Web ACL".to_string()
    }

    async fn update(&self, state: &State) -> Result<bool> {
        let desired = desired_descriptors(state);
        let current: BTreeSet<IpSetDescriptor> =
            self.api.get_ip_set(&self.ip_set_id).await?.into_iter().collect();

        let delta = diff(&desired, &current);
        if delta.is_empty() {
            debug!("IP set {} already in sync", self.ip_set_id);
            return Ok(false);
        }

        let updates: Vec<IpSetUpdate> = delta
            .insert
            .into_iter()
            .map(|descriptor| IpSetUpdate {
                action: UpdateAction::Insert,
                descriptor,
            })
            .chain(delta.delete.into_iter().map(|descriptor| IpSetUpdate {
                action: UpdateAction::Delete,
                descriptor,
            }))
            .collect();

        let change_token = self.api.get_change_token().await?;
        let count = updates.len();
        self.api
            .update_ip_set(&self.ip_set_id, &change_token, updates)
            .await?;

        info!("Applied {} updates to ip set {}", count, self.ip_set_id);
        Ok(true)
    }
}
