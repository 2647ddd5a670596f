use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use stake_core::api::{
    AcquireRequest, ApiResponse, CommitReceipt, CommitRequest, LeaseGrant, ReleaseAck,
    ReleaseRequest, StatusReport,
};
use stake_core::coordinator::Coordinator;
use stake_core::types::{Assignment, ClaimantForm};

use crate::error::{ClientError, Result};

/// The four protocol calls a claimant makes.
#[async_trait]
pub trait LeaseApi: Send + Sync {
    async fn acquire(&self, resource_key: &str, holder_token: Option<&str>) -> Result<LeaseGrant>;
    async fn release(&self, resource_key: &str, holder_token: &str) -> Result<bool>;
    async fn commit(
        &self,
        resource_key: &str,
        holder_token: &str,
        form: &ClaimantForm,
    ) -> Result<Assignment>;
    async fn statuses(&self, holder_token: Option<&str>) -> Result<StatusReport>;
}

// ─── HTTP ───────────────────────────────────────────────────────────────────

/// Default per-request deadline, well below the default heartbeat.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`LeaseApi`] over the JSON HTTP surface of `stake serve`.
#[derive(Debug, Clone)]
pub struct HttpLeaseApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLeaseApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request fails with a transport error once `timeout` elapses.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Unwraps the `{success, data, error, reason}` envelope.
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(_) => {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                reason: None,
                message: body,
            })
        }
    };

    match envelope.data {
        Some(data) if envelope.success && status.is_success() => Ok(data),
        _ => Err(ClientError::Rejected {
            status: status.as_u16(),
            reason: envelope.reason,
            message: envelope.error.unwrap_or_else(|| status.to_string()),
        }),
    }
}

#[async_trait]
impl LeaseApi for HttpLeaseApi {
    async fn acquire(&self, resource_key: &str, holder_token: Option<&str>) -> Result<LeaseGrant> {
        let body = AcquireRequest {
            resource_key: resource_key.to_string(),
            holder_token: holder_token.map(str::to_string),
        };
        let response = self.client.post(self.url("/leases")).json(&body).send().await?;
        read_envelope(response).await
    }

    async fn release(&self, resource_key: &str, holder_token: &str) -> Result<bool> {
        let body = ReleaseRequest {
            resource_key: resource_key.to_string(),
            holder_token: Some(holder_token.to_string()),
        };
        let response = self.client.delete(self.url("/leases")).json(&body).send().await?;
        let ack: ReleaseAck = read_envelope(response).await?;
        Ok(ack.released)
    }

    async fn commit(
        &self,
        resource_key: &str,
        holder_token: &str,
        form: &ClaimantForm,
    ) -> Result<Assignment> {
        let body = CommitRequest {
            resource_key: resource_key.to_string(),
            holder_token: Some(holder_token.to_string()),
            claimant_payload: form.clone(),
        };
        let response = self
            .client
            .post(self.url("/assignments"))
            .json(&body)
            .send()
            .await?;
        let receipt: CommitReceipt = read_envelope(response).await?;
        Ok(receipt.assignment)
    }

    async fn statuses(&self, holder_token: Option<&str>) -> Result<StatusReport> {
        let mut request = self.client.get(self.url("/resources"));
        if let Some(token) = holder_token {
            request = request.query(&[("holderToken", token)]);
        }
        read_envelope(request.send().await?).await
    }
}

// ─── In-process ─────────────────────────────────────────────────────────────

/// [`LeaseApi`] that calls a [`Coordinator`] directly, for embedding the
/// protocol in one process.
#[derive(Clone)]
pub struct CoordinatorApi {
    coordinator: Arc<Coordinator>,
}

impl CoordinatorApi {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}

#[async_trait]
impl LeaseApi for CoordinatorApi {
    async fn acquire(&self, resource_key: &str, holder_token: Option<&str>) -> Result<LeaseGrant> {
        let lease = self.coordinator.acquire(resource_key, holder_token)?;
        Ok(LeaseGrant::from(&lease))
    }

    async fn release(&self, resource_key: &str, holder_token: &str) -> Result<bool> {
        Ok(self.coordinator.release(resource_key, holder_token)?)
    }

    async fn commit(
        &self,
        resource_key: &str,
        holder_token: &str,
        form: &ClaimantForm,
    ) -> Result<Assignment> {
        Ok(self.coordinator.commit(resource_key, Some(holder_token), form)?)
    }

    async fn statuses(&self, holder_token: Option<&str>) -> Result<StatusReport> {
        Ok(self.coordinator.status_report(holder_token)?)
    }
}
