//! JSON request and response bodies for the HTTP surface.
//!
//! Shared by the server and the claimant-side client so both ends agree on
//! field names. Request fields are snake_case with camelCase aliases.

use serde::{Deserialize, Serialize};

use crate::config::StakeConfig;
use crate::error::StakeError;
use crate::state::ResourceStatus;
use crate::types::{Assignment, ClaimantForm, Lease};

// ─── Requests ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusQuery {
    #[serde(default, rename = "holderToken", alias = "holder_token")]
    pub holder_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireRequest {
    #[serde(alias = "resourceKey")]
    pub resource_key: String,
    #[serde(default, alias = "holderToken")]
    pub holder_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    #[serde(alias = "resourceKey")]
    pub resource_key: String,
    #[serde(default, alias = "holderToken")]
    pub holder_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    #[serde(alias = "resourceKey")]
    pub resource_key: String,
    #[serde(default, alias = "holderToken")]
    pub holder_token: Option<String>,
    #[serde(default, alias = "claimantPayload")]
    pub claimant_payload: ClaimantForm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub name: String,
    #[serde(default = "default_true", alias = "isActive")]
    pub is_active: bool,
    #[serde(default, alias = "sortOrder")]
    pub sort_order: i64,
}

fn default_true() -> bool {
    true
}

// ─── Responses ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseGrant {
    pub resource_key: String,
    pub holder_token: String,
    pub expires_at: u64,
}

impl From<&Lease> for LeaseGrant {
    fn from(lease: &Lease) -> Self {
        Self {
            resource_key: lease.resource_key.clone(),
            holder_token: lease.holder_token.clone(),
            expires_at: lease.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub resources: Vec<ResourceStatus>,
    pub lease_ttl_seconds: u64,
    pub heartbeat_seconds: u64,
}

impl StatusReport {
    pub fn new(resources: Vec<ResourceStatus>, config: &StakeConfig) -> Self {
        Self {
            resources,
            lease_ttl_seconds: config.lease_ttl_ms / 1000,
            heartbeat_seconds: config.heartbeat_ms / 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAck {
    pub released: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub assignment: Assignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub resources: Vec<ResourceStatus>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub evicted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub live_leases: usize,
    pub version: String,
}

/// Envelope around every JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable machine code for failures (e.g. `RESERVED_BY_OTHER`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            reason: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
            reason: None,
        }
    }

    pub fn from_error(err: &StakeError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            reason: Some(err.code().to_string()),
        }
    }
}
