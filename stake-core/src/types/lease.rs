use serde::{Deserialize, Serialize};

/// A time-bound exclusive hold on a resource.
///
/// At most one row exists per resource key. A lease whose `expires_at` is at
/// or before the current time is treated as absent by every read and may be
/// overwritten by any write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// The guarded resource
    pub resource_key: String,
    /// Opaque token proving ownership across renewals
    pub holder_token: String,
    /// When the lease was first acquired under this token
    pub acquired_at: u64,
    /// Time-to-live in milliseconds
    pub ttl: u64,
    /// When the lease stops being live (last renewal + ttl)
    pub expires_at: u64,
    /// Last acquire or renewal timestamp
    pub renewed_at: u64,
}

impl Lease {
    pub fn new(resource_key: String, holder_token: String, ttl: u64, now: u64) -> Self {
        Self {
            resource_key,
            holder_token,
            acquired_at: now,
            ttl,
            expires_at: now.saturating_add(ttl),
            renewed_at: now,
        }
    }

    pub fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }

    pub fn is_held_by(&self, holder_token: &str, now: u64) -> bool {
        self.is_live(now) && self.holder_token == holder_token
    }

    /// Extends the lease from `now`, keeping the original acquisition time.
    pub fn renewed(&self, ttl: u64, now: u64) -> Self {
        Self {
            resource_key: self.resource_key.clone(),
            holder_token: self.holder_token.clone(),
            acquired_at: self.acquired_at,
            ttl,
            expires_at: now.saturating_add(ttl),
            renewed_at: now,
        }
    }
}

/// Outcome of a conditional lease write in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseWrite {
    /// No live lease existed; a new one was written
    Acquired(Lease),
    /// A live lease under the same token was extended
    Renewed(Lease),
}

impl LeaseWrite {
    pub fn lease(&self) -> &Lease {
        match self {
            LeaseWrite::Acquired(lease) | LeaseWrite::Renewed(lease) => lease,
        }
    }

    pub fn into_lease(self) -> Lease {
        match self {
            LeaseWrite::Acquired(lease) | LeaseWrite::Renewed(lease) => lease,
        }
    }

    pub fn is_renewal(&self) -> bool {
        matches!(self, LeaseWrite::Renewed(_))
    }
}
