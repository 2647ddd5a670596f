use crate::error::Result;
use crate::state::StateSnapshot;
use crate::types::{Assignment, ClaimantPayload, Lease, LeaseWrite, Resource};

/// Defines the contract for coordination storage backends.
///
/// A backend holds the resource registry, the assignment ledger and the lease
/// table. Every mutating method is one atomic operation against the backing
/// store: it either applies completely or not at all. Rows whose expiry is at
/// or before `now` are never reported as live and may be overwritten.
pub trait CoordinationStore: Send + Sync {
    /// Insert or update a registry entry
    fn put_resource(&self, resource: &Resource) -> Result<()>;

    /// All registry entries, in no particular order
    fn list_resources(&self) -> Result<Vec<Resource>>;

    /// Conditional write of a lease for `key` under `holder_token`
    fn acquire(&self, key: &str, holder_token: &str, ttl: u64, now: u64) -> Result<LeaseWrite>;

    /// Delete the lease for `key` if it is live and held by `holder_token`
    fn release(&self, key: &str, holder_token: &str, now: u64) -> Result<bool>;

    /// Promote a live matching lease into an assignment, in one transaction
    fn commit(
        &self,
        key: &str,
        holder_token: &str,
        payload: &ClaimantPayload,
        now: u64,
    ) -> Result<Assignment>;

    /// The live lease for `key`, if any
    fn live_lease(&self, key: &str, now: u64) -> Result<Option<Lease>>;

    /// Resources, assignments and live leases, after purging expired rows
    fn snapshot(&self, now: u64) -> Result<StateSnapshot>;

    /// Assignments ordered by creation time
    fn list_assignments(&self) -> Result<Vec<Assignment>>;

    /// Remove an assignment, freeing its resource
    fn delete_assignment(&self, id: &str) -> Result<bool>;

    /// Purge expired lease rows; returns how many were removed
    fn evict_expired(&self, now: u64) -> Result<usize>;
}
