use crate::error::{ConflictKind, Result, StakeError};
use crate::types::{Assignment, ClaimantId, Lease, LeaseWrite, Resource};

/// Rows a store reads for one resource key before deciding a write.
///
/// Every backend loads these inside its own transaction and hands them to
/// [`ConflictEngine`], so the rules live in one place and stay pure.
#[derive(Debug, Clone, Copy)]
pub struct KeyView<'a> {
    pub key: &'a str,
    pub resource: Option<&'a Resource>,
    pub assignment: Option<&'a Assignment>,
    /// The lease row for the key, live or not
    pub lease: Option<&'a Lease>,
}

impl<'a> KeyView<'a> {
    fn require_active(&self) -> Result<&'a Resource> {
        match self.resource {
            None => Err(StakeError::NotFound(self.key.to_string())),
            Some(r) if !r.is_active => Err(StakeError::Unavailable(self.key.to_string())),
            Some(r) => Ok(r),
        }
    }

    fn live_lease(&self, now: u64) -> Option<&'a Lease> {
        self.lease.filter(|l| l.is_live(now))
    }
}

/// Pure decision functions for the lease and commit protocol.
pub struct ConflictEngine;

impl ConflictEngine {
    /// Decides an acquire (or renewal) of `view.key` by `holder_token`.
    ///
    /// Returns the lease row the store must write. A live lease under a
    /// different token rejects the request and must be left untouched.
    pub fn decide_acquire(
        view: &KeyView<'_>,
        holder_token: &str,
        ttl: u64,
        now: u64,
    ) -> Result<LeaseWrite> {
        view.require_active()?;

        if view.assignment.is_some() {
            return Err(StakeError::conflict(view.key, ConflictKind::AlreadyAssigned));
        }

        match view.live_lease(now) {
            Some(existing) if existing.holder_token == holder_token => {
                Ok(LeaseWrite::Renewed(existing.renewed(ttl, now)))
            }
            Some(_) => Err(StakeError::conflict(view.key, ConflictKind::ReservedByOther)),
            None => Ok(LeaseWrite::Acquired(Lease::new(
                view.key.to_string(),
                holder_token.to_string(),
                ttl,
                now,
            ))),
        }
    }

    /// Validates a commit of `view.key` by `holder_token` for `claimant`.
    ///
    /// `claimant_holder` is any existing assignment for the same claimant.
    pub fn check_commit(
        view: &KeyView<'_>,
        holder_token: &str,
        claimant: ClaimantId,
        claimant_holder: Option<&Assignment>,
        now: u64,
    ) -> Result<()> {
        view.require_active()?;

        if view.assignment.is_some() {
            return Err(StakeError::conflict(view.key, ConflictKind::AlreadyAssigned));
        }

        if !view.live_lease(now).is_some_and(|l| l.holder_token == holder_token) {
            return Err(StakeError::conflict(view.key, ConflictKind::ReservationMissing));
        }

        if claimant_holder.is_some_and(|a| a.claimant() == claimant) {
            return Err(StakeError::conflict(view.key, ConflictKind::DuplicateClaimant));
        }

        Ok(())
    }

    /// True if a release by `holder_token` should delete the lease row.
    pub fn should_release(lease: Option<&Lease>, holder_token: &str, now: u64) -> bool {
        lease.is_some_and(|l| l.is_held_by(holder_token, now))
    }
}
