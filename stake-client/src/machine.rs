//! Claimant-side lease lifecycle as an explicit state machine.
//!
//! The machine is pure: it never talks to the server. The driver asks it
//! what to send, performs the call, then reports the outcome back.

use serde::Serialize;
use stake_core::api::LeaseGrant;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HolderState {
    Unheld,
    Acquiring {
        resource_key: String,
        holder_token: Option<String>,
    },
    Held {
        grant: LeaseGrant,
    },
    Renewing {
        grant: LeaseGrant,
    },
    Committing {
        grant: LeaseGrant,
    },
    Committed {
        resource_key: String,
        assignment_id: String,
    },
    Lost {
        resource_key: String,
        reason: String,
    },
    Released {
        resource_key: Option<String>,
    },
}

impl HolderState {
    fn name(&self) -> &'static str {
        match self {
            HolderState::Unheld => "unheld",
            HolderState::Acquiring { .. } => "acquiring",
            HolderState::Held { .. } => "held",
            HolderState::Renewing { .. } => "renewing",
            HolderState::Committing { .. } => "committing",
            HolderState::Committed { .. } => "committed",
            HolderState::Lost { .. } => "lost",
            HolderState::Released { .. } => "released",
        }
    }

    /// The grant currently backing this state, if a lease is held.
    pub fn grant(&self) -> Option<&LeaseGrant> {
        match self {
            HolderState::Held { grant }
            | HolderState::Renewing { grant }
            | HolderState::Committing { grant } => Some(grant),
            _ => None,
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, HolderState::Held { .. })
    }
}

/// Holds the current [`HolderState`] and enforces legal transitions.
#[derive(Debug, Clone)]
pub struct HolderMachine {
    state: HolderState,
}

impl HolderMachine {
    pub fn new() -> Self {
        Self {
            state: HolderState::Unheld,
        }
    }

    pub fn state(&self) -> &HolderState {
        &self.state
    }

    /// Token of the held lease. Discarded once the lease is lost, committed or released.
    pub fn token(&self) -> Option<&str> {
        self.state.grant().map(|g| g.holder_token.as_str())
    }

    fn invalid(&self, action: &str) -> ClientError {
        ClientError::InvalidTransition(format!("cannot {} while {}", action, self.state.name()))
    }

    fn held_pair(grant: &LeaseGrant) -> (String, String) {
        (grant.resource_key.clone(), grant.holder_token.clone())
    }

    // ─── Acquire ────────────────────────────────────────────────────────────

    /// Select a resource. `holder_token` resumes a previously persisted lease.
    pub fn begin_acquire(&mut self, resource_key: &str, holder_token: Option<String>) -> Result<()> {
        match self.state {
            HolderState::Unheld | HolderState::Lost { .. } | HolderState::Released { .. } => {
                self.state = HolderState::Acquiring {
                    resource_key: resource_key.to_string(),
                    holder_token,
                };
                Ok(())
            }
            _ => Err(self.invalid("acquire")),
        }
    }

    pub fn acquired(&mut self, grant: LeaseGrant) -> Result<()> {
        match self.state {
            HolderState::Acquiring { .. } => {
                self.state = HolderState::Held { grant };
                Ok(())
            }
            _ => Err(self.invalid("complete acquire")),
        }
    }

    pub fn acquire_failed(&mut self) -> Result<()> {
        match self.state {
            HolderState::Acquiring { .. } => {
                self.state = HolderState::Unheld;
                Ok(())
            }
            _ => Err(self.invalid("fail acquire")),
        }
    }

    // ─── Renew ──────────────────────────────────────────────────────────────

    /// Returns the `(resource_key, holder_token)` to renew.
    pub fn begin_renew(&mut self) -> Result<(String, String)> {
        match &self.state {
            HolderState::Held { grant } => {
                let pair = Self::held_pair(grant);
                self.state = HolderState::Renewing {
                    grant: grant.clone(),
                };
                Ok(pair)
            }
            _ => Err(self.invalid("renew")),
        }
    }

    pub fn renewed(&mut self, grant: LeaseGrant) -> Result<()> {
        match self.state {
            HolderState::Renewing { .. } => {
                self.state = HolderState::Held { grant };
                Ok(())
            }
            _ => Err(self.invalid("complete renew")),
        }
    }

    /// Renewal got no answer. The lease stays valid until its expiry, so
    /// keep holding and try again on the next beat.
    pub fn renew_deferred(&mut self) -> Result<()> {
        match &self.state {
            HolderState::Renewing { grant } => {
                self.state = HolderState::Held {
                    grant: grant.clone(),
                };
                Ok(())
            }
            _ => Err(self.invalid("defer renew")),
        }
    }

    /// The server refused a renewal or commit on the lease. The token is discarded.
    pub fn lost(&mut self, reason: impl Into<String>) -> Result<()> {
        match &self.state {
            HolderState::Renewing { grant } | HolderState::Committing { grant } => {
                self.state = HolderState::Lost {
                    resource_key: grant.resource_key.clone(),
                    reason: reason.into(),
                };
                Ok(())
            }
            _ => Err(self.invalid("lose lease")),
        }
    }

    // ─── Commit ─────────────────────────────────────────────────────────────

    /// Returns the `(resource_key, holder_token)` to commit with.
    pub fn begin_commit(&mut self) -> Result<(String, String)> {
        match &self.state {
            HolderState::Held { grant } => {
                let pair = Self::held_pair(grant);
                self.state = HolderState::Committing {
                    grant: grant.clone(),
                };
                Ok(pair)
            }
            _ => Err(self.invalid("commit")),
        }
    }

    pub fn committed(&mut self, assignment_id: impl Into<String>) -> Result<()> {
        match &self.state {
            HolderState::Committing { grant } => {
                self.state = HolderState::Committed {
                    resource_key: grant.resource_key.clone(),
                    assignment_id: assignment_id.into(),
                };
                Ok(())
            }
            _ => Err(self.invalid("complete commit")),
        }
    }

    /// A recoverable commit failure: keep the lease and keep renewing.
    pub fn commit_failed(&mut self) -> Result<()> {
        match &self.state {
            HolderState::Committing { grant } => {
                self.state = HolderState::Held {
                    grant: grant.clone(),
                };
                Ok(())
            }
            _ => Err(self.invalid("fail commit")),
        }
    }

    // ─── Release ────────────────────────────────────────────────────────────

    /// Abandon the current lease. Returns the `(resource_key, holder_token)`
    /// the caller should release on the server, if a lease was held.
    pub fn release(&mut self) -> Result<Option<(String, String)>> {
        let (resource_key, pair) = match &self.state {
            HolderState::Committed { .. } => return Err(self.invalid("release")),
            HolderState::Held { grant }
            | HolderState::Renewing { grant }
            | HolderState::Committing { grant } => {
                (Some(grant.resource_key.clone()), Some(Self::held_pair(grant)))
            }
            HolderState::Acquiring { resource_key, .. }
            | HolderState::Lost { resource_key, .. } => (Some(resource_key.clone()), None),
            HolderState::Released { resource_key } => (resource_key.clone(), None),
            HolderState::Unheld => (None, None),
        };
        self.state = HolderState::Released { resource_key };
        Ok(pair)
    }
}

impl Default for HolderMachine {
    fn default() -> Self {
        Self::new()
    }
}
