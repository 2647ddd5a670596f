use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Assignment, Lease, Resource};

/// Everything the projector needs, read from the store in one pass.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub resources: Vec<Resource>,
    pub assignments: Vec<Assignment>,
    /// Leases already filtered to the live ones
    pub live_leases: Vec<Lease>,
}

/// Externally visible state of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Inactive,
    Assigned,
    LeasedByCaller,
    LeasedByOther,
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedBy {
    pub assignment_id: String,
    pub course_group: u8,
    pub team_number: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub key: String,
    pub name: String,
    pub is_active: bool,
    pub is_assigned: bool,
    pub assigned_by: Option<AssignedBy>,
    pub is_leased: bool,
    pub leased_by_caller: bool,
    pub status: ResourceState,
}

pub struct StatusProjector;

impl StatusProjector {
    /// Projects the status of every resource for `caller_token`.
    ///
    /// Precedence: assigned, then leased, then free or inactive. Without a
    /// caller token every live lease is reported as held by someone else.
    pub fn project(
        snapshot: &StateSnapshot,
        caller_token: Option<&str>,
        now: u64,
    ) -> Vec<ResourceStatus> {
        let assigned: HashMap<&str, &Assignment> = snapshot
            .assignments
            .iter()
            .map(|a| (a.resource_key.as_str(), a))
            .collect();
        let leased: HashMap<&str, &Lease> = snapshot
            .live_leases
            .iter()
            .filter(|l| l.is_live(now))
            .map(|l| (l.resource_key.as_str(), l))
            .collect();

        let mut resources: Vec<&Resource> = snapshot.resources.iter().collect();
        resources.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.key.cmp(&b.key)));

        resources
            .into_iter()
            .map(|resource| {
                let assignment = assigned.get(resource.key.as_str()).copied();
                let lease = leased.get(resource.key.as_str()).copied();
                let by_caller = match (lease, caller_token) {
                    (Some(l), Some(token)) => l.holder_token == token,
                    _ => false,
                };

                let status = if assignment.is_some() {
                    ResourceState::Assigned
                } else if lease.is_some() {
                    if by_caller {
                        ResourceState::LeasedByCaller
                    } else {
                        ResourceState::LeasedByOther
                    }
                } else if resource.is_active {
                    ResourceState::Free
                } else {
                    ResourceState::Inactive
                };

                ResourceStatus {
                    key: resource.key.clone(),
                    name: resource.name.clone(),
                    is_active: resource.is_active,
                    is_assigned: assignment.is_some(),
                    assigned_by: assignment.map(|a| AssignedBy {
                        assignment_id: a.id.clone(),
                        course_group: a.payload.claimant.course_group,
                        team_number: a.payload.claimant.team_number,
                    }),
                    is_leased: assignment.is_none() && lease.is_some(),
                    leased_by_caller: assignment.is_none() && by_caller,
                    status,
                }
            })
            .collect()
    }
}
