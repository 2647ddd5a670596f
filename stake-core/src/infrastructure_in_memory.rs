use crate::conflict::{ConflictEngine, KeyView};
use crate::error::{Result, StakeError};
use crate::infrastructure::CoordinationStore;
use crate::state::StateSnapshot;
use crate::types::{Assignment, ClaimantPayload, Lease, LeaseWrite, Resource};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    // Resource key -> Resource
    resources: HashMap<String, Resource>,
    // Assignment ID -> Assignment
    assignments: HashMap<String, Assignment>,
    // Resource key -> Lease
    leases: HashMap<String, Lease>,
}

impl Tables {
    fn view<'a>(&'a self, key: &'a str) -> KeyView<'a> {
        KeyView {
            key,
            resource: self.resources.get(key),
            assignment: self.assignments.values().find(|a| a.resource_key == key),
            lease: self.leases.get(key),
        }
    }

    fn evict_expired(&mut self, now: u64) -> usize {
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.is_live(now));
        before - self.leases.len()
    }
}

/// Single-process store. The mutex stands in for the transaction isolation
/// a shared database would provide.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// A store pre-loaded with `resources`.
    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.lock() {
            for r in resources {
                tables.resources.insert(r.key.clone(), r);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StakeError::Store("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationStore for InMemoryStore {
    fn put_resource(&self, resource: &Resource) -> Result<()> {
        let mut tables = self.lock()?;
        tables.resources.insert(resource.key.clone(), resource.clone());
        Ok(())
    }

    fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(self.lock()?.resources.values().cloned().collect())
    }

    fn acquire(&self, key: &str, holder_token: &str, ttl: u64, now: u64) -> Result<LeaseWrite> {
        let mut tables = self.lock()?;
        let write = ConflictEngine::decide_acquire(&tables.view(key), holder_token, ttl, now)?;
        tables.leases.insert(key.to_string(), write.lease().clone());
        Ok(write)
    }

    fn release(&self, key: &str, holder_token: &str, now: u64) -> Result<bool> {
        let mut tables = self.lock()?;
        let released = ConflictEngine::should_release(tables.leases.get(key), holder_token, now);
        if released {
            tables.leases.remove(key);
        }
        tables.evict_expired(now);
        Ok(released)
    }

    fn commit(
        &self,
        key: &str,
        holder_token: &str,
        payload: &ClaimantPayload,
        now: u64,
    ) -> Result<Assignment> {
        let mut tables = self.lock()?;
        let view = tables.view(key);
        let claimant_holder = tables
            .assignments
            .values()
            .find(|a| a.claimant() == payload.claimant);
        ConflictEngine::check_commit(&view, holder_token, payload.claimant, claimant_holder, now)?;

        let resource_name = view.resource.map(|r| r.name.clone()).unwrap_or_default();
        let assignment = Assignment::new(key.to_string(), resource_name, payload.clone(), now);

        tables.assignments.insert(assignment.id.clone(), assignment.clone());
        tables.leases.remove(key);
        Ok(assignment)
    }

    fn live_lease(&self, key: &str, now: u64) -> Result<Option<Lease>> {
        Ok(self
            .lock()?
            .leases
            .get(key)
            .filter(|l| l.is_live(now))
            .cloned())
    }

    fn snapshot(&self, now: u64) -> Result<StateSnapshot> {
        let mut tables = self.lock()?;
        tables.evict_expired(now);
        Ok(StateSnapshot {
            resources: tables.resources.values().cloned().collect(),
            assignments: tables.assignments.values().cloned().collect(),
            live_leases: tables.leases.values().cloned().collect(),
        })
    }

    fn list_assignments(&self) -> Result<Vec<Assignment>> {
        let mut assignments: Vec<Assignment> =
            self.lock()?.assignments.values().cloned().collect();
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(assignments)
    }

    fn delete_assignment(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.assignments.remove(id).is_some())
    }

    fn evict_expired(&self, now: u64) -> Result<usize> {
        Ok(self.lock()?.evict_expired(now))
    }
}
