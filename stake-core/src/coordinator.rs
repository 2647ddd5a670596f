//! High-level entry point that wraps the pure rules + pluggable storage.
//! The HTTP server and in-process tests both delegate to this.

use std::sync::Arc;

use crate::api::{Overview, StatusReport};
use crate::clock::{Clock, SystemClock};
use crate::config::StakeConfig;
use crate::error::{Result, StakeError};
use crate::infrastructure::CoordinationStore;
use crate::infrastructure_in_memory::InMemoryStore;
use crate::state::{ResourceStatus, StatusProjector};
use crate::types::*;

/// Lease manager, commit coordinator and status projector over one store.
///
/// Holds no coordination state of its own: every decision is made by the
/// store inside a single atomic operation, so any number of coordinators may
/// share one backing store.
pub struct Coordinator {
    store: Box<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
    config: StakeConfig,
}

impl Coordinator {
    /// An in-memory coordinator with default config and the system clock.
    pub fn new() -> Self {
        Self::with_store(Box::new(InMemoryStore::new()), StakeConfig::default())
    }

    pub fn with_store(store: Box<dyn CoordinationStore>, config: StakeConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Create a coordinator backed by SQLite at the given path.
    /// Registry, ledger and leases persist across restarts.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, config: StakeConfig) -> Result<Self> {
        let store = crate::infrastructure_sqlite::SqliteStore::open(path).map_err(|e| {
            StakeError::Store(format!("failed to open SQLite database at '{}': {}", path, e))
        })?;
        Ok(Self::with_store(Box::new(store), config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StakeConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // ─── Lease Manager ──────────────────────────────────────────────────────

    /// Acquire a lease, or renew it when `holder_token` already holds it.
    ///
    /// Without a token a fresh one is generated.
    pub fn acquire(&self, resource_key: &str, holder_token: Option<&str>) -> Result<Lease> {
        let key = normalize_key(resource_key)?;
        let token = normalize_token(holder_token)?.unwrap_or_else(generate_token);
        let write = self
            .store
            .acquire(&key, &token, self.config.lease_ttl_ms, self.now())?;
        Ok(write.into_lease())
    }

    /// Release a held lease. Missing, foreign and expired leases are a no-op.
    ///
    /// Returns whether a row was deleted; only store failures are errors.
    pub fn release(&self, resource_key: &str, holder_token: &str) -> Result<bool> {
        let (Ok(key), Ok(Some(token))) = (
            normalize_key(resource_key),
            normalize_token(Some(holder_token)),
        ) else {
            return Ok(false);
        };
        self.store.release(&key, &token, self.now())
    }

    /// Live lease currently guarding `resource_key`.
    pub fn lease(&self, resource_key: &str) -> Result<Option<Lease>> {
        let key = normalize_key(resource_key)?;
        self.store.live_lease(&key, self.now())
    }

    /// Purge expired leases. Returns the number of rows removed.
    pub fn evict_expired(&self) -> Result<usize> {
        self.store.evict_expired(self.now())
    }

    // ─── Commit Coordinator ─────────────────────────────────────────────────

    /// Promote the caller's live lease into a permanent assignment.
    pub fn commit(
        &self,
        resource_key: &str,
        holder_token: Option<&str>,
        form: &ClaimantForm,
    ) -> Result<Assignment> {
        let key = normalize_key(resource_key)?;
        let token = require_token(holder_token)?;
        let payload = form.validate()?;
        self.store.commit(&key, &token, &payload, self.now())
    }

    // ─── Status Projector ───────────────────────────────────────────────────

    pub fn statuses(&self, caller_token: Option<&str>) -> Result<Vec<ResourceStatus>> {
        let now = self.now();
        let caller = caller_token.map(str::trim).filter(|t| !t.is_empty());
        let snapshot = self.store.snapshot(now)?;
        Ok(StatusProjector::project(&snapshot, caller, now))
    }

    pub fn status_report(&self, caller_token: Option<&str>) -> Result<StatusReport> {
        Ok(StatusReport::new(self.statuses(caller_token)?, &self.config))
    }

    pub fn live_lease_count(&self) -> Result<usize> {
        Ok(self.store.snapshot(self.now())?.live_leases.len())
    }

    // ─── Registry & ledger administration ───────────────────────────────────

    pub fn put_resource(&self, resource: Resource) -> Result<Resource> {
        let resource = Resource {
            key: normalize_key(&resource.key)?,
            name: resource.name.trim().to_string(),
            ..resource
        };
        if resource.name.is_empty() {
            return Err(StakeError::Invalid("name is required".to_string()));
        }
        self.store.put_resource(&resource)?;
        Ok(resource)
    }

    /// Seed the default catalog if the registry is empty. Returns how many
    /// resources were created.
    pub fn seed_catalog(&self, count: usize) -> Result<usize> {
        if !self.store.list_resources()?.is_empty() {
            return Ok(0);
        }
        let catalog = Resource::catalog(count);
        for resource in &catalog {
            self.store.put_resource(resource)?;
        }
        Ok(catalog.len())
    }

    pub fn overview(&self) -> Result<Overview> {
        Ok(Overview {
            resources: self.statuses(None)?,
            assignments: self.store.list_assignments()?,
        })
    }

    /// Out-of-band correction: delete an assignment and free its resource.
    pub fn delete_assignment(&self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(StakeError::Invalid("assignment id is required".to_string()));
        }
        if self.store.delete_assignment(id)? {
            Ok(())
        } else {
            Err(StakeError::NotFound(format!("assignment {}", id)))
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
