//! SQLite-backed CoordinationStore implementation.
//! Provides durable registry, ledger and lease tables shared by any number
//! of server processes pointing at the same database file.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! stake-core = { path = "../stake-core", features = ["sqlite"] }
//! ```

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conflict::{ConflictEngine, KeyView};
use crate::error::{ConflictKind, Result, StakeError};
use crate::infrastructure::CoordinationStore;
use crate::state::StateSnapshot;
use crate::types::*;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const LEASE_COLUMNS: &str = "resource_key, holder_token, acquired_at, ttl, expires_at, renewed_at";
const ASSIGNMENT_COLUMNS: &str = "id, resource_key, resource_name, course_group, team_number, \
     leader_name, leader_email, leader_phone, students, created_at";

/// A persistent coordination store backed by a SQLite file.
///
/// Opens a fresh connection per operation, so the store itself holds no
/// in-process state beyond the path. Uses WAL mode for concurrent reads and
/// IMMEDIATE transactions for every read-decide-write sequence.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        let conn = store.connect()?;

        // WAL is persistent on the database file once set
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS resources (
                key         TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                sort_order  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS leases (
                resource_key TEXT PRIMARY KEY,
                holder_token TEXT NOT NULL,
                acquired_at  INTEGER NOT NULL,
                ttl          INTEGER NOT NULL,
                expires_at   INTEGER NOT NULL,
                renewed_at   INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_leases_expires ON leases(expires_at);

            CREATE TABLE IF NOT EXISTS assignments (
                id            TEXT PRIMARY KEY,
                resource_key  TEXT NOT NULL UNIQUE,
                resource_name TEXT NOT NULL,
                course_group  INTEGER NOT NULL,
                team_number   INTEGER NOT NULL,
                leader_name   TEXT NOT NULL,
                leader_email  TEXT NOT NULL,
                leader_phone  TEXT NOT NULL,
                students      TEXT NOT NULL,
                created_at    INTEGER NOT NULL,
                UNIQUE (course_group, team_number)
            );",
        )?;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    fn row_to_resource(row: &rusqlite::Row) -> rusqlite::Result<Resource> {
        Ok(Resource {
            key: row.get(0)?,
            name: row.get(1)?,
            is_active: row.get(2)?,
            sort_order: row.get(3)?,
        })
    }

    fn row_to_lease(row: &rusqlite::Row) -> rusqlite::Result<Lease> {
        Ok(Lease {
            resource_key: row.get(0)?,
            holder_token: row.get(1)?,
            acquired_at: row.get(2)?,
            ttl: row.get(3)?,
            expires_at: row.get(4)?,
            renewed_at: row.get(5)?,
        })
    }

    fn row_to_assignment(row: &rusqlite::Row) -> rusqlite::Result<Assignment> {
        let students_json: String = row.get(8)?;
        let students: Vec<Student> = serde_json::from_str(&students_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Assignment {
            id: row.get(0)?,
            resource_key: row.get(1)?,
            resource_name: row.get(2)?,
            payload: ClaimantPayload {
                claimant: ClaimantId {
                    course_group: row.get(3)?,
                    team_number: row.get(4)?,
                },
                leader_name: row.get(5)?,
                leader_email: row.get(6)?,
                leader_phone: row.get(7)?,
                students,
            },
            created_at: row.get(9)?,
        })
    }

    fn load_resource(conn: &Connection, key: &str) -> Result<Option<Resource>> {
        Ok(conn
            .query_row(
                "SELECT key, name, is_active, sort_order FROM resources WHERE key = ?1",
                params![key],
                Self::row_to_resource,
            )
            .optional()?)
    }

    fn load_lease(conn: &Connection, key: &str) -> Result<Option<Lease>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM leases WHERE resource_key = ?1", LEASE_COLUMNS),
                params![key],
                Self::row_to_lease,
            )
            .optional()?)
    }

    fn load_assignment_for_key(conn: &Connection, key: &str) -> Result<Option<Assignment>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM assignments WHERE resource_key = ?1", ASSIGNMENT_COLUMNS),
                params![key],
                Self::row_to_assignment,
            )
            .optional()?)
    }

    fn load_assignment_for_claimant(
        conn: &Connection,
        claimant: ClaimantId,
    ) -> Result<Option<Assignment>> {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM assignments WHERE course_group = ?1 AND team_number = ?2",
                    ASSIGNMENT_COLUMNS
                ),
                params![claimant.course_group, claimant.team_number],
                Self::row_to_assignment,
            )
            .optional()?)
    }

    fn query_all<T>(
        conn: &Connection,
        sql: &str,
        map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }

    /// Maps a uniqueness violation on the ledger to the matching conflict.
    pub(crate) fn translate_insert_error(err: rusqlite::Error, key: &str) -> StakeError {
        if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
            if failure.code == ErrorCode::ConstraintViolation {
                if message.contains("assignments.resource_key") {
                    return StakeError::conflict(key, ConflictKind::AlreadyAssigned);
                }
                if message.contains("assignments.course_group") {
                    return StakeError::conflict(key, ConflictKind::DuplicateClaimant);
                }
            }
        }
        err.into()
    }
}

impl CoordinationStore for SqliteStore {
    fn put_resource(&self, resource: &Resource) -> Result<()> {
        self.connect()?.execute(
            "INSERT INTO resources (key, name, is_active, sort_order) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active,
                sort_order = excluded.sort_order",
            params![resource.key, resource.name, resource.is_active, resource.sort_order],
        )?;
        Ok(())
    }

    fn list_resources(&self) -> Result<Vec<Resource>> {
        Self::query_all(
            &self.connect()?,
            "SELECT key, name, is_active, sort_order FROM resources ORDER BY sort_order, key",
            Self::row_to_resource,
        )
    }

    fn acquire(&self, key: &str, holder_token: &str, ttl: u64, now: u64) -> Result<LeaseWrite> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let resource = Self::load_resource(&tx, key)?;
        let assignment = Self::load_assignment_for_key(&tx, key)?;
        let existing = Self::load_lease(&tx, key)?;
        let view = KeyView {
            key,
            resource: resource.as_ref(),
            assignment: assignment.as_ref(),
            lease: existing.as_ref(),
        };
        let write = ConflictEngine::decide_acquire(&view, holder_token, ttl, now)?;
        let lease = write.lease();

        // The WHERE clause is the authoritative guard: a live foreign row is never overwritten.
        let changed = tx.execute(
            "INSERT INTO leases (resource_key, holder_token, acquired_at, ttl, expires_at, renewed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(resource_key) DO UPDATE SET
                holder_token = excluded.holder_token,
                acquired_at = excluded.acquired_at,
                ttl = excluded.ttl,
                expires_at = excluded.expires_at,
                renewed_at = excluded.renewed_at
             WHERE leases.expires_at <= ?7 OR leases.holder_token = excluded.holder_token",
            params![
                lease.resource_key,
                lease.holder_token,
                lease.acquired_at,
                lease.ttl,
                lease.expires_at,
                lease.renewed_at,
                now,
            ],
        )?;

        if changed == 0 {
            return Err(StakeError::conflict(key, ConflictKind::ReservedByOther));
        }

        tx.commit()?;
        Ok(write)
    }

    fn release(&self, key: &str, holder_token: &str, now: u64) -> Result<bool> {
        let conn = self.connect()?;
        let released = conn.execute(
            "DELETE FROM leases WHERE resource_key = ?1 AND holder_token = ?2 AND expires_at > ?3",
            params![key, holder_token, now],
        )?;
        conn.execute("DELETE FROM leases WHERE expires_at <= ?1", params![now])?;
        Ok(released > 0)
    }

    fn commit(
        &self,
        key: &str,
        holder_token: &str,
        payload: &ClaimantPayload,
        now: u64,
    ) -> Result<Assignment> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let resource = Self::load_resource(&tx, key)?;
        let assignment = Self::load_assignment_for_key(&tx, key)?;
        let lease = Self::load_lease(&tx, key)?;
        let claimant_holder = Self::load_assignment_for_claimant(&tx, payload.claimant)?;
        let view = KeyView {
            key,
            resource: resource.as_ref(),
            assignment: assignment.as_ref(),
            lease: lease.as_ref(),
        };
        ConflictEngine::check_commit(
            &view,
            holder_token,
            payload.claimant,
            claimant_holder.as_ref(),
            now,
        )?;

        let resource_name = resource.map(|r| r.name).unwrap_or_default();
        let assignment = Assignment::new(key.to_string(), resource_name, payload.clone(), now);
        let students = serde_json::to_string(&assignment.payload.students)
            .map_err(|e| StakeError::Store(e.to_string()))?;

        tx.execute(
            &format!(
                "INSERT INTO assignments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                ASSIGNMENT_COLUMNS
            ),
            params![
                assignment.id,
                assignment.resource_key,
                assignment.resource_name,
                assignment.payload.claimant.course_group,
                assignment.payload.claimant.team_number,
                assignment.payload.leader_name,
                assignment.payload.leader_email,
                assignment.payload.leader_phone,
                students,
                assignment.created_at,
            ],
        )
        .map_err(|e| Self::translate_insert_error(e, key))?;

        let deleted = tx.execute(
            "DELETE FROM leases WHERE resource_key = ?1 AND holder_token = ?2 AND expires_at > ?3",
            params![key, holder_token, now],
        )?;
        if deleted == 0 {
            return Err(StakeError::conflict(key, ConflictKind::ReservationMissing));
        }

        tx.commit()?;
        Ok(assignment)
    }

    fn live_lease(&self, key: &str, now: u64) -> Result<Option<Lease>> {
        let lease = Self::load_lease(&self.connect()?, key)?;
        Ok(lease.filter(|l| l.is_live(now)))
    }

    fn snapshot(&self, now: u64) -> Result<StateSnapshot> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM leases WHERE expires_at <= ?1", params![now])?;

        let snapshot = StateSnapshot {
            resources: Self::query_all(
                &tx,
                "SELECT key, name, is_active, sort_order FROM resources",
                Self::row_to_resource,
            )?,
            assignments: Self::query_all(
                &tx,
                &format!("SELECT {} FROM assignments", ASSIGNMENT_COLUMNS),
                Self::row_to_assignment,
            )?,
            live_leases: Self::query_all(
                &tx,
                &format!("SELECT {} FROM leases", LEASE_COLUMNS),
                Self::row_to_lease,
            )?,
        };

        tx.commit()?;
        Ok(snapshot)
    }

    fn list_assignments(&self) -> Result<Vec<Assignment>> {
        Self::query_all(
            &self.connect()?,
            &format!("SELECT {} FROM assignments ORDER BY created_at, id", ASSIGNMENT_COLUMNS),
            Self::row_to_assignment,
        )
    }

    fn delete_assignment(&self, id: &str) -> Result<bool> {
        let rows = self
            .connect()?
            .execute("DELETE FROM assignments WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn evict_expired(&self, now: u64) -> Result<usize> {
        Ok(self
            .connect()?
            .execute("DELETE FROM leases WHERE expires_at <= ?1", params![now])?)
    }
}
