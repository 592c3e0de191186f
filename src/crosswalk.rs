//! Crosswalk Store (§4.A): a durable, bidirectional identity mapping
//! table plus per-patient date-shift offsets, backed by an embedded
//! transactional database — `rusqlite` with the bundled SQLite, the same
//! "single-file durable store" role `rusqlite` plays in the log-shipping
//! pipeline this pattern is grounded on (see DESIGN.md).

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

const MAX_ID_GENERATION_ATTEMPTS: u32 = 16;

#[derive(Debug, Clone)]
pub struct CrosswalkEntry {
    pub broker_name: String,
    pub id_type: String,
    pub id_in: String,
    pub id_out: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UidMapping {
    pub broker_name: String,
    pub uid_in: String,
    pub uid_out: String,
    pub uid_type: String,
}

/// Filter for `list_entries`; all fields optional (audit/query surface).
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub id_type: Option<String>,
    pub id_in: Option<String>,
}

pub struct CrosswalkStore {
    conn: Mutex<Connection>,
}

impl CrosswalkStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS crosswalk (
                broker_name TEXT NOT NULL,
                id_type TEXT NOT NULL,
                id_in TEXT NOT NULL,
                id_out TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(broker_name, id_type, id_in),
                UNIQUE(broker_name, id_type, id_out)
            );
            CREATE TABLE IF NOT EXISTS date_shifts (
                broker_name TEXT NOT NULL,
                patient_id_in TEXT NOT NULL,
                shift_days INTEGER NOT NULL,
                UNIQUE(broker_name, patient_id_in)
            );
            CREATE TABLE IF NOT EXISTS uid_mappings (
                broker_name TEXT NOT NULL,
                uid_in TEXT NOT NULL,
                uid_out TEXT NOT NULL,
                uid_type TEXT NOT NULL,
                UNIQUE(broker_name, uid_in)
            );
            CREATE TABLE IF NOT EXISTS sequence_counters (
                broker_name TEXT NOT NULL,
                id_type TEXT NOT NULL,
                next_value INTEGER NOT NULL DEFAULT 1,
                UNIQUE(broker_name, id_type)
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE crosswalk (
                broker_name TEXT NOT NULL, id_type TEXT NOT NULL, id_in TEXT NOT NULL,
                id_out TEXT NOT NULL, created_at TEXT NOT NULL,
                UNIQUE(broker_name, id_type, id_in), UNIQUE(broker_name, id_type, id_out)
            );
            CREATE TABLE date_shifts (
                broker_name TEXT NOT NULL, patient_id_in TEXT NOT NULL, shift_days INTEGER NOT NULL,
                UNIQUE(broker_name, patient_id_in)
            );
            CREATE TABLE uid_mappings (
                broker_name TEXT NOT NULL, uid_in TEXT NOT NULL, uid_out TEXT NOT NULL, uid_type TEXT NOT NULL,
                UNIQUE(broker_name, uid_in)
            );
            CREATE TABLE sequence_counters (
                broker_name TEXT NOT NULL, id_type TEXT NOT NULL, next_value INTEGER NOT NULL DEFAULT 1,
                UNIQUE(broker_name, id_type)
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Monotonically-increasing integer per `(broker, id_type)`, used by
    /// the local broker's `sequential` naming scheme (§4.C).
    pub fn next_sequence(&self, broker: &str, id_type: &str) -> Result<u64> {
        let conn = self.conn.lock().expect("crosswalk connection poisoned");
        conn.execute(
            "INSERT INTO sequence_counters (broker_name, id_type, next_value) VALUES (?1, ?2, 2)
             ON CONFLICT(broker_name, id_type) DO UPDATE SET next_value = next_value + 1",
            params![broker, id_type],
        )?;
        let value: i64 = conn.query_row(
            "SELECT next_value FROM sequence_counters WHERE broker_name = ?1 AND id_type = ?2",
            params![broker, id_type],
            |row| row.get(0),
        )?;
        // next_value now holds the value *after* this allocation; the
        // one we just allocated is one less.
        Ok((value - 1) as u64)
    }

    /// Atomic find-or-create: `generator` is called only when no row
    /// exists yet for `(broker, id_type, id_in)`. Collisions on the
    /// output uniqueness constraint are retried up to
    /// `MAX_ID_GENERATION_ATTEMPTS` times before giving up (§4.A).
    pub fn lookup_or_create(
        &self,
        broker: &str,
        id_type: &str,
        id_in: &str,
        mut generator: impl FnMut(u32) -> String,
    ) -> Result<String> {
        let conn = self.conn.lock().expect("crosswalk connection poisoned");

        if let Some(existing) = query_id_out(&conn, broker, id_type, id_in)? {
            return Ok(existing);
        }

        for attempt in 0..MAX_ID_GENERATION_ATTEMPTS {
            let candidate = generator(attempt);
            let result = conn.execute(
                "INSERT INTO crosswalk (broker_name, id_type, id_in, id_out, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![broker, id_type, id_in, candidate, Utc::now().to_rfc3339()],
            );

            match result {
                Ok(_) => return Ok(candidate),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                    // Another writer may have inserted id_in concurrently, or id_out collided.
                    if let Some(existing) = query_id_out(&conn, broker, id_type, id_in)? {
                        return Ok(existing);
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::IdGenerationExhausted {
            id_type: id_type.to_string(),
            id_in: id_in.to_string(),
            attempts: MAX_ID_GENERATION_ATTEMPTS,
        })
    }

    pub fn reverse_lookup(&self, broker: &str, id_type: &str, id_out: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("crosswalk connection poisoned");
        let id_in: Option<String> = conn
            .query_row(
                "SELECT id_in FROM crosswalk WHERE broker_name = ?1 AND id_type = ?2 AND id_out = ?3",
                params![broker, id_type, id_out],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id_in)
    }

    /// Deterministic per `(broker, patient_id)`: chosen once at first
    /// sight, pseudo-random in `[min, max]`, seeded from a hash of the
    /// key so it is reproducible without being guessable from the key
    /// alone.
    pub fn get_or_allocate_date_shift(&self, broker: &str, patient_id: &str, min: i64, max: i64) -> Result<i64> {
        let conn = self.conn.lock().expect("crosswalk connection poisoned");

        let existing: Option<i64> = conn
            .query_row(
                "SELECT shift_days FROM date_shifts WHERE broker_name = ?1 AND patient_id_in = ?2",
                params![broker, patient_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(shift) = existing {
            return Ok(shift);
        }

        let shift = seeded_shift(broker, patient_id, min, max);
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO date_shifts (broker_name, patient_id_in, shift_days) VALUES (?1, ?2, ?3)",
            params![broker, patient_id, shift],
        )?;

        if inserted == 0 {
            // Lost a race with another writer; read back whatever it stored.
            let shift: i64 = conn.query_row(
                "SELECT shift_days FROM date_shifts WHERE broker_name = ?1 AND patient_id_in = ?2",
                params![broker, patient_id],
                |row| row.get(0),
            )?;
            return Ok(shift);
        }

        Ok(shift)
    }

    pub fn put_uid_mapping(&self, broker: &str, uid_in: &str, uid_out: &str, uid_type: &str) -> Result<()> {
        let conn = self.conn.lock().expect("crosswalk connection poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO uid_mappings (broker_name, uid_in, uid_out, uid_type) VALUES (?1, ?2, ?3, ?4)",
            params![broker, uid_in, uid_out, uid_type],
        )?;
        Ok(())
    }

    pub fn uid_mapping(&self, broker: &str, uid_in: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("crosswalk connection poisoned");
        let uid_out: Option<String> = conn
            .query_row(
                "SELECT uid_out FROM uid_mappings WHERE broker_name = ?1 AND uid_in = ?2",
                params![broker, uid_in],
                |row| row.get(0),
            )
            .optional()?;
        Ok(uid_out)
    }

    pub fn list_entries(&self, broker: &str, filter: &EntryFilter, page: usize, page_size: usize) -> Result<Vec<CrosswalkEntry>> {
        let conn = self.conn.lock().expect("crosswalk connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT broker_name, id_type, id_in, id_out, created_at FROM crosswalk
             WHERE broker_name = ?1
               AND (?2 IS NULL OR id_type = ?2)
               AND (?3 IS NULL OR id_in = ?3)
             ORDER BY created_at DESC LIMIT ?4 OFFSET ?5",
        )?;

        let rows = stmt.query_map(
            params![
                broker,
                filter.id_type,
                filter.id_in,
                page_size as i64,
                (page * page_size) as i64
            ],
            |row| {
                let created_at: String = row.get(4)?;
                Ok(CrosswalkEntry {
                    broker_name: row.get(0)?,
                    id_type: row.get(1)?,
                    id_in: row.get(2)?,
                    id_out: row.get(3)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(CoreError::from)
    }
}

fn query_id_out(conn: &Connection, broker: &str, id_type: &str, id_in: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT id_out FROM crosswalk WHERE broker_name = ?1 AND id_type = ?2 AND id_in = ?3",
        params![broker, id_type, id_in],
        |row| row.get(0),
    )
    .optional()
    .map_err(CoreError::from)
}

fn seeded_shift(broker: &str, patient_id: &str, min: i64, max: i64) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(broker.as_bytes());
    hasher.update(b"\0");
    hasher.update(patient_id.as_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    let mut rng = StdRng::from_seed(seed);

    if max <= min {
        return min;
    }
    rng.gen_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_or_create_is_idempotent() {
        let store = CrosswalkStore::open_in_memory().unwrap();
        let a = store.lookup_or_create("b1", "patient", "12345", |_| "PSEUDO-1".to_string()).unwrap();
        let b = store.lookup_or_create("b1", "patient", "12345", |_| "PSEUDO-2".to_string()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "PSEUDO-1");
    }

    #[test]
    fn reverse_lookup_round_trips() {
        let store = CrosswalkStore::open_in_memory().unwrap();
        let out = store.lookup_or_create("b1", "patient", "12345", |_| "PSEUDO-1".to_string()).unwrap();
        let back = store.reverse_lookup("b1", "patient", &out).unwrap();
        assert_eq!(back.as_deref(), Some("12345"));
    }

    #[test]
    fn date_shift_is_deterministic_and_in_range() {
        let store = CrosswalkStore::open_in_memory().unwrap();
        let a = store.get_or_allocate_date_shift("b1", "12345", 1, 30).unwrap();
        let b = store.get_or_allocate_date_shift("b1", "12345", 1, 30).unwrap();
        assert_eq!(a, b);
        assert!(a >= 1 && a <= 30);
    }

    #[test]
    fn id_generation_exhausted_when_generator_always_collides() {
        let store = CrosswalkStore::open_in_memory().unwrap();
        store.lookup_or_create("b1", "patient", "a", |_| "X".to_string()).unwrap();
        let err = store.lookup_or_create("b1", "patient", "b", |_| "X".to_string());
        assert!(matches!(err, Err(CoreError::IdGenerationExhausted { .. })));
    }
}
