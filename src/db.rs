// Relational sink - system of record for current entity state.
//
// One `apply` call is one logical state transition. Multi-statement
// transitions (approve, deposit, withdraw) run inside a single SQL
// transaction so the next resolver query never observes a partial apply.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StreamError;
use crate::payload::EventPayload;

/// Fixed schema contract, in creation order. Drops happen in reverse so
/// referencing tables go first.
const TABLES: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            dob TEXT NOT NULL,
            state TEXT,
            modified_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "applications",
        "CREATE TABLE IF NOT EXISTS applications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            status TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "balances",
        "CREATE TABLE IF NOT EXISTS balances (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
            amount REAL NOT NULL,
            modified_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "withdrawals",
        "CREATE TABLE IF NOT EXISTS withdrawals (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            amount REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "deposits",
        "CREATE TABLE IF NOT EXISTS deposits (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            amount REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
];

/// Relational store target. Owns the connection exclusively; the driver
/// closes it exactly once on stop.
pub struct RelationalTarget {
    conn: Connection,
}

impl RelationalTarget {
    /// Open (or create) the store at `path`. Failure here is fatal.
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))
            .map_err(|source| StreamError::connection("relational", source))?;

        // WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL mode")
            .map_err(|source| StreamError::connection("relational", source))?;

        Ok(RelationalTarget { conn })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StreamError> {
        let conn = Connection::open_in_memory()
            .context("failed to open in-memory database")
            .map_err(|source| StreamError::connection("relational", source))?;
        Ok(RelationalTarget { conn })
    }

    /// Idempotently ensure all entity tables exist. With `recreate`,
    /// drop them first; a missing table during drop is non-fatal.
    pub fn ensure_schema(&self, recreate: bool) -> Result<()> {
        if recreate {
            for (table, _) in TABLES.iter().rev() {
                let drop = format!("DROP TABLE {table}");
                if let Err(err) = self.conn.execute(&drop, []) {
                    if err.to_string().contains("no such table") {
                        warn!(table, "table not dropped: does not exist");
                        continue;
                    }
                    return Err(err).with_context(|| format!("failed to drop table {table}"));
                }
            }
        }

        for (table, ddl) in TABLES {
            debug!(table, "creating table if not exists");
            self.conn
                .execute(ddl, [])
                .with_context(|| format!("failed to create table {table}"))?;
        }

        Ok(())
    }

    /// Apply one payload as exactly one logical state transition.
    ///
    /// A failure after successful validation drops the event; entity
    /// state is unchanged because every apply runs in one transaction.
    pub fn apply(&mut self, payload: &EventPayload) -> Result<(), StreamError> {
        let tx = self.conn.transaction()?;

        match payload {
            EventPayload::Signup {
                event_ts,
                first_name,
                last_name,
                email,
                dob,
                state,
            } => {
                tx.execute(
                    "INSERT INTO users (id, first_name, last_name, email, dob, state, modified_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![
                        Uuid::new_v4().to_string(),
                        first_name,
                        last_name,
                        email,
                        dob,
                        state,
                        event_ts,
                    ],
                )?;
            }
            EventPayload::DemographicUpdate {
                event_ts,
                id,
                state,
            } => {
                tx.execute(
                    "UPDATE users SET state = ?1, modified_at = ?2 WHERE id = ?3",
                    params![state, event_ts, id],
                )?;
            }
            EventPayload::ApplicationOpen {
                event_ts,
                user_id,
                status,
            } => {
                tx.execute(
                    "INSERT INTO applications (id, user_id, status, modified_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![Uuid::new_v4().to_string(), user_id, status, event_ts],
                )?;
            }
            EventPayload::ApplicationReject {
                event_ts,
                user_id,
                status,
            } => {
                // Transition is monotonic: only a pending application moves.
                tx.execute(
                    "UPDATE applications SET status = ?1, modified_at = ?2
                     WHERE user_id = ?3 AND status = 'pending'",
                    params![status, event_ts, user_id],
                )?;
            }
            EventPayload::ApplicationApprove {
                event_ts,
                user_id,
                status,
            } => {
                tx.execute(
                    "UPDATE applications SET status = ?1, modified_at = ?2
                     WHERE user_id = ?3 AND status = 'pending'",
                    params![status, event_ts, user_id],
                )?;

                // Seed a zero balance. UNIQUE(user_id) plus OR IGNORE keeps
                // a hypothetical second approval from duplicating the row.
                tx.execute(
                    "INSERT OR IGNORE INTO balances (id, user_id, amount, modified_at, created_at)
                     VALUES (?1, ?2, 0.0, ?3, ?3)",
                    params![Uuid::new_v4().to_string(), user_id, event_ts],
                )?;
            }
            EventPayload::Deposit {
                event_ts,
                user_id,
                amount,
            } => {
                tx.execute(
                    "INSERT INTO deposits (id, user_id, amount, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![Uuid::new_v4().to_string(), user_id, amount, event_ts],
                )?;
                tx.execute(
                    "UPDATE balances SET amount = amount + ?1, modified_at = ?2 WHERE user_id = ?3",
                    params![amount, event_ts, user_id],
                )?;
            }
            EventPayload::Withdraw {
                event_ts,
                user_id,
                amount,
            } => {
                tx.execute(
                    "INSERT INTO withdrawals (id, user_id, amount, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![Uuid::new_v4().to_string(), user_id, amount, event_ts],
                )?;
                tx.execute(
                    "UPDATE balances SET amount = amount - ?1, modified_at = ?2 WHERE user_id = ?3",
                    params![amount, event_ts, user_id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Borrow the connection for read-only dependency resolution.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Row count for one of the contract tables.
    pub fn table_count(&self, table: &str) -> Result<i64> {
        if !TABLES.iter().any(|(name, _)| *name == table) {
            bail!("unknown table: {table}");
        }
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Current balance for a user, if a balance row exists.
    pub fn balance_of(&self, user_id: &str) -> Result<Option<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT amount FROM balances WHERE user_id = ?1")?;
        let mut rows = stmt.query_map(params![user_id], |row| row.get::<_, f64>(0))?;
        match rows.next() {
            Some(amount) => Ok(Some(amount?)),
            None => Ok(None),
        }
    }

    /// Release the connection. Called exactly once when the driver stops.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, err)| err)
            .context("failed to close relational connection")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::EventPayload;

    fn open_with_schema() -> RelationalTarget {
        let target = RelationalTarget::open_in_memory().unwrap();
        target.ensure_schema(false).unwrap();
        target
    }

    fn signup(ts: &str) -> EventPayload {
        EventPayload::Signup {
            event_ts: ts.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada.lovelace1@example.com".to_string(),
            dob: "1985-12-10".to_string(),
            state: "NY".to_string(),
        }
    }

    fn first_user_id(target: &RelationalTarget) -> String {
        target
            .conn()
            .query_row("SELECT id FROM users LIMIT 1", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let target = RelationalTarget::open_in_memory().unwrap();
        target.ensure_schema(false).unwrap();
        target.ensure_schema(false).unwrap();

        assert_eq!(target.table_count("users").unwrap(), 0);
        assert_eq!(target.table_count("deposits").unwrap(), 0);
    }

    #[test]
    fn test_recreate_drops_existing_rows() {
        let mut target = open_with_schema();
        target.apply(&signup("2024-01-05T09:30:00.123")).unwrap();
        assert_eq!(target.table_count("users").unwrap(), 1);

        target.ensure_schema(true).unwrap();
        assert_eq!(target.table_count("users").unwrap(), 0);
    }

    #[test]
    fn test_recreate_on_empty_store_tolerates_missing_tables() {
        let target = RelationalTarget::open_in_memory().unwrap();
        // No tables exist yet; every drop hits "no such table".
        target.ensure_schema(true).unwrap();
        assert_eq!(target.table_count("users").unwrap(), 0);
    }

    #[test]
    fn test_signup_creates_exactly_one_user_and_nothing_else() {
        let mut target = open_with_schema();
        target.apply(&signup("2024-01-05T09:30:00.123")).unwrap();

        assert_eq!(target.table_count("users").unwrap(), 1);
        assert_eq!(target.table_count("applications").unwrap(), 0);
        assert_eq!(target.table_count("balances").unwrap(), 0);
    }

    #[test]
    fn test_demographic_update_changes_state_and_modified_at() {
        let mut target = open_with_schema();
        target.apply(&signup("2024-01-05T09:30:00.123")).unwrap();
        let user_id = first_user_id(&target);

        target
            .apply(&EventPayload::DemographicUpdate {
                event_ts: "2024-01-06T10:00:00.000".to_string(),
                id: user_id.clone(),
                state: "CA".to_string(),
            })
            .unwrap();

        let (state, modified_at): (String, String) = target
            .conn()
            .query_row(
                "SELECT state, modified_at FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(state, "CA");
        assert_eq!(modified_at, "2024-01-06T10:00:00.000");
    }

    #[test]
    fn test_approve_seeds_zero_balance_once() {
        let mut target = open_with_schema();
        target.apply(&signup("2024-01-05T09:30:00.123")).unwrap();
        let user_id = first_user_id(&target);

        target
            .apply(&EventPayload::ApplicationOpen {
                event_ts: "2024-01-05T09:31:00.000".to_string(),
                user_id: user_id.clone(),
                status: "pending".to_string(),
            })
            .unwrap();
        target
            .apply(&EventPayload::ApplicationApprove {
                event_ts: "2024-01-05T09:32:00.000".to_string(),
                user_id: user_id.clone(),
                status: "approved".to_string(),
            })
            .unwrap();

        assert_eq!(target.balance_of(&user_id).unwrap(), Some(0.0));
        assert_eq!(target.table_count("balances").unwrap(), 1);

        // A second approval must not duplicate the balance row.
        target
            .apply(&EventPayload::ApplicationApprove {
                event_ts: "2024-01-05T09:33:00.000".to_string(),
                user_id: user_id.clone(),
                status: "approved".to_string(),
            })
            .unwrap();
        assert_eq!(target.table_count("balances").unwrap(), 1);
    }

    #[test]
    fn test_status_transition_is_monotonic() {
        let mut target = open_with_schema();
        target.apply(&signup("2024-01-05T09:30:00.123")).unwrap();
        let user_id = first_user_id(&target);

        target
            .apply(&EventPayload::ApplicationOpen {
                event_ts: "2024-01-05T09:31:00.000".to_string(),
                user_id: user_id.clone(),
                status: "pending".to_string(),
            })
            .unwrap();
        target
            .apply(&EventPayload::ApplicationReject {
                event_ts: "2024-01-05T09:32:00.000".to_string(),
                user_id: user_id.clone(),
                status: "rejected".to_string(),
            })
            .unwrap();

        // Approve after reject is a no-op: the application is no
        // longer pending.
        target
            .apply(&EventPayload::ApplicationApprove {
                event_ts: "2024-01-05T09:33:00.000".to_string(),
                user_id: user_id.clone(),
                status: "approved".to_string(),
            })
            .unwrap();

        let status: String = target
            .conn()
            .query_row(
                "SELECT status FROM applications WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "rejected");
    }

    #[test]
    fn test_deposit_and_withdraw_move_the_balance() {
        let mut target = open_with_schema();
        target.apply(&signup("2024-01-05T09:30:00.123")).unwrap();
        let user_id = first_user_id(&target);

        target
            .apply(&EventPayload::ApplicationOpen {
                event_ts: "2024-01-05T09:31:00.000".to_string(),
                user_id: user_id.clone(),
                status: "pending".to_string(),
            })
            .unwrap();
        target
            .apply(&EventPayload::ApplicationApprove {
                event_ts: "2024-01-05T09:32:00.000".to_string(),
                user_id: user_id.clone(),
                status: "approved".to_string(),
            })
            .unwrap();

        target
            .apply(&EventPayload::Deposit {
                event_ts: "2024-01-05T09:33:00.000".to_string(),
                user_id: user_id.clone(),
                amount: 50.0,
            })
            .unwrap();
        assert_eq!(target.balance_of(&user_id).unwrap(), Some(50.0));
        assert_eq!(target.table_count("deposits").unwrap(), 1);

        target
            .apply(&EventPayload::Withdraw {
                event_ts: "2024-01-05T09:34:00.000".to_string(),
                user_id: user_id.clone(),
                amount: 20.0,
            })
            .unwrap();
        assert_eq!(target.balance_of(&user_id).unwrap(), Some(30.0));
        assert_eq!(target.table_count("withdrawals").unwrap(), 1);
    }

    #[test]
    fn test_table_count_rejects_unknown_table() {
        let target = open_with_schema();
        assert!(target.table_count("users; DROP TABLE users").is_err());
    }
}
