use anyhow::{anyhow, Result};
use axis_protocol::{Mode, Status};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod legacy;

pub const DB_FILE_NAME: &str = "axis.db";

const MODE_KEY: &str = "mode";

const DEFAULT_BUSY_MS: u64 = 5000;

/// Durable key/value surface for the operating mode and per-item statuses.
/// Calls are blocking; async callers offload them.
pub trait StateStore: Send + Sync {
    fn get_mode(&self) -> Result<Option<Mode>>;
    fn set_mode(&self, mode: Mode) -> Result<()>;
    fn get_statuses(&self) -> Result<HashMap<String, Status>>;
    fn set_status(&self, id: &str, status: Status) -> Result<()>;
    fn delete_status(&self, id: &str) -> Result<bool>;
}

/// SQLite-backed [`StateStore`]. Each call opens its own connection so the
/// handle is cheap to clone into blocking tasks.
#[derive(Clone)]
pub struct Kernel {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl Kernel {
    /// Open with the busy timeout from `AXIS_SQLITE_BUSY_MS` (default 5000ms).
    pub fn open(dir: &Path) -> Result<Self> {
        let busy_ms: u64 = std::env::var("AXIS_SQLITE_BUSY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BUSY_MS);
        Self::open_with_busy_timeout(dir, Duration::from_millis(busy_ms))
    }

    pub fn open_with_busy_timeout(dir: &Path, busy_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let kernel = Self {
            db_path: dir.join(DB_FILE_NAME),
            busy_timeout,
        };
        let conn = kernel.conn()?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;
        Ok(kernel)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated TEXT NOT NULL
            );

            -- Last-write-wins status per item id
            CREATE TABLE IF NOT EXISTS statuses (
              id TEXT PRIMARY KEY,
              status TEXT NOT NULL,
              updated TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // journal_mode is persistent in the file; these two are per connection.
    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

impl StateStore for Kernel {
    fn get_mode(&self) -> Result<Option<Mode>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key=? LIMIT 1",
                [MODE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => raw
                .parse::<Mode>()
                .map(Some)
                .map_err(|e| anyhow!("stored mode: {e}")),
            None => Ok(None),
        }
    }

    fn set_mode(&self, mode: Mode) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings(key,value,updated) VALUES(?,?,?)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated=excluded.updated",
            params![MODE_KEY, mode.as_str(), now_rfc3339()],
        )?;
        Ok(())
    }

    fn get_statuses(&self) -> Result<HashMap<String, Status>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id,status FROM statuses")?;
        let mut rows = stmt.query([])?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let raw: String = row.get(1)?;
            out.insert(id, Status::normalize(&raw));
        }
        Ok(out)
    }

    fn set_status(&self, id: &str, status: Status) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO statuses(id,status,updated) VALUES(?,?,?)
             ON CONFLICT(id) DO UPDATE SET status=excluded.status, updated=excluded.updated",
            params![id, status.as_str(), now_rfc3339()],
        )?;
        Ok(())
    }

    fn delete_status(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM statuses WHERE id=?", [id])?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn every_connection_gets_the_configured_pragmas() {
        let dir = tempdir().unwrap();
        let k = Kernel::open_with_busy_timeout(dir.path(), Duration::from_millis(1234)).unwrap();
        let conn = k.conn().unwrap();
        let busy: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(busy, 1234);
        let synchronous: i64 = conn
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .unwrap();
        assert_eq!(synchronous, 1);
        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal, "wal");
    }

    #[test]
    fn empty_store_has_no_mode_or_statuses() {
        let dir = tempdir().unwrap();
        let k = Kernel::open(dir.path()).unwrap();
        assert_eq!(k.get_mode().unwrap(), None);
        assert!(k.get_statuses().unwrap().is_empty());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let k = Kernel::open(dir.path()).unwrap();
            k.set_mode(Mode::Manual).unwrap();
            k.set_status("a", Status::Review).unwrap();
            k.set_status("a", Status::Blocked).unwrap();
            k.set_status("b", Status::Pending).unwrap();
        }
        let k = Kernel::open(dir.path()).unwrap();
        assert_eq!(k.get_mode().unwrap(), Some(Mode::Manual));
        let statuses = k.get_statuses().unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses["a"], Status::Blocked);
        assert!(k.delete_status("b").unwrap());
        assert!(!k.delete_status("b").unwrap());
        assert_eq!(k.get_statuses().unwrap().len(), 1);
    }

    #[test]
    fn unknown_stored_status_reads_as_pending() {
        let dir = tempdir().unwrap();
        let k = Kernel::open(dir.path()).unwrap();
        let conn = k.conn().unwrap();
        conn.execute(
            "INSERT INTO statuses(id,status,updated) VALUES('x','Keep','t')",
            [],
        )
        .unwrap();
        assert_eq!(k.get_statuses().unwrap()["x"], Status::Pending);
    }
}
