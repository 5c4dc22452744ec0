//! Audit log: SQLite-based history of vault mutations.
//!
//! Records which operation touched which domain and key, and when.
//! Values are never recorded.
//!
//! Auditing degrades gracefully: the vault logs a warning and carries on
//! if the database can't be opened or written to.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::errors::{Result, VaultError};

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub domain: String,
    pub key_name: Option<String>,
}

/// SQLite-backed audit log.
#[derive(Debug)]
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| VaultError::Audit(format!("open {}: {e}", db_path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(db_path, perms)?;
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                operation   TEXT NOT NULL,
                domain      TEXT NOT NULL,
                key_name    TEXT
            );",
        )
        .map_err(|e| VaultError::Audit(format!("create table: {e}")))?;

        Ok(Self { conn })
    }

    /// Record an operation.
    pub fn log(&self, operation: &str, domain: &str, key_name: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, operation, domain, key_name)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![now, operation, domain, key_name],
            )
            .map_err(|e| VaultError::Audit(format!("insert: {e}")))?;
        Ok(())
    }

    /// Query recent audit entries.
    ///
    /// - `limit`: maximum number of entries to return (most recent first).
    /// - `since`: if provided, only return entries newer than this timestamp.
    pub fn query(&self, limit: usize, since: Option<DateTime<Utc>>) -> Result<Vec<AuditEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let (sql, params): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = match since {
            Some(ref ts) => (
                "SELECT id, timestamp, operation, domain, key_name
                 FROM audit_log
                 WHERE timestamp >= ?1
                 ORDER BY id DESC
                 LIMIT ?2",
                vec![
                    Box::new(ts.to_rfc3339()) as Box<dyn rusqlite::types::ToSql>,
                    Box::new(limit_i64),
                ],
            ),
            None => (
                "SELECT id, timestamp, operation, domain, key_name
                 FROM audit_log
                 ORDER BY id DESC
                 LIMIT ?1",
                vec![Box::new(limit_i64) as Box<dyn rusqlite::types::ToSql>],
            ),
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| VaultError::Audit(format!("query prepare: {e}")))?;

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| &**p).collect();

        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                let ts_str: String = row.get(1)?;
                let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp,
                    operation: row.get(2)?,
                    domain: row.get(3)?,
                    key_name: row.get(4)?,
                })
            })
            .map_err(|e| VaultError::Audit(format!("query exec: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| VaultError::Audit(format!("row parse: {e}")))?);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.db");
        AuditLog::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn log_and_query_roundtrip() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(&dir.path().join("audit.db")).unwrap();

        audit.log("put", "api", Some("token")).unwrap();
        audit.log("put", "api", Some("url")).unwrap();
        audit.log("unset_domain", "legacy", None).unwrap();

        let entries = audit.query(10, None).unwrap();
        assert_eq!(entries.len(), 3);

        // Most recent first.
        assert_eq!(entries[0].operation, "unset_domain");
        assert_eq!(entries[0].domain, "legacy");
        assert!(entries[0].key_name.is_none());
        assert_eq!(entries[2].key_name.as_deref(), Some("token"));
    }

    #[test]
    fn query_with_limit() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(&dir.path().join("audit.db")).unwrap();

        for i in 0..10 {
            audit.log("put", "api", Some(&format!("key_{i}"))).unwrap();
        }

        assert_eq!(audit.query(3, None).unwrap().len(), 3);
    }

    #[test]
    fn query_with_since_filter() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(&dir.path().join("audit.db")).unwrap();

        audit.log("put", "api", Some("token")).unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(audit.query(10, Some(past)).unwrap().len(), 1);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(audit.query(10, Some(future)).unwrap().len(), 0);
    }

    #[test]
    fn open_fails_on_bad_path() {
        let result = AuditLog::open(Path::new("/nonexistent/path/that/does/not/exist/audit.db"));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn audit_db_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.db");
        let _audit = AuditLog::open(&path).unwrap();

        let perms = std::fs::metadata(&path).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
