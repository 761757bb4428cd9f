//! SQLite implementation of the MetadataStore trait

use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::MetadataConfig;
use crate::error::{NimbusError, Result};
use crate::metadata::{remote_basename, Account, CatalogEntry, MetadataStore};

fn resolve_db_path(config: Option<&MetadataConfig>) -> PathBuf {
    if let Some(cfg) = config {
        return PathBuf::from(&cfg.db_path);
    }
    match env::var("NIMBUS_DB_FILE") {
        Ok(path) => {
            info!("Using database path from environment: {}", path);
            PathBuf::from(path)
        }
        Err(_) => {
            warn!("Metadata database location not configured");
            let default_path = Path::new("data").join("metadata.db");
            info!("Using default database path: {}", default_path.display());
            default_path
        }
    }
}

/// SQLite implementation of MetadataStore
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database and ensure the schema exists
    pub fn new(config: Option<&MetadataConfig>) -> Result<Self> {
        let db_path = resolve_db_path(config);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&db_path)?;
        if config.map_or(true, |c| c.wal_mode) {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                identity TEXT PRIMARY KEY,
                secret TEXT NOT NULL,
                free_capacity INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS filesystem (
                content_hash TEXT PRIMARY KEY,
                remote_path TEXT NOT NULL UNIQUE,
                owning_account TEXT NOT NULL,
                size INTEGER NOT NULL
            )",
            [],
        )?;
        info!("Opened metadata database at {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO accounts (identity, secret, free_capacity) VALUES (?1, ?2, ?3)",
            params![account.identity, account.secret, account.free_capacity],
        )?;
        Ok(())
    }

    fn account(&self, identity: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                "SELECT identity, secret, free_capacity FROM accounts WHERE identity = ?1",
                params![identity],
                |row| {
                    Ok(Account {
                        identity: row.get(0)?,
                        secret: row.get(1)?,
                        free_capacity: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT identity, secret, free_capacity FROM accounts")?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                identity: row.get(0)?,
                secret: row.get(1)?,
                free_capacity: row.get(2)?,
            })
        })?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    fn capacity_of(&self, identity: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT free_capacity FROM accounts WHERE identity = ?1",
            params![identity],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| NimbusError::UnknownAccount(identity.to_string()))
    }

    fn adjust_capacity(&self, identity: &str, delta: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE accounts SET free_capacity = free_capacity + ?1 WHERE identity = ?2",
            params![delta, identity],
        )?;
        if changed == 0 {
            return Err(NimbusError::UnknownAccount(identity.to_string()));
        }
        Ok(())
    }

    fn lookup_hash(&self, content_hash: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                "SELECT content_hash, remote_path, owning_account, size
                 FROM filesystem WHERE content_hash = ?1",
                params![content_hash],
                |row| {
                    Ok(CatalogEntry {
                        content_hash: row.get(0)?,
                        remote_path: row.get(1)?,
                        owning_account: row.get(2)?,
                        size: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn contains_hash(&self, content_hash: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM filesystem WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO filesystem (content_hash, remote_path, owning_account, size)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.content_hash,
                entry.remote_path,
                entry.owning_account,
                entry.size as i64
            ],
        )
        .map_err(|e| {
            NimbusError::Metadata(format!(
                "catalog insert for hash {} rejected: {}",
                entry.content_hash, e
            ))
        })?;
        Ok(())
    }

    fn entry_by_path(&self, remote_path: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                "SELECT content_hash, remote_path, owning_account, size
                 FROM filesystem WHERE remote_path = ?1",
                params![remote_path],
                |row| {
                    Ok(CatalogEntry {
                        content_hash: row.get(0)?,
                        remote_path: row.get(1)?,
                        owning_account: row.get(2)?,
                        size: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn remove_entry(&self, remote_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM filesystem WHERE remote_path = ?1",
            params![remote_path],
        )?;
        if changed == 0 {
            return Err(NimbusError::NotFound(remote_path.to_string()));
        }
        Ok(())
    }

    fn remote_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT remote_path FROM filesystem ORDER BY remote_path")?;
        let rows = stmt.query_map([], |row| {
            let remote_path: String = row.get(0)?;
            Ok(remote_basename(&remote_path))
        })?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn open_temp_store() -> (tempfile::TempDir, SqliteMetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = MetadataConfig {
            backend: crate::config::MetadataBackend::SQLite,
            db_path: dir.path().join("metadata.db").to_str().unwrap().to_string(),
            wal_mode: false,
        };
        let store = SqliteMetadataStore::new(Some(&config)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_sqlite_account_operations() {
        let (_dir, store) = open_temp_store();

        let account = Account {
            identity: "a@relay.example".to_string(),
            secret: "pw".to_string(),
            free_capacity: 100,
        };
        store.insert_account(&account).unwrap();

        assert_eq!(store.account("a@relay.example").unwrap(), Some(account));
        assert_eq!(store.account("missing").unwrap(), None);
        assert_eq!(store.capacity_of("a@relay.example").unwrap(), 100);

        store.adjust_capacity("a@relay.example", -30).unwrap();
        assert_eq!(store.capacity_of("a@relay.example").unwrap(), 70);
        store.adjust_capacity("a@relay.example", 30).unwrap();
        assert_eq!(store.capacity_of("a@relay.example").unwrap(), 100);

        assert!(store.adjust_capacity("missing", -1).is_err());
        assert!(store.capacity_of("missing").is_err());

        // Duplicate identity must be rejected by the primary key
        let dup = Account {
            identity: "a@relay.example".to_string(),
            secret: "other".to_string(),
            free_capacity: 1,
        };
        assert!(store.insert_account(&dup).is_err());
    }

    #[test]
    fn test_sqlite_catalog_operations() {
        let (_dir, store) = open_temp_store();

        let entry = CatalogEntry {
            content_hash: "abc123".to_string(),
            remote_path: "/Root/x".to_string(),
            owning_account: "a@relay.example".to_string(),
            size: 10,
        };

        assert!(!store.contains_hash("abc123").unwrap());
        store.insert_entry(&entry).unwrap();
        assert!(store.contains_hash("abc123").unwrap());
        assert_eq!(store.lookup_hash("abc123").unwrap(), Some(entry.clone()));
        assert_eq!(store.entry_by_path("/Root/x").unwrap(), Some(entry.clone()));

        // A second entry for the same hash violates the hard invariant
        let dup = CatalogEntry {
            remote_path: "/Root/y".to_string(),
            ..entry.clone()
        };
        assert!(store.insert_entry(&dup).is_err());

        let other = CatalogEntry {
            content_hash: "def456".to_string(),
            remote_path: "/Root/b".to_string(),
            owning_account: "a@relay.example".to_string(),
            size: 20,
        };
        store.insert_entry(&other).unwrap();
        assert_eq!(store.remote_names().unwrap(), vec!["b", "x"]);

        store.remove_entry("/Root/x").unwrap();
        assert!(!store.contains_hash("abc123").unwrap());
        assert!(store.remove_entry("/Root/x").is_err());
        assert_eq!(store.remote_names().unwrap(), vec!["b"]);
    }

    #[test]
    #[serial]
    fn test_db_path_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.db");
        env::set_var("NIMBUS_DB_FILE", path.to_str().unwrap());
        assert_eq!(resolve_db_path(None), path);
        env::remove_var("NIMBUS_DB_FILE");
        assert_eq!(resolve_db_path(None), Path::new("data").join("metadata.db"));
    }
}
