//! SQLite record of enrolled people and how often each was recognized.

use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS faces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    date_added TEXT NOT NULL,
    recognition_count INTEGER DEFAULT 0
)";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRecord {
    pub id: i64,
    pub name: String,
    pub date_added: String,
    pub recognition_count: i64,
}

pub struct FaceStore {
    conn: Connection,
}

impl FaceStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened face database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    /// Insert a new person with a zero count. Returns the row id.
    pub fn add_person(&self, name: &str) -> Result<i64, StoreError> {
        let date_added = chrono::Local::now().format(DATE_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO faces (name, date_added, recognition_count) VALUES (?1, ?2, 0)",
            params![name, date_added],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(id, name, "person added");
        Ok(id)
    }

    /// Add one to every row named `name`. Returns rows touched.
    pub fn increment_recognition(&self, name: &str) -> Result<usize, StoreError> {
        let n = self.conn.execute(
            "UPDATE faces SET recognition_count = recognition_count + 1 WHERE name = ?1",
            params![name],
        )?;
        Ok(n)
    }

    pub fn face_count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?)
    }

    /// Names in insertion order.
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT name FROM faces ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM faces WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn list(&self) -> Result<Vec<PersonRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, date_added, COALESCE(recognition_count, 0) FROM faces ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PersonRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    date_added: row.get(2)?,
                    recognition_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_person(&self, name: &str) -> Result<usize, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM faces WHERE name = ?1", params![name])?;
        tracing::info!(name, rows = n, "person deleted");
        Ok(n)
    }

    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let n = self.conn.execute("DELETE FROM faces", [])?;
        tracing::info!(rows = n, "all persons deleted");
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list() {
        let store = FaceStore::open_in_memory().unwrap();
        let id = store.add_person("alice").unwrap();
        store.add_person("bob").unwrap();

        assert_eq!(store.face_count().unwrap(), 2);
        assert_eq!(store.names().unwrap(), vec!["alice", "bob"]);

        let rows = store.list().unwrap();
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].recognition_count, 0);
        assert!(chrono::NaiveDateTime::parse_from_str(&rows[0].date_added, DATE_FORMAT).is_ok());
    }

    #[test]
    fn test_increment() {
        let store = FaceStore::open_in_memory().unwrap();
        store.add_person("alice").unwrap();
        assert_eq!(store.increment_recognition("alice").unwrap(), 1);
        assert_eq!(store.increment_recognition("alice").unwrap(), 1);
        assert_eq!(store.increment_recognition("nobody").unwrap(), 0);
        assert_eq!(store.list().unwrap()[0].recognition_count, 2);
    }

    #[test]
    fn test_delete() {
        let store = FaceStore::open_in_memory().unwrap();
        store.add_person("alice").unwrap();
        store.add_person("bob").unwrap();
        assert!(store.contains("bob").unwrap());

        assert_eq!(store.delete_person("bob").unwrap(), 1);
        assert!(!store.contains("bob").unwrap());
        assert_eq!(store.delete_all().unwrap(), 1);
        assert_eq!(store.face_count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.db");
        FaceStore::open(&path).unwrap().add_person("alice").unwrap();
        let store = FaceStore::open(&path).unwrap();
        assert_eq!(store.names().unwrap(), vec!["alice"]);
    }
}
