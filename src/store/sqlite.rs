//! SQLite-backed message store

use std::path::Path;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use super::MessageStore;
use crate::message::{Message, MessageKind, Role};
use crate::{Error, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Message store backed by a local `SQLite` database
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (or create) a database file
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or migrated
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| Error::Database(e.to_string()))?;

        let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
        init_schema(&conn)?;

        tracing::info!(version = SCHEMA_VERSION, "message store initialized");
        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing)
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be initialized
    pub fn open_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Database(e.to_string()))?;

        let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
        init_schema(&conn)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn put(&self, message: &Message) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO messages (id, role, kind, content, audio, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.id,
                message.role.as_str(),
                message.kind.as_str(),
                message.content,
                message.audio,
                message.timestamp,
            ],
        )?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, role, kind, content, audio, timestamp FROM messages")?;

        let messages = stmt
            .query_map([], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    role: Role::from_str(&row.get::<_, String>(1)?).unwrap_or(Role::User),
                    kind: MessageKind::from_str(&row.get::<_, String>(2)?)
                        .unwrap_or(MessageKind::Text),
                    content: row.get(3)?,
                    audio: row.get(4)?,
                    timestamp: row.get(5)?,
                    persisted: true,
                })
            })?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(messages)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM messages", [])?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            kind TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            audio BLOB,
            timestamp INTEGER NOT NULL
        );

        PRAGMA user_version = 1;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> Message {
        Message::new(Role::User, MessageKind::Text, content.to_string(), None)
    }

    #[tokio::test]
    async fn test_put_and_get_all() {
        let store = SqliteStore::open_memory().unwrap();

        store.put(&message("hello")).await.unwrap();
        store.put(&message("world")).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|m| m.persisted));
    }

    #[tokio::test]
    async fn test_put_is_idempotent_upsert() {
        let store = SqliteStore::open_memory().unwrap();

        let mut msg = message("draft");
        store.put(&msg).await.unwrap();

        msg.content = "final".to_string();
        store.put(&msg).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "final");
    }

    #[tokio::test]
    async fn test_audio_blob_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();

        let msg = Message::new(
            Role::Assistant,
            MessageKind::Audio,
            "hi".to_string(),
            Some(vec![0x52, 0x49, 0x46, 0x46]),
        );
        store.put(&msg).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all[0].kind, MessageKind::Audio);
        assert_eq!(all[0].audio.as_deref(), Some(&[0x52, 0x49, 0x46, 0x46][..]));
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let store = SqliteStore::open_memory().unwrap();
        store.remove("no-such-id").await.unwrap();

        store.put(&message("keep")).await.unwrap();
        let id = store.get_all().await.unwrap()[0].id.clone();
        store.remove(&id).await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = SqliteStore::open_memory().unwrap();
        store.put(&message("a")).await.unwrap();
        store.put(&message("b")).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(&message("survives")).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "survives");
    }
}
