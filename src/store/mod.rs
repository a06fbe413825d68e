//! Message persistence
//!
//! The conversation controller only depends on the [`MessageStore`]
//! capability; [`SqliteStore`] is the shipped implementation. Store
//! failures are best-effort from the controller's point of view —
//! persistence exists for restart recovery, not as a transactional
//! guarantee.

mod sqlite;

use async_trait::async_trait;

use crate::Result;
use crate::message::Message;

pub use sqlite::SqliteStore;

/// Durable keyed persistence for conversation messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Upsert a message keyed by id; overwrites on duplicate id
    async fn put(&self, message: &Message) -> Result<()>;

    /// All persisted messages; order is unspecified, sorting is the
    /// caller's responsibility
    async fn get_all(&self) -> Result<Vec<Message>>;

    /// Delete by id; no-op if absent
    async fn remove(&self, id: &str) -> Result<()>;

    /// Delete all records
    async fn clear(&self) -> Result<()>;
}
