//! Conversation store: conversations, messages, embeddings and the similarity scan.
//!
//! The submodules are plain functions over a [`rusqlite::Connection`]. [`Store`] wraps one
//! shared connection so async callers can run those functions on the blocking pool.

pub mod conversations;
pub mod embeddings;
pub mod messages;
pub mod search;
pub mod stats;
pub mod types;

use chrono::SecondsFormat;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{ChatError, Result};

/// Current time as an RFC 3339 UTC timestamp with microsecond precision.
///
/// Fixed-width output keeps lexicographic order equal to chronological order.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Shared handle to the chat database.
///
/// Cloning is cheap; every clone talks to the same connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = crate::db::open_database(path)
            .map_err(|e| ChatError::Persistence(format!("{e:#}")))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = crate::db::open_memory_database()
            .map_err(|e| ChatError::Persistence(format!("{e:#}")))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| ChatError::Persistence(format!("database lock poisoned: {e}")))?;
            f(&mut guard).map_err(|e| ChatError::Persistence(format!("{e:#}")))
        })
        .await
        .map_err(|e| ChatError::Persistence(format!("blocking task failed: {e}")))?
    }

    /// Close the underlying connection, flushing the WAL.
    ///
    /// If other clones are still alive the connection stays open until the last one drops.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex
                    .into_inner()
                    .map_err(|e| ChatError::Persistence(format!("database lock poisoned: {e}")))?;
                conn.close()
                    .map_err(|(_, e)| ChatError::Persistence(e.to_string()))?;
                tracing::info!("database closed");
                Ok(())
            }
            Err(_) => {
                tracing::warn!("store still shared at shutdown; connection closes on last drop");
                Ok(())
            }
        }
    }
}
