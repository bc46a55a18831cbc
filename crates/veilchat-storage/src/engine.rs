//! Storage engine: database lifecycle and tree access.
//!
//! The [`StorageEngine`] owns the sled database. On
//! [`open`](StorageEngine::open) it opens the database and pre-creates
//! all required trees.

use std::path::Path;

use veilchat_types::{Result, VeilchatError};

use crate::messages::MessageLog;

/// Tree holding the append-only message log.
const MESSAGES_TREE: &str = "messages";

// ---------------------------------------------------------------------------
// StorageEngine
// ---------------------------------------------------------------------------

/// Sled-backed storage engine.
pub struct StorageEngine {
    db: sled::Db,
}

impl StorageEngine {
    /// Opens (or creates) the storage engine at `path`.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Storage`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| VeilchatError::Storage {
            reason: format!("failed to open sled database: {e}"),
        })?;

        // Pre-create all trees so they exist for later access.
        db.open_tree(MESSAGES_TREE)
            .map_err(|e| VeilchatError::Storage {
                reason: format!("failed to open tree '{MESSAGES_TREE}': {e}"),
            })?;

        Ok(Self { db })
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| VeilchatError::Storage {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }

    /// Returns the [`MessageLog`] for this engine.
    ///
    /// The log holds its own handle to the underlying tree, so it can
    /// be shared across tasks independently of the engine borrow.
    pub fn messages(&self) -> Result<MessageLog> {
        let tree = self
            .db
            .open_tree(MESSAGES_TREE)
            .map_err(|e| VeilchatError::Storage {
                reason: format!("failed to open tree '{MESSAGES_TREE}': {e}"),
            })?;
        Ok(MessageLog::new(self.db.clone(), tree))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_flush() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = StorageEngine::open(dir.path())?;
        engine.flush()?;
        Ok(())
    }

    #[test]
    fn reopen_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let engine = StorageEngine::open(dir.path())?;
            engine.flush()?;
        }
        let engine = StorageEngine::open(dir.path())?;
        let _ = engine.messages()?;
        Ok(())
    }
}
