//! Generation history persisted as a JSON array under a fixed key.
//!
//! The store is agnostic of where the bytes live: anything implementing
//! [`Storage`] (browser local storage, a file, a map) can back it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::AspectRatio;

/// Key the history array is stored under.
pub const STORAGE_KEY: &str = "banner_generations";

/// Errors from the history store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Records could not be serialized.
    #[error("failed to serialize generation history: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// String key/value storage.
pub trait Storage {
    /// Read the value under `key`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the backend cannot be written.
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
}

/// In-memory [`Storage`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }
}

/// A saved generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    /// Creation time in epoch milliseconds; unique within a store.
    pub id: i64,
    /// Where the generated image lives.
    pub image_url: String,
    /// Prompt that produced it.
    pub prompt: String,
    /// Requested aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// When the generation was made.
    pub created_at: DateTime<Utc>,
}

/// A generation to be saved; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGeneration {
    /// Where the generated image lives.
    pub image_url: String,
    /// Prompt that produced it.
    pub prompt: String,
    /// Requested aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// Creation time; defaults to the save time.
    pub created_at: Option<DateTime<Utc>>,
}

/// Newest-first generation history over a [`Storage`] backend.
#[derive(Debug, Clone, Default)]
pub struct GenerationStore<S> {
    storage: S,
}

impl<S: Storage> GenerationStore<S> {
    /// Wrap a storage backend.
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// The underlying backend.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Save a generation stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the history cannot be written.
    pub fn save(&mut self, generation: NewGeneration) -> Result<GenerationRecord, StoreError> {
        self.save_at(generation, Utc::now())
    }

    /// Save a generation as if the current time were `now`.
    ///
    /// The id is `now` in epoch milliseconds, bumped past the newest
    /// existing id when two saves land in the same millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the history cannot be written.
    pub fn save_at(
        &mut self,
        generation: NewGeneration,
        now: DateTime<Utc>,
    ) -> Result<GenerationRecord, StoreError> {
        let mut records = self.list();
        let newest = records.iter().map(|r| r.id).max();
        let mut id = now.timestamp_millis();
        if let Some(newest) = newest
            && id <= newest
        {
            id = newest + 1;
        }
        let record = GenerationRecord {
            id,
            image_url: generation.image_url,
            prompt: generation.prompt,
            aspect_ratio: generation.aspect_ratio,
            created_at: generation.created_at.unwrap_or(now),
        };
        records.insert(0, record.clone());
        self.persist(&records)?;
        log::debug!("saved generation {id}");
        Ok(record)
    }

    /// All records, newest first.
    ///
    /// Unreadable history is logged and treated as empty.
    pub fn list(&self) -> Vec<GenerationRecord> {
        let raw = match self.storage.get(STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("failed to read generation history: {e}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable generation history: {e}");
            Vec::new()
        })
    }

    /// Remove the record with `id`. Returns whether one was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the history cannot be written.
    pub fn delete(&mut self, id: i64) -> Result<bool, StoreError> {
        let mut records = self.list();
        let before = records.len();
        records.retain(|r| r.id != id);
        self.persist(&records)?;
        Ok(records.len() != before)
    }

    fn persist(&mut self, records: &[GenerationRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string(records)?;
        self.storage.set(STORAGE_KEY, json)
    }
}
