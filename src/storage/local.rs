//! Local filesystem state store.
//!
//! All writes go to a temp file first and are renamed into place, so a
//! crash mid-write never corrupts previously-saved state.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{StationRoutes, SubscriptionBook};
use crate::storage::{HistoryStore, NotificationHistory};

const HISTORY_FILE: &str = "history.json";
const CATALOG_FILE: &str = "catalog.json";
const FAVORITES_FILE: &str = "favorites.json";
const DATE_FILTERS_FILE: &str = "date_filters.json";

/// JSON file store rooted at a state directory.
#[derive(Clone)]
pub struct JsonStateStore {
    root_dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes)
            .await
            .map_err(|e| AppError::persistence(self.path(key).display().to_string(), e))
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist the latest route catalog snapshot.
    pub async fn save_catalog(&self, catalog: &[StationRoutes]) -> Result<()> {
        self.write_json(CATALOG_FILE, catalog).await
    }

    /// Load the last persisted catalog snapshot, empty when absent.
    pub async fn load_catalog(&self) -> Result<Vec<StationRoutes>> {
        Ok(self.read_json(CATALOG_FILE).await?.unwrap_or_default())
    }

    /// Load subscriber favorites and date filters.
    ///
    /// Missing files mean no subscribers of that kind; malformed date
    /// ranges are skipped inside [`SubscriptionBook::from_raw`].
    pub async fn load_subscriptions(&self) -> Result<SubscriptionBook> {
        let favorites: HashMap<String, Vec<String>> = self
            .read_json(FAVORITES_FILE)
            .await?
            .unwrap_or_default();
        let raw_ranges: HashMap<String, serde_json::Value> = self
            .read_json(DATE_FILTERS_FILE)
            .await?
            .unwrap_or_default();
        Ok(SubscriptionBook::from_raw(favorites, raw_ranges))
    }
}

#[async_trait]
impl HistoryStore for JsonStateStore {
    async fn load(&self) -> Result<NotificationHistory> {
        match self.read_json(HISTORY_FILE).await? {
            Some(history) => Ok(history),
            None => {
                log::warn!("No {HISTORY_FILE} found, starting with empty history");
                Ok(NotificationHistory::default())
            }
        }
    }

    async fn save(&self, history: &NotificationHistory) -> Result<()> {
        self.write_json(HISTORY_FILE, history).await
    }
}
