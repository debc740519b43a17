//! JSON file backed target store
//!
//! The file holds a JSON array of targets. It is re-parsed only when its
//! modification time changes.

use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use super::{sort_targets, validate_targets, MonitoredTarget, TargetStore};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct CachedList {
    modified: SystemTime,
    targets: Vec<MonitoredTarget>,
}

/// Target list loaded from a JSON file
#[derive(Debug)]
pub struct FileTargetStore {
    path: PathBuf,
    cache: Mutex<Option<CachedList>>,
}

impl FileTargetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    fn store_error(&self, what: &str, e: impl std::fmt::Display) -> Error {
        Error::TargetStore(format!("{} {}: {}", what, self.path.display(), e))
    }
}

#[async_trait]
impl TargetStore for FileTargetStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn list_targets(&self) -> Result<Vec<MonitoredTarget>> {
        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| self.store_error("cannot stat", e))?;

        let cached = self
            .cache
            .lock()
            .as_ref()
            .filter(|c| c.modified == modified)
            .map(|c| c.targets.clone());
        if let Some(targets) = cached {
            return Ok(targets);
        }

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.store_error("cannot read", e))?;
        let mut targets: Vec<MonitoredTarget> =
            serde_json::from_str(&raw).map_err(|e| self.store_error("invalid target list in", e))?;
        validate_targets(&targets)?;
        sort_targets(&mut targets);

        debug!("Loaded {} targets", targets.len());
        *self.cache.lock() = Some(CachedList {
            modified,
            targets: targets.clone(),
        });
        Ok(targets)
    }
}
