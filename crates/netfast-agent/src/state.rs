//! Persisted filter state.
//!
//! Remembers which provider was last confirmed in effect so status can show
//! it after the live resolvers stop matching, and so restore knows what to
//! re-apply after a restart.

use chrono::{DateTime, Utc};
use netfast_core::{FilterError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// On-disk record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRecord {
    /// Profile name last confirmed live
    pub filter_type: String,

    /// When it was confirmed
    pub timestamp: DateTime<Utc>,
}

/// Default state file location: `<data dir>/netfast/filter_state.json`
pub fn default_state_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("netfast").join("filter_state.json"))
}

/// JSON file holding the last confirmed filter.
///
/// Clones share one write lock, so saves through any of them are serialized.
#[derive(Debug, Clone)]
pub struct FilterStateStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FilterStateStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store at the default location.
    pub fn at_default_location() -> Result<Self> {
        default_state_path()
            .map(Self::new)
            .ok_or_else(|| FilterError::State("no data directory for this user".to_string()))
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record.
    ///
    /// A missing file is not an error; nothing has been confirmed yet.
    pub fn load(&self) -> Result<Option<FilterRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            FilterError::State(format!("failed to read {}: {e}", self.path.display()))
        })?;

        let record = serde_json::from_str(&content)
            .map_err(|e| FilterError::State(format!("failed to parse state: {e}")))?;

        Ok(Some(record))
    }

    /// Record `filter_type` as confirmed.
    ///
    /// If the file already names `filter_type` it is left alone and the
    /// existing record is returned. Blocking; async callers should go
    /// through `spawn_blocking`.
    pub fn save(&self, filter_type: &str) -> Result<FilterRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Ok(Some(existing)) = self.load() {
            if existing.filter_type == filter_type {
                debug!(filter_type, "filter state unchanged");
                return Ok(existing);
            }
        }

        let record = FilterRecord {
            filter_type: filter_type.to_string(),
            timestamp: Utc::now(),
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| {
            FilterError::State(format!("failed to create {}: {e}", parent.display()))
        })?;

        // Stage in a uniquely named file beside the target, then rename over it
        let body = serde_json::to_string_pretty(&record)?;
        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
            FilterError::State(format!("failed to stage in {}: {e}", parent.display()))
        })?;
        staged
            .write_all(body.as_bytes())
            .map_err(|e| FilterError::State(format!("failed to write staged state: {e}")))?;
        staged.persist(&self.path).map_err(|e| {
            FilterError::State(format!("failed to replace {}: {}", self.path.display(), e.error))
        })?;

        Ok(record)
    }

    /// Last confirmed profile name; unreadable state counts as none.
    #[must_use]
    pub fn last_filter_type(&self) -> Option<String> {
        match self.load() {
            Ok(record) => record.map(|r| r.filter_type),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable filter state");
                None
            }
        }
    }
}
