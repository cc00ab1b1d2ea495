//! Per-source watermarks persisted across runs.
//!
//! A watermark is the latest publish time observed for a source, stored as a
//! normalized ISO-8601 UTC string. Watermarks only move forward: because every
//! stored value has the same `YYYY-MM-DDTHH:MM:SS+00:00` shape, string order
//! is time order.
//!
//! Watermarks are recorded for incremental awareness; they do not cause any
//! page to be skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::error::HarvestError;
use crate::models::Article;
use crate::outputs::json::{read_json, write_json_pretty};

/// `source_id -> latest publish time`.
pub type Watermarks = BTreeMap<String, String>;

/// File-backed watermark map.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the map. A missing or unreadable file starts from empty state.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Watermarks {
        match read_json::<Watermarks>(&self.path).await {
            Ok(Some(map)) => {
                info!(sources = map.len(), "Loaded watermarks");
                map
            }
            Ok(None) => {
                info!("No state file; starting from empty watermarks");
                Watermarks::new()
            }
            Err(e) => {
                warn!(error = %e, "State file unreadable; starting from empty watermarks");
                Watermarks::new()
            }
        }
    }

    /// Replace the file with `watermarks`.
    pub async fn save(&self, watermarks: &Watermarks) -> Result<(), HarvestError> {
        write_json_pretty(&self.path, watermarks).await
    }
}

/// Advance `source_id`'s watermark to the newest of `articles`.
///
/// Returns `true` when the stored value changed. An empty batch, or one whose
/// newest article is not newer than the stored watermark, leaves it alone.
pub fn advance(watermarks: &mut Watermarks, source_id: &str, articles: &[Article]) -> bool {
    let Some(latest) = articles.iter().map(Article::publish_time_iso).max() else {
        return false;
    };
    match watermarks.get(source_id) {
        Some(prior) if prior.as_str() >= latest.as_str() => {
            debug!(source = source_id, %prior, observed = %latest, "Watermark unchanged");
            false
        }
        _ => {
            watermarks.insert(source_id.to_string(), latest);
            true
        }
    }
}
