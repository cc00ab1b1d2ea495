//! Cross-run unified frontend store.
//!
//! The store is keyed by `url`, which is a different identity from the
//! per-run fingerprint: an article republished under a new title on a new day
//! is still the same page for the frontend. Merging only ever appends:
//!
//! - records without a `url` are never stored
//! - a record whose `url` is already stored is dropped, fields untouched
//!
//! Existing records are kept as raw JSON so fields added downstream survive
//! a rewrite unchanged.

use itertools::Itertools;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::config::FrontendConfig;
use crate::error::HarvestError;
use crate::models::{Article, FrontendRecord};
use crate::outputs::json::{read_json, write_json_pretty};

/// Shape an accepted article for the frontend.
pub fn to_frontend(article: &Article, frontend: &FrontendConfig) -> FrontendRecord {
    FrontendRecord {
        id: article.fingerprint.clone(),
        date: article.local_date(),
        source_type: frontend.source_type.clone(),
        source_name: article.account_name.clone(),
        company: article.account_name.clone(),
        language: frontend.language.clone(),
        title: article.title.clone(),
        summary: article.summary.clone(),
        url: article.url.clone(),
    }
}

fn url_of(record: &Value) -> &str {
    record.get("url").and_then(Value::as_str).unwrap_or("")
}

fn date_of(record: &Value) -> &str {
    record.get("date").and_then(Value::as_str).unwrap_or("")
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// Full replacement content, most recent `date` first.
    pub records: Vec<Value>,
    /// How many incoming records were appended.
    pub added: usize,
}

/// Union `incoming` into `existing` by `url`.
///
/// # Arguments
///
/// * `existing` - Stored records as raw JSON, kept verbatim
/// * `incoming` - This run's records, already shaped for the frontend
///
/// # Returns
///
/// The full replacement content, sorted by `date` descending, and the number
/// of records appended. Incoming records with an empty or already stored
/// `url` are dropped, as are repeats of a `url` within `incoming`.
///
/// # Errors
///
/// [`HarvestError::Json`] if an incoming record cannot be serialized.
pub fn merge(existing: Vec<Value>, incoming: Vec<FrontendRecord>) -> Result<Merged, HarvestError> {
    let known: HashSet<String> = existing.iter().map(|r| url_of(r).to_string()).collect();

    let fresh: Vec<FrontendRecord> = incoming
        .into_iter()
        .filter(|r| !r.url.is_empty() && !known.contains(&r.url))
        .unique_by(|r| r.url.clone())
        .collect();
    let added = fresh.len();

    let mut records = existing;
    for record in fresh {
        records.push(serde_json::to_value(record)?);
    }
    records.sort_by(|a, b| date_of(b).cmp(date_of(a)));

    Ok(Merged { records, added })
}

/// File-backed frontend store.
#[derive(Debug, Clone)]
pub struct MergeStore {
    path: PathBuf,
}

impl MergeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored records. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// An unreadable or non-array file is an error rather than an empty store,
    /// so a later save cannot wipe records it failed to read.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<Value>, HarvestError> {
        let records = read_json::<Vec<Value>>(&self.path).await?.unwrap_or_default();
        info!(count = records.len(), "Loaded frontend store");
        Ok(records)
    }

    pub async fn save(&self, records: &[Value]) -> Result<(), HarvestError> {
        write_json_pretty(&self.path, records).await
    }

    /// Load, merge `articles`, and write the result back.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn merge_articles(
        &self,
        articles: &[Article],
        frontend: &FrontendConfig,
    ) -> Result<usize, HarvestError> {
        let existing = self.load().await?;
        let incoming = articles.iter().map(|a| to_frontend(a, frontend)).collect();
        let merged = merge(existing, incoming)?;
        self.save(&merged.records).await?;
        info!(added = merged.added, total = merged.records.len(), "Merged frontend store");
        Ok(merged.added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn article(title: &str, url: &str, day: u32) -> Article {
        Article {
            account_name: "Example Daily".to_string(),
            account_id: "MP_1".to_string(),
            title: title.to_string(),
            url: url.to_string(),
            publish_time: Utc.with_ymd_and_hms(2025, 5, day, 2, 0, 0).unwrap(),
            summary: format!("about {title}"),
            fingerprint: format!("fp-{title}"),
        }
    }

    fn records(articles: &[Article]) -> Vec<FrontendRecord> {
        articles
            .iter()
            .map(|a| to_frontend(a, &FrontendConfig::default()))
            .collect()
    }

    #[test]
    fn test_to_frontend_shape() {
        let a = Article {
            publish_time: Utc.with_ymd_and_hms(2025, 5, 6, 20, 0, 0).unwrap(),
            ..article("T", "https://u/1", 6)
        };
        let r = to_frontend(&a, &FrontendConfig::default());
        assert_eq!(r.id, "fp-T");
        // 20:00 UTC is the next day at UTC+8
        assert_eq!(r.date, "2025-05-07");
        assert_eq!(r.source_type, "wechat");
        assert_eq!(r.source_name, "Example Daily");
        assert_eq!(r.company, "Example Daily");
        assert_eq!(r.language, "zh");
    }

    #[test]
    fn test_existing_url_is_never_overwritten() {
        let stored = json!({
            "id": "old",
            "date": "2025-05-01",
            "sourceType": "wechat",
            "sourceName": "Example Daily",
            "company": "Example Daily",
            "language": "zh",
            "title": "Original title",
            "summary": "",
            "url": "https://u/1",
            "tags": ["enriched", "by", "frontend"]
        });
        let before = serde_json::to_string(&stored).unwrap();

        let merged = merge(
            vec![stored],
            records(&[article("Richer title", "https://u/1", 6)]),
        )
        .unwrap();

        assert_eq!(merged.added, 0);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(serde_json::to_string(&merged.records[0]).unwrap(), before);
    }

    #[test]
    fn test_empty_urls_are_excluded() {
        let merged = merge(vec![], records(&[article("No link", "", 6)])).unwrap();
        assert_eq!(merged.added, 0);
        assert!(merged.records.is_empty());
    }

    #[test]
    fn test_incoming_duplicates_collapse_by_url() {
        let merged = merge(
            vec![],
            records(&[article("A", "https://u/1", 6), article("B", "https://u/1", 5)]),
        )
        .unwrap();
        assert_eq!(merged.added, 1);
        assert_eq!(merged.records[0]["title"], "A");
    }

    #[test]
    fn test_merge_sorts_by_date_desc() {
        let existing = vec![
            json!({"date": "2025-05-03", "url": "https://u/3"}),
            json!({"date": "2025-05-01", "url": "https://u/1"}),
        ];
        let merged = merge(
            existing,
            records(&[article("Four", "https://u/4", 4), article("Two", "https://u/2", 2)]),
        )
        .unwrap();
        let dates: Vec<&str> = merged.records.iter().map(date_of).collect();
        assert_eq!(dates, vec!["2025-05-04", "2025-05-03", "2025-05-02", "2025-05-01"]);
        assert_eq!(merged.added, 2);
    }

    #[test]
    fn test_merge_is_append_only() {
        let first = merge(vec![], records(&[article("A", "https://u/a", 5)])).unwrap();
        let second = merge(
            first.records.clone(),
            records(&[article("B", "https://u/b", 6)]),
        )
        .unwrap();
        for record in &first.records {
            assert!(second.records.contains(record));
        }
        assert_eq!(second.records.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_articles_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MergeStore::new(tmp.path().join("unified_articles.json"));

        let added = store
            .merge_articles(&[article("A", "https://u/a", 5)], &FrontendConfig::default())
            .await
            .unwrap();
        assert_eq!(added, 1);

        let added = store
            .merge_articles(
                &[article("A again", "https://u/a", 6), article("B", "https://u/b", 6)],
                &FrontendConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(added, 1);

        let stored = store.load().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1]["title"], "A");
    }

    #[tokio::test]
    async fn test_corrupt_store_is_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MergeStore::new(tmp.path().join("unified_articles.json"));
        tokio::fs::write(store.path(), "{broken").await.unwrap();

        let res = store
            .merge_articles(&[article("A", "https://u/a", 5)], &FrontendConfig::default())
            .await;
        assert!(res.is_err());
        assert_eq!(
            tokio::fs::read_to_string(store.path()).await.unwrap(),
            "{broken"
        );
    }
}
