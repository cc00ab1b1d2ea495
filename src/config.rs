//! Harvest configuration.
//!
//! Loaded from an optional YAML file; every field has a default so an empty
//! or absent file yields a working setup against the WeRead relay.
//!
//! ```yaml
//! recent_days: 3
//! articles_per_source: 40
//! sources:
//!   - id: MP_WXS_123
//!     name: Example Daily
//! frontend:
//!   language: en
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

use crate::error::HarvestError;
use crate::models::Source;

/// Placeholder substituted with the (percent-encoded) source id in [`HarvestConfig::feed_url`].
pub const SOURCE_ID_PLACEHOLDER: &str = "{source_id}";

/// Largest accepted retention window, in days.
pub const MAX_RECENT_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HarvestConfig {
    /// Subscription listing endpoint.
    pub subscriptions_url: String,
    /// Extra query parameters for the subscription listing.
    pub subscriptions_params: BTreeMap<String, String>,
    /// Per-source article listing, with a `{source_id}` placeholder.
    pub feed_url: String,
    /// Query parameter carrying the pagination offset.
    pub pagination_param: String,
    /// A page shorter than this is the last one.
    pub min_page_size: usize,
    pub articles_per_source: usize,
    /// Retention horizon in days.
    pub recent_days: i64,
    pub summary_max_chars: usize,
    pub page_delay_ms: u64,
    pub source_delay_ms: u64,
    /// Additional attempts after the first one.
    pub retries: usize,
    /// Backoff before retry `n` (0-based) is `backoff_base^n` seconds.
    pub backoff_base: f64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub referer: String,
    pub accept_language: String,
    /// Static source directory. When non-empty the remote listing is skipped.
    pub sources: Vec<Source>,
    pub frontend: FrontendConfig,
}

/// Settings for the unified frontend store.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrontendConfig {
    pub source_type: String,
    pub language: String,
    /// File name inside the output directory.
    pub store_file: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            source_type: "wechat".to_string(),
            language: "zh".to_string(),
            store_file: "unified_articles.json".to_string(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            subscriptions_url: "https://i.weread.qq.com/mp/list".to_string(),
            subscriptions_params: BTreeMap::new(),
            feed_url: "https://i.weread.qq.com/article/list?mpId={source_id}&count=20".to_string(),
            pagination_param: "maxIndex".to_string(),
            min_page_size: 10,
            articles_per_source: 20,
            recent_days: 7,
            summary_max_chars: 200,
            page_delay_ms: 300,
            source_delay_ms: 500,
            retries: 2,
            backoff_base: 2.0,
            request_timeout_secs: 20,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
                .to_string(),
            referer: "https://weread.qq.com/".to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
            sources: Vec::new(),
            frontend: FrontendConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// Load from a YAML file, or defaults when `path` is `None`.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self, HarvestError> {
        let config = match path {
            Some(p) => {
                let raw = tokio::fs::read_to_string(p).await?;
                info!(path = %p.display(), "Loaded configuration file");
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, HarvestError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if !self.feed_url.contains(SOURCE_ID_PLACEHOLDER) {
            return Err(HarvestError::Config(format!(
                "feed_url must contain {SOURCE_ID_PLACEHOLDER}"
            )));
        }
        Url::parse(&self.feed_url.replace(SOURCE_ID_PLACEHOLDER, "sample"))
            .map_err(|e| HarvestError::Config(format!("feed_url: {e}")))?;
        if self.sources.is_empty() {
            Url::parse(&self.subscriptions_url)
                .map_err(|e| HarvestError::Config(format!("subscriptions_url: {e}")))?;
        }
        if self.pagination_param.is_empty() {
            return Err(HarvestError::Config("pagination_param is empty".into()));
        }
        if !(0..=MAX_RECENT_DAYS).contains(&self.recent_days) {
            return Err(HarvestError::Config(format!(
                "recent_days must be between 0 and {MAX_RECENT_DAYS}, got {}",
                self.recent_days
            )));
        }
        if !(self.backoff_base.is_finite() && self.backoff_base >= 0.0) {
            return Err(HarvestError::Config("backoff_base must be a non-negative number".into()));
        }
        Ok(())
    }

    /// Article listing URL for one source.
    pub fn feed_url_for(&self, source_id: &str) -> Result<Url, HarvestError> {
        let raw = self
            .feed_url
            .replace(SOURCE_ID_PLACEHOLDER, &urlencoding::encode(source_id));
        Url::parse(&raw).map_err(|e| HarvestError::Config(format!("feed_url for {source_id}: {e}")))
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn source_delay(&self) -> Duration {
        Duration::from_millis(self.source_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.recent_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(HarvestConfig::from_yaml("").unwrap(), HarvestConfig::default());
        assert_eq!(HarvestConfig::from_yaml("  \n").unwrap(), HarvestConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
recent_days: 3
sources:
  - id: MP_1
    name: Alpha
frontend:
  language: en
"#;
        let config = HarvestConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.recent_days, 3);
        assert_eq!(config.sources, vec![Source::new("MP_1", "Alpha")]);
        assert_eq!(config.frontend.language, "en");
        assert_eq!(config.frontend.source_type, "wechat");
        assert_eq!(config.articles_per_source, 20);
        assert_eq!(config.pagination_param, "maxIndex");
        config.validate().unwrap();
    }

    #[test]
    fn test_feed_url_requires_placeholder() {
        let config = HarvestConfig {
            feed_url: "https://example.com/list".to_string(),
            ..HarvestConfig::default()
        };
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_feed_url_for_encodes_source_id() {
        let config = HarvestConfig::default();
        let url = config.feed_url_for("MP_WXS/12 3").unwrap();
        assert_eq!(
            url.as_str(),
            "https://i.weread.qq.com/article/list?mpId=MP_WXS%2F12%203&count=20"
        );
    }

    #[test]
    fn test_recent_days_out_of_range_rejected() {
        for days in [-1, MAX_RECENT_DAYS + 1, 100_000_000] {
            let config = HarvestConfig {
                recent_days: days,
                ..HarvestConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(HarvestError::Config(_))),
                "recent_days {days} accepted"
            );
        }
        let config = HarvestConfig {
            recent_days: MAX_RECENT_DAYS,
            ..HarvestConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(crate::filter::cutoff_for(chrono::Utc::now(), config.retention()).timestamp() < 0);
    }

    #[test]
    fn test_negative_backoff_rejected() {
        let config = HarvestConfig {
            backoff_base: -1.0,
            ..HarvestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("harvest.yaml");
        tokio::fs::write(&path, "articles_per_source: 5\n").await.unwrap();
        let config = HarvestConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.articles_per_source, 5);
    }
}
