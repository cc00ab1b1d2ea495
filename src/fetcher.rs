//! Paginated retrieval of one source's article listing.
//!
//! Pages are requested strictly in order, page N+1 only after page N. A
//! source stops when it has `max_count` articles, returns a page shorter than
//! `min_page_size`, or returns no items at all.
//!
//! Failures stay local to the source: anything but an auth error is logged,
//! ends pagination for that source, and the articles gathered so far are kept.

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::api::{JsonTransport, RetryClient};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::models::{Article, Source};
use crate::normalize::{ARTICLE_LIST_KEYS, item_list, normalize};

/// What one source contributed to the run.
#[derive(Debug, Default)]
pub struct SourceHarvest {
    pub articles: Vec<Article>,
    /// Pages that answered successfully.
    pub pages: usize,
    /// Why pagination stopped early, when it did.
    pub failure: Option<String>,
}

impl SourceHarvest {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Fetch up to `max_count` articles for `source`.
///
/// # Arguments
///
/// * `client` - Relay client with the retry policy applied
/// * `config` - Feed URL template, pagination parameter, page size and delays
/// * `source` - The feed to page through
/// * `max_count` - Cap on returned articles; the last page is truncated to fit
/// * `now` - Run time, passed to the normalizer as the publish-time fallback
///
/// # Returns
///
/// The normalized articles in page order, the number of pages answered, and
/// the reason pagination stopped early if a page failed.
///
/// # Errors
///
/// Only [`HarvestError::Auth`]. Every other failure is folded into
/// [`SourceHarvest::failure`].
#[instrument(level = "info", skip_all, fields(source = %source.id, name = %source.display_name))]
pub async fn fetch_articles<T: JsonTransport>(
    client: &RetryClient<T>,
    config: &HarvestConfig,
    source: &Source,
    max_count: usize,
    now: DateTime<Utc>,
) -> Result<SourceHarvest, HarvestError> {
    let mut harvest = SourceHarvest::default();

    let url = match config.feed_url_for(&source.id) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Skipping source with unusable feed URL");
            harvest.failure = Some(e.to_string());
            return Ok(harvest);
        }
    };

    let mut offset = 0usize;
    while harvest.articles.len() < max_count {
        let params = vec![(config.pagination_param.clone(), offset.to_string())];
        let data = match client.fetch(&url, &params).await {
            Ok(data) => data,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!(
                    offset,
                    kept = harvest.articles.len(),
                    error = %e,
                    "Skipping remaining pages of [{}]",
                    source.display_name
                );
                harvest.failure = Some(e.to_string());
                break;
            }
        };
        harvest.pages += 1;

        let items = item_list(&data, ARTICLE_LIST_KEYS);
        if items.is_empty() {
            debug!(offset, "Empty page; source exhausted");
            break;
        }

        let before = harvest.articles.len();
        harvest.articles.extend(
            items
                .iter()
                .filter_map(|raw| normalize(raw, source, now, config.summary_max_chars)),
        );
        debug!(
            offset,
            items = items.len(),
            normalized = harvest.articles.len() - before,
            "Fetched page"
        );

        if items.len() < config.min_page_size {
            break;
        }
        offset += items.len();
        if harvest.articles.len() < max_count {
            sleep(config.page_delay()).await;
        }
    }

    harvest.articles.truncate(max_count);
    info!(
        count = harvest.articles.len(),
        pages = harvest.pages,
        failed = harvest.failed(),
        "[{}] fetched articles",
        source.display_name
    );
    Ok(harvest)
}
