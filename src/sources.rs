//! Source directory: which feeds a run polls.
//!
//! Either a static list from the configuration, or the relay's subscription
//! listing normalized into [`Subscription`] records. Both end up as
//! [`Source`]s for the fetcher.

use serde_json::Value;
use tracing::{info, instrument, warn};
use url::Url;

use crate::api::{JsonTransport, RetryClient};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::models::{Source, Subscription};
use crate::normalize::{first_present, first_text, item_list, value_text};
use crate::utils::truncate_for_log;

/// Keys that may hold the subscription array.
pub const SUBSCRIPTION_LIST_KEYS: &[&str] = &[
    "mps",
    "subscriptions",
    "mpList",
    "sources",
    "items",
    "list",
    "data",
];

pub const SOURCE_ID_KEYS: &[&str] = &["id", "mpId", "sourceId", "vid", "bookId"];
pub const SOURCE_NAME_KEYS: &[&str] = &["name", "title", "mpName", "nickName"];
pub const SOURCE_COVER_KEYS: &[&str] = &["cover", "avatar", "icon"];
pub const SOURCE_INTRO_KEYS: &[&str] = &["intro", "desc", "description"];

/// Normalize a subscription listing response. Entries without an id are dropped.
pub fn parse_subscriptions(data: &Value) -> Vec<Subscription> {
    item_list(data, SUBSCRIPTION_LIST_KEYS)
        .iter()
        .filter_map(|raw| {
            let id = first_present(raw, SOURCE_ID_KEYS).and_then(value_text)?;
            let name = match first_text(raw, SOURCE_NAME_KEYS) {
                n if n.is_empty() => id.clone(),
                n => n,
            };
            Some(Subscription {
                id,
                name,
                cover: first_text(raw, SOURCE_COVER_KEYS),
                intro: first_text(raw, SOURCE_INTRO_KEYS),
            })
        })
        .collect()
}

/// Fetch the subscription listing from the relay.
///
/// An empty listing is not an error; it is logged with a preview of the
/// response so a changed upstream shape is easy to spot.
#[instrument(level = "info", skip_all)]
pub async fn fetch_subscriptions<T: JsonTransport>(
    client: &RetryClient<T>,
    config: &HarvestConfig,
) -> Result<Vec<Subscription>, HarvestError> {
    let url = Url::parse(&config.subscriptions_url)
        .map_err(|e| HarvestError::Config(format!("subscriptions_url: {e}")))?;
    let params: Vec<(String, String)> = config
        .subscriptions_params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let data = client.fetch(&url, &params).await?;
    let subscriptions = parse_subscriptions(&data);

    if subscriptions.is_empty() {
        let shape = match &data {
            Value::Object(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
            other => other.to_string(),
        };
        warn!(
            response_shape = %truncate_for_log(&shape, 200),
            "Subscription listing is empty"
        );
    } else {
        info!(count = subscriptions.len(), "Fetched subscriptions");
    }
    Ok(subscriptions)
}

/// Resolve the sources for this run.
///
/// Returns the subscription snapshot alongside the sources. The snapshot is
/// `None` for a static directory, which has nothing new to persist.
#[instrument(level = "info", skip_all)]
pub async fn resolve_sources<T: JsonTransport>(
    client: &RetryClient<T>,
    config: &HarvestConfig,
) -> Result<(Vec<Source>, Option<Vec<Subscription>>), HarvestError> {
    if !config.sources.is_empty() {
        info!(count = config.sources.len(), "Using static source directory");
        return Ok((config.sources.clone(), None));
    }
    let subscriptions = fetch_subscriptions(client, config).await?;
    let sources = subscriptions.iter().map(Source::from).collect();
    Ok((sources, Some(subscriptions)))
}
