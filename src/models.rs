//! Data models shared across the pipeline.
//!
//! - [`Subscription`]: one entry of the subscription snapshot, as listed by the relay
//! - [`Source`]: the `{id, name}` pair the fetcher polls
//! - [`Article`]: canonical record produced by the normalizer
//! - [`FrontendRecord`]: the shape persisted in the unified frontend store
//!
//! Raw upstream items never get a struct of their own: their shape varies by
//! source type, so they stay `serde_json::Value` until normalized.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{china_offset, iso_seconds};

/// A subscribed publisher feed, as written to `subscriptions.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub cover: String,
    pub intro: String,
}

/// One feed to poll during a run. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl Source {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl From<&Subscription> for Source {
    fn from(sub: &Subscription) -> Self {
        Source::new(sub.id.clone(), sub.name.clone())
    }
}

/// Canonical article record.
///
/// `fingerprint` is the identity key inside one run and is serialized as the
/// internal `_uid` field of `articles.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Article {
    pub account_name: String,
    pub account_id: String,
    pub title: String,
    pub url: String,
    #[serde(with = "iso_seconds")]
    pub publish_time: DateTime<Utc>,
    pub summary: String,
    #[serde(rename = "_uid")]
    pub fingerprint: String,
}

impl Article {
    /// Publish time as the normalized ISO-8601 UTC string used for watermarks.
    pub fn publish_time_iso(&self) -> String {
        iso_seconds::format(&self.publish_time)
    }

    /// `YYYY-MM-DD` of the UTC publish time.
    pub fn publish_date(&self) -> String {
        self.publish_time.format("%Y-%m-%d").to_string()
    }

    /// `YYYY-MM-DD` of the publish time on the UTC+8 calendar.
    pub fn local_date(&self) -> String {
        let local: DateTime<FixedOffset> = self.publish_time.with_timezone(&china_offset());
        local.format("%Y-%m-%d").to_string()
    }
}

/// Record shape of the unified frontend store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendRecord {
    pub id: String,
    pub date: String,
    pub source_type: String,
    pub source_name: String,
    pub company: String,
    pub language: String,
    pub title: String,
    pub summary: String,
    pub url: String,
}
