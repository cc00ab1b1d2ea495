//! Downstream push of a run's articles.
//!
//! The pipeline hands the articles published today (UTC+8 calendar day) to a
//! [`Downstream`] once all files are written. Older in-window articles were
//! already pushed by the run of their own day and are not sent again.
//!
//! Two implementations exist:
//!
//! | Implementation | Behaviour |
//! |----------------|-----------|
//! | [`Disabled`] | accepts and discards the payload |
//! | [`Webhook`] | POSTs the payload as JSON |
//!
//! A failing push is logged by the caller and never fails the run. A run with
//! nothing published today pushes nothing.
//!
//! # Payload
//!
//! ```json
//! {
//!   "date": "2025-05-06",
//!   "count": 1,
//!   "articles": [
//!     {"title": "...", "url": "...", "account_name": "...", "publish_time": "2025-05-06T08:30:00+00:00"}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::HarvestError;
use crate::models::Article;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DownstreamArticle {
    pub title: String,
    pub url: String,
    pub account_name: String,
    pub publish_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DownstreamPayload {
    pub date: String,
    pub count: usize,
    pub articles: Vec<DownstreamArticle>,
}

impl DownstreamPayload {
    pub fn new(date: impl Into<String>, articles: &[&Article]) -> Self {
        Self {
            date: date.into(),
            count: articles.len(),
            articles: articles
                .iter()
                .map(|a| DownstreamArticle {
                    title: a.title.clone(),
                    url: a.url.clone(),
                    account_name: a.account_name.clone(),
                    publish_time: a.publish_time_iso(),
                })
                .collect(),
        }
    }
}

/// Receiver of a run's articles.
pub trait Downstream {
    async fn push(&self, payload: &DownstreamPayload) -> Result<(), HarvestError>;
}

/// No downstream configured.
#[derive(Debug, Default)]
pub struct Disabled;

impl Downstream for Disabled {
    async fn push(&self, _payload: &DownstreamPayload) -> Result<(), HarvestError> {
        Ok(())
    }
}

/// JSON webhook.
///
/// Uses its own client: the relay credential must never travel to a
/// third-party endpoint.
#[derive(Debug)]
pub struct Webhook {
    client: reqwest::Client,
    url: String,
}

impl Webhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Downstream for Webhook {
    #[instrument(level = "info", skip_all, fields(count = payload.count))]
    async fn push(&self, payload: &DownstreamPayload) -> Result<(), HarvestError> {
        self.client
            .post(&self.url)
            .json(payload)
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| HarvestError::Downstream(e.to_string()))?;
        info!(count = payload.count, "Pushed articles downstream");
        Ok(())
    }
}

/// Either downstream, chosen at startup.
#[derive(Debug)]
pub enum Configured {
    Disabled(Disabled),
    Webhook(Webhook),
}

impl Configured {
    pub fn from_url(url: Option<&str>) -> Self {
        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(u) => Configured::Webhook(Webhook::new(u)),
            None => Configured::Disabled(Disabled),
        }
    }
}

impl Downstream for Configured {
    async fn push(&self, payload: &DownstreamPayload) -> Result<(), HarvestError> {
        match self {
            Configured::Disabled(d) => d.push(payload).await,
            Configured::Webhook(w) => w.push(payload).await,
        }
    }
}

/// Records payloads in memory for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Recording {
    pub payloads: std::sync::Mutex<Vec<DownstreamPayload>>,
}

#[cfg(test)]
impl Downstream for Recording {
    async fn push(&self, payload: &DownstreamPayload) -> Result<(), HarvestError> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
