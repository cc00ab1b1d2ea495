//! One harvest run, end to end.
//!
//! 1. **Directory**: resolve the sources (snapshot written right away)
//! 2. **Fetch**: poll sources one at a time, threading a [`DedupWindow`]
//!    and the watermark map through the loop
//! 3. **Output**: `articles.json`, `daily.md`, the frontend store, `state.json`
//! 4. **Push**: hand today's articles downstream
//!
//! Nothing under step 3 is written until every source has been polled, so an
//! auth failure mid-run leaves the previous run's files in place.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::api::{JsonTransport, RetryClient};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::fetcher::fetch_articles;
use crate::filter::{DedupWindow, cutoff_for};
use crate::outputs::json::{write_atomic, write_json_pretty};
use crate::outputs::markdown::{render_daily, todays_articles};
use crate::outputs::{ARTICLES_FILE, DAILY_FILE, STATE_FILE, SUBSCRIPTIONS_FILE};
use crate::publish::{Downstream, DownstreamPayload};
use crate::sources::resolve_sources;
use crate::state::{StateStore, advance};
use crate::store::MergeStore;
use crate::utils::china_date;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub sources: usize,
    pub sources_failed: usize,
    /// Articles normalized across all sources, before dedup and window.
    pub fetched: usize,
    /// Articles written to `articles.json`.
    pub kept: usize,
    pub today: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub watermarks_advanced: usize,
    /// `None` when the frontend store could not be updated.
    pub store_added: Option<usize>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} articles in window ({} today) from {} sources, {} failed; {} duplicates, {} stale",
            self.kept, self.today, self.sources, self.sources_failed, self.duplicates, self.stale
        )
    }
}

/// Execute one run against `client`, writing into `out_dir`.
///
/// # Arguments
///
/// * `client` - Relay client with the retry policy applied
/// * `config` - Validated configuration
/// * `out_dir` - Existing, writable output directory
/// * `downstream` - Receiver of today's articles
/// * `now` - Anchors the retention cutoff, the digest day and the fallback
///   publish time
///
/// # Returns
///
/// A [`RunReport`] with the counts of the run. Sources that failed are
/// counted there, not returned as errors.
///
/// # Errors
///
/// [`HarvestError::Auth`] aborts immediately. I/O errors on the run's own
/// output files are returned as well; per-source fetch failures are not.
#[instrument(level = "info", skip_all, fields(out_dir = %out_dir.display()))]
pub async fn run<T, D>(
    client: &RetryClient<T>,
    config: &HarvestConfig,
    out_dir: &Path,
    downstream: &D,
    now: DateTime<Utc>,
) -> Result<RunReport, HarvestError>
where
    T: JsonTransport,
    D: Downstream,
{
    let t0 = Instant::now();
    let state_store = StateStore::new(out_dir.join(STATE_FILE));
    let merge_store = MergeStore::new(out_dir.join(&config.frontend.store_file));
    let mut watermarks = state_store.load().await;
    let cutoff = cutoff_for(now, config.retention());
    let today = china_date(now);
    let mut report = RunReport::default();

    // ---- Directory ----
    let (sources, subscriptions) = resolve_sources(client, config).await?;
    if let Some(subs) = &subscriptions {
        write_json_pretty(&out_dir.join(SUBSCRIPTIONS_FILE), subs).await?;
    }
    report.sources = sources.len();
    info!(sources = sources.len(), %cutoff, "Source directory resolved");

    // ---- Fetch ----
    let mut window = DedupWindow::new(cutoff);
    for (i, source) in sources.iter().enumerate() {
        let harvest =
            fetch_articles(client, config, source, config.articles_per_source, now).await?;
        if harvest.failed() {
            report.sources_failed += 1;
        }
        report.fetched += harvest.articles.len();
        if advance(&mut watermarks, &source.id, &harvest.articles) {
            report.watermarks_advanced += 1;
        }
        window.admit(harvest.articles);

        if i + 1 < sources.len() {
            sleep(config.source_delay()).await;
        }
    }
    report.duplicates = window.duplicates();
    report.stale = window.stale();
    let articles = window.into_sorted();
    report.kept = articles.len();

    // ---- Output ----
    write_json_pretty(&out_dir.join(ARTICLES_FILE), &articles).await?;
    info!(count = articles.len(), days = config.recent_days, "Wrote in-window articles");

    let todays = todays_articles(&articles, &today);
    report.today = todays.len();
    let digest = render_daily(&today, &todays);
    write_atomic(&out_dir.join(DAILY_FILE), digest.as_bytes()).await?;
    info!(count = todays.len(), date = %today, "Wrote daily digest");

    report.store_added = match merge_store.merge_articles(&articles, &config.frontend).await {
        Ok(added) => Some(added),
        Err(e) => {
            error!(
                path = %merge_store.path().display(),
                error = %e,
                "Frontend store left untouched"
            );
            None
        }
    };

    state_store.save(&watermarks).await?;
    info!(path = %state_store.path().display(), sources = watermarks.len(), "Saved watermarks");

    // ---- Push ----
    if !todays.is_empty() {
        let payload = DownstreamPayload::new(today.clone(), &todays);
        if let Err(e) = downstream.push(&payload).await {
            warn!(error = %e, "Downstream push failed; run result unaffected");
        }
    }

    info!(
        elapsed_ms = t0.elapsed().as_millis() as u64,
        kept = report.kept,
        today = report.today,
        sources_failed = report.sources_failed,
        store_added = ?report.store_added,
        "Run complete"
    );
    Ok(report)
}
