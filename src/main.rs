//! # mp_harvest
//!
//! Periodic harvester for WeChat official-account articles exposed through a
//! WeRead relay. Each run polls every subscribed account, keeps the recent,
//! de-duplicated articles and writes them out for downstream consumers.
//!
//! ## Features
//!
//! - Static or remotely listed source directory
//! - Paginated per-source fetching with bounded retries and polite delays
//! - Field-alias normalization of heterogeneous relay payloads
//! - Fingerprint de-duplication and a rolling retention window
//! - Per-source watermarks, an append-only frontend store and a daily digest
//! - Optional webhook push of each run's articles
//!
//! ## Usage
//!
//! ```sh
//! WEREAD_COOKIE=... mp_harvest -o ./out -c ./harvest.yaml
//! ```
//!
//! ## Architecture
//!
//! 1. **Directory**: resolve the accounts to poll
//! 2. **Fetch**: page through each account, one at a time
//! 3. **Filter**: fingerprint dedup and retention window
//! 4. **Output**: `articles.json`, `daily.md`, `state.json`, frontend store
//! 5. **Push**: optional webhook

use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod fetcher;
mod filter;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod publish;
mod sources;
mod state;
mod store;
mod utils;

use api::{ReqwestTransport, RetryClient};
use cli::{COOKIE_ENV, Cli};
use config::HarvestConfig;
use error::HarvestError;
use publish::Configured;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("mp_harvest starting up");

    let args = Cli::parse();
    debug!(out_dir = %args.out_dir.display(), config = ?args.config, "Parsed CLI arguments");

    match harvest(&args).await {
        Ok(report) => {
            let elapsed = start_time.elapsed();
            info!(
                ?elapsed,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                %report,
                "Execution complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.is_auth() {
                error!(error = %e, var = COOKIE_ENV, "Relay rejected the credential; refresh it and rerun");
            } else {
                error!(error = %e, "Run failed");
            }
            ExitCode::FAILURE
        }
    }
}

/// Preconditions, wiring, then one pipeline run.
async fn harvest(args: &Cli) -> Result<pipeline::RunReport, HarvestError> {
    // Credential first: nothing touches the network without it.
    let credential = args
        .credential()
        .ok_or(HarvestError::MissingCredential { var: COOKIE_ENV })?;

    let mut config = HarvestConfig::load(args.config.as_deref()).await?;
    args.apply_overrides(&mut config);
    config.validate()?;
    info!(
        recent_days = config.recent_days,
        articles_per_source = config.articles_per_source,
        static_sources = config.sources.len(),
        "Configuration ready"
    );

    if let Err(e) = ensure_writable_dir(&args.out_dir).await {
        error!(
            path = %args.out_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let transport = ReqwestTransport::new(&config, credential)?;
    let client = RetryClient::from_config(transport, &config);
    let downstream = Configured::from_url(args.webhook_url.as_deref());
    debug!(?client, webhook = args.webhook_url.is_some(), "Clients built");

    pipeline::run(&client, &config, &args.out_dir, &downstream, Utc::now()).await
}
