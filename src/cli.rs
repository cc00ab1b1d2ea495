//! Command-line interface definitions for the harvester.
//!
//! Every option can also be provided through an environment variable, which is
//! how scheduled runs usually pass the credential.

use clap::Parser;
use std::path::PathBuf;

use crate::config::HarvestConfig;

/// Environment variable holding the relay credential.
pub const COOKIE_ENV: &str = "WEREAD_COOKIE";

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Static sources from a config file, credential from the environment
/// WEREAD_COOKIE=... mp_harvest -o ./out -c ./harvest.yaml
///
/// # Wider window, push the run's articles to a webhook
/// mp_harvest --recent-days 14 --webhook-url https://hooks.example/mp
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for snapshots, digest, state and store
    #[arg(short, long, env = "HARVEST_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,

    /// Optional path to a YAML configuration file
    #[arg(short, long, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Relay session cookie
    #[arg(long, env = COOKIE_ENV, hide_env_values = true)]
    pub cookie: Option<String>,

    /// Webhook receiving each run's articles
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Retention window in days, overriding the configuration file
    #[arg(long)]
    pub recent_days: Option<i64>,

    /// Per-source article cap, overriding the configuration file
    #[arg(long)]
    pub articles_per_source: Option<usize>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut HarvestConfig) {
        if let Some(days) = self.recent_days {
            config.recent_days = days;
        }
        if let Some(count) = self.articles_per_source {
            config.articles_per_source = count;
        }
    }

    /// The credential, if set to something other than whitespace.
    pub fn credential(&self) -> Option<&str> {
        self.cookie.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}
