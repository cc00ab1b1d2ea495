//! Output generation for snapshots and the daily digest.
//!
//! # Submodules
//!
//! - [`json`]: atomic, pretty-printed JSON snapshots
//! - [`markdown`]: the daily digest
//!
//! # Output Structure
//!
//! ```text
//! out_dir/
//! ├── subscriptions.json      # subscription snapshot
//! ├── articles.json           # in-window articles of the latest run
//! ├── daily.md                # today's digest
//! ├── state.json              # per-source watermarks
//! └── unified_articles.json   # cross-run frontend store
//! ```

pub mod json;
pub mod markdown;

pub const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";
pub const ARTICLES_FILE: &str = "articles.json";
pub const DAILY_FILE: &str = "daily.md";
pub const STATE_FILE: &str = "state.json";
