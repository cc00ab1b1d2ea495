//! Run-wide fingerprint dedup and recency window.
//!
//! [`DedupWindow`] is the accumulator threaded through the source loop: it
//! owns the set of fingerprints seen so far in the run, so a duplicate from a
//! later page or a later source is dropped and the first occurrence wins.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::models::Article;

/// Oldest publish time still inside the retention horizon.
///
/// Saturates at the earliest representable time instead of overflowing.
pub fn cutoff_for(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(retention)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug)]
pub struct DedupWindow {
    cutoff: DateTime<Utc>,
    seen: HashSet<String>,
    kept: Vec<Article>,
    duplicates: usize,
    stale: usize,
}

impl DedupWindow {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            seen: HashSet::new(),
            kept: Vec::new(),
            duplicates: 0,
            stale: 0,
        }
    }

    /// Admit a batch, returning how many articles were kept.
    ///
    /// An article strictly older than the cutoff is dropped before its
    /// fingerprint is recorded, so a stale copy never shadows a fresh one.
    pub fn admit(&mut self, articles: impl IntoIterator<Item = Article>) -> usize {
        let before = self.kept.len();
        for article in articles {
            if self.seen.contains(&article.fingerprint) {
                self.duplicates += 1;
                continue;
            }
            if article.publish_time < self.cutoff {
                self.stale += 1;
                continue;
            }
            self.seen.insert(article.fingerprint.clone());
            self.kept.push(article);
        }
        self.kept.len() - before
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn stale(&self) -> usize {
        self.stale
    }

    /// Kept articles, most recent first. Ties keep admission order.
    pub fn into_sorted(self) -> Vec<Article> {
        let mut kept = self.kept;
        kept.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
        kept
    }
}

/// Dedup and window a whole list in one go.
pub fn filter(articles: Vec<Article>, cutoff: DateTime<Utc>) -> Vec<Article> {
    let mut window = DedupWindow::new(cutoff);
    window.admit(articles);
    window.into_sorted()
}
