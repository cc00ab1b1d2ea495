//! Daily digest rendering.
//!
//! Today's articles grouped by source, sources in alphabetical order:
//!
//! ```text
//! # 每日 AI 公众号速报 — 2025-05-06
//!
//! > 共 2 篇新文章（来自微信读书订阅）
//!
//! ## Example Daily
//!
//! - [Title](https://mp.weixin.qq.com/s/abc) — Summary
//! ```

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::Article;

/// Articles whose UTC+8 publish day is `today`, in input order.
pub fn todays_articles<'a>(articles: &'a [Article], today: &str) -> Vec<&'a Article> {
    articles.iter().filter(|a| a.local_date() == today).collect()
}

/// Render the digest for `today` from already-filtered articles.
pub fn render_daily(today: &str, articles: &[&Article]) -> String {
    let mut md = String::new();
    writeln!(md, "# 每日 AI 公众号速报 — {today}\n").unwrap();
    writeln!(md, "> 共 {} 篇新文章（来自微信读书订阅）\n", articles.len()).unwrap();

    let mut by_account: BTreeMap<&str, Vec<&Article>> = BTreeMap::new();
    for article in articles {
        by_account
            .entry(article.account_name.as_str())
            .or_default()
            .push(article);
    }

    for (account, items) in by_account {
        writeln!(md, "## {account}\n").unwrap();
        for a in items {
            let link = if a.url.is_empty() { "#" } else { a.url.as_str() };
            if a.summary.is_empty() {
                writeln!(md, "- [{}]({})", a.title, link).unwrap();
            } else {
                writeln!(md, "- [{}]({}) — {}", a.title, link, a.summary).unwrap();
            }
        }
        md.push('\n');
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn article(account: &str, title: &str, url: &str, summary: &str, hour: u32) -> Article {
        Article {
            account_name: account.to_string(),
            account_id: account.to_lowercase(),
            title: title.to_string(),
            url: url.to_string(),
            publish_time: Utc.with_ymd_and_hms(2025, 5, 6, hour, 0, 0).unwrap(),
            summary: summary.to_string(),
            fingerprint: format!("{account}-{title}"),
        }
    }

    #[test]
    fn test_render_groups_by_account_alphabetically() {
        let a = article("Zeta", "Z1", "https://z/1", "", 2);
        let b = article("Alpha", "A1", "https://a/1", "About A1", 3);
        let c = article("Alpha", "A2", "", "", 4);
        let md = render_daily("2025-05-06", &[&a, &b, &c]);

        assert!(md.starts_with("# 每日 AI 公众号速报 — 2025-05-06\n\n> 共 3 篇新文章"));
        let alpha = md.find("## Alpha").unwrap();
        let zeta = md.find("## Zeta").unwrap();
        assert!(alpha < zeta);
        assert!(md.contains("- [A1](https://a/1) — About A1\n"));
        assert!(md.contains("- [A2](#)\n"));
        assert!(md.contains("- [Z1](https://z/1)\n"));
    }

    #[test]
    fn test_render_empty_day() {
        let md = render_daily("2025-05-06", &[]);
        assert!(md.contains("> 共 0 篇新文章"));
        assert!(!md.contains("## "));
    }

    #[test]
    fn test_todays_articles_uses_utc_plus_eight() {
        // 15:00 UTC is still the 6th at UTC+8, 17:00 UTC is already the 7th
        let same_day = article("A", "same", "", "", 15);
        let next_day = article("A", "next", "", "", 17);
        let all = vec![same_day, next_day];
        let today = todays_articles(&all, "2025-05-06");
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].title, "same");
    }
}
