//! Mapping of heterogeneous upstream JSON items to canonical [`Article`]s.
//!
//! Upstream shapes differ by source type, so every canonical field is resolved
//! from an ordered list of candidate keys. The first key holding a present
//! value wins. Supporting a new upstream shape means editing the tables below.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::{Article, Source};
use crate::utils::truncate_chars;

/// Keys that may hold the item array of an article listing page.
pub const ARTICLE_LIST_KEYS: &[&str] = &["articles", "papers", "pubs", "article", "items", "list"];

pub const TITLE_KEYS: &[&str] = &["title", "name"];
pub const URL_KEYS: &[&str] = &["url", "link", "jumpUrl", "readUrl"];
pub const PUBLISH_TIME_KEYS: &[&str] = &["publishTime", "publish_time", "updateTime", "createTime"];
pub const SUMMARY_KEYS: &[&str] = &["intro", "desc", "summary", "pureDescText"];

/// Numbers above this are Unix seconds; anything smaller is not a plausible publish time.
pub const EPOCH_SECONDS_THRESHOLD: f64 = 1_000_000_000.0;

/// Latest accepted publish year. Later years would break the fixed-width
/// timestamp strings that watermarks compare.
pub const MAX_PUBLISH_YEAR: i32 = 9999;

/// Hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 12;

/// Null, `""`, `0`, `false`, `[]` and `{}` count as absent.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// First present value among `keys`, in priority order.
pub fn first_present<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .find(|v| is_present(v))
}

/// Scalar rendered as text; numbers keep their JSON spelling.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Text of the first present key, or empty.
pub fn first_text(item: &Value, keys: &[&str]) -> String {
    first_present(item, keys)
        .and_then(value_text)
        .unwrap_or_default()
}

/// Item array of a listing response: a bare array, or the first list key holding one.
pub fn item_list<'a>(data: &'a Value, keys: &[&str]) -> &'a [Value] {
    if let Value::Array(items) = data {
        return items;
    }
    keys.iter()
        .filter_map(|k| data.get(*k))
        .filter(|v| is_present(v))
        .find_map(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Parse an upstream publish time.
///
/// Numbers above [`EPOCH_SECONDS_THRESHOLD`] are epoch seconds. Strings are
/// ISO-8601; a trailing `Z` means UTC and values without an offset are taken
/// as UTC. Returns `None` for anything else, including times past
/// [`MAX_PUBLISH_YEAR`] such as millisecond epochs read as seconds.
pub fn parse_publish_time(raw: &Value) -> Option<DateTime<Utc>> {
    let parsed = match raw {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if secs <= EPOCH_SECONDS_THRESHOLD {
                return None;
            }
            let whole = secs.trunc();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        }
        Value::String(s) => parse_iso8601(s.trim()),
        _ => None,
    };
    parsed.filter(|dt| (1..=MAX_PUBLISH_YEAR).contains(&dt.year()))
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Identity of an article within one run: a truncated SHA-256 over
/// `account_id|title|publish_date`.
pub fn fingerprint(account_id: &str, title: &str, publish_date: &str) -> String {
    let digest = Sha256::digest(format!("{account_id}|{title}|{publish_date}").as_bytes());
    let mut hexed = hex::encode(digest);
    hexed.truncate(FINGERPRINT_LEN);
    hexed
}

/// Map one raw item to an [`Article`].
///
/// # Arguments
///
/// * `raw` - One element of a listing page, in whatever shape the relay sent
/// * `source` - The feed the item came from; supplies account id and name
/// * `now` - Run time, used when the item has no usable publish time
/// * `summary_max_chars` - Summary length cap, counted in characters
///
/// # Returns
///
/// The canonical article with its fingerprint set, or `None` when no title
/// resolves. Such items are skipped silently by the fetcher.
pub fn normalize(
    raw: &Value,
    source: &Source,
    now: DateTime<Utc>,
    summary_max_chars: usize,
) -> Option<Article> {
    let title = first_text(raw, TITLE_KEYS).trim().to_string();
    if title.is_empty() {
        return None;
    }

    let publish_time = match first_present(raw, PUBLISH_TIME_KEYS).and_then(parse_publish_time) {
        Some(dt) => dt,
        None => {
            debug!(source = %source.id, %title, "No usable publish time; using run time");
            now
        }
    };
    let mut article = Article {
        account_name: source.display_name.clone(),
        account_id: source.id.clone(),
        url: first_text(raw, URL_KEYS),
        summary: truncate_chars(&first_text(raw, SUMMARY_KEYS), summary_max_chars),
        publish_time,
        title,
        fingerprint: String::new(),
    };
    article.fingerprint = fingerprint(&article.account_id, &article.title, &article.publish_date());
    Some(article)
}
