use crate::traits::{cache_key_prefix, FeedSource};
use crate::types::{FeedError, NormalizedItem, RawItem, RawPayload, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%a %b %d %H:%M:%S %z %Y",
];

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

pub(crate) async fn fetch_normalized<S>(source: &S, count: usize) -> Result<Vec<NormalizedItem>>
where
    S: FeedSource + ?Sized,
{
    if count == 0 {
        return Ok(Vec::new());
    }

    let cache_key = source.build_cache_key(count);
    let payload: RawPayload = source
        .cache()
        .get(&cache_key, move || async move {
            let payload = source.fetch_raw(count).await;
            if source.is_valid_response(&payload) {
                Ok(payload)
            } else {
                Err(FeedError::Provider {
                    platform: source.platform_name().to_string(),
                    message: source.errors_of(&payload),
                })
            }
        })
        .await?;

    Ok(normalize_items(source, payload.into_items()))
}

/// Maps raw entries, dropping the ones that cannot be dated.
pub fn normalize_items<S>(source: &S, items: Vec<RawItem>) -> Vec<NormalizedItem>
where
    S: FeedSource + ?Sized,
{
    let total = items.len();
    let normalized: Vec<NormalizedItem> = items
        .iter()
        .filter_map(|item| match source.to_normalized(item) {
            Ok(normalized) => Some(normalized),
            Err(skip) => {
                debug!("{}", skip);
                None
            }
        })
        .collect();

    if normalized.len() < total {
        info!(
            "{}: normalized {}/{} items, {} dropped",
            cache_key_prefix(source.provider_name(), source.platform_name()),
            normalized.len(),
            total,
            total - normalized.len()
        );
    }

    normalized
}

/// Accepts the timestamp shapes the supported platforms emit: RFC 3339,
/// ISO 8601 with a compact offset, the classic Twitter format, RFC 2822,
/// offset-less ISO (read as UTC) and unix seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse::<i64>().ok().and_then(parse_unix_seconds);
    }

    None
}

pub fn parse_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

/// Reads a date field that may be a string or a bare number.
pub fn date_field(item: &RawItem, path: &str) -> Option<DateTime<Utc>> {
    match item.get(path)? {
        serde_json::Value::Number(n) => n.as_i64().and_then(parse_unix_seconds),
        serde_json::Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Drops markup, keeping text content. Used for HTML-bearing fields such as a
/// tweet's client link.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable oldest-first ordering; equal dates keep their input order.
pub fn sort_by_date(items: &mut [NormalizedItem]) {
    items.sort_by_key(|item| item.normalized_date);
}
