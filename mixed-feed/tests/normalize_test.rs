mod common;

use chrono::{TimeZone, Utc};
use common::{at, init_tracing, raw_post, StubSource};
use interfaces::defs::ERRORED_SUFFIX;
use mixed_feed::normalize::{normalize_items, parse_timestamp, sort_by_date, strip_tags};
use mixed_feed::{FeedSource, NormalizedItem, RawItem};
use serde_json::json;

#[test]
fn test_to_normalized_fills_canonical_fields() {
    let source = StubSource::items("a", vec![]);
    let raw = RawItem::new(raw_post("42", 10));

    let item = source.to_normalized(&raw).unwrap();

    assert_eq!(item.provider, "stub");
    assert_eq!(item.platform, "list");
    assert_eq!(item.canonical_id, "42");
    assert_eq!(item.canonical_app, "");
    assert_eq!(item.canonical_message, "post 42");
    assert_eq!(item.canonical_media, None);
    assert_eq!(item.normalized_date, at(10));
    assert_eq!(item.original_data, raw, "raw entry is kept untouched");
}

#[test]
fn test_missing_optional_fields_default_to_empty() {
    let source = StubSource::items("a", vec![]);
    let raw = RawItem::new(json!({ "created_at": "2024-01-01T00:00:00Z" }));

    let item = source.to_normalized(&raw).unwrap();

    assert_eq!(item.canonical_id, "");
    assert_eq!(item.canonical_message, "");
}

#[test]
fn test_undatable_items_are_dropped() {
    init_tracing();

    let source = StubSource::items("a", vec![]);
    let items = vec![
        RawItem::new(raw_post("1", 1)),
        RawItem::new(json!({ "id": "2", "text": "no date" })),
        RawItem::new(raw_post("3", 3)),
        RawItem::new(json!({ "id": "4", "created_at": "last tuesday" })),
        RawItem::new(json!("not even an object")),
    ];

    let normalized = normalize_items(&source, items);

    assert_eq!(normalized.len(), 2, "5 inputs minus 3 unparsable");
    assert_eq!(normalized[0].canonical_id, "1");
    assert_eq!(normalized[1].canonical_id, "3");

    let skip = source
        .to_normalized(&RawItem::new(json!({ "id": "2" })))
        .unwrap_err();
    assert_eq!(skip.platform, "list");
}

#[test]
fn test_parse_timestamp_formats() {
    let expected = Utc.with_ymd_and_hms(2016, 3, 14, 15, 9, 26).unwrap();

    assert_eq!(parse_timestamp("2016-03-14T15:09:26Z"), Some(expected));
    assert_eq!(parse_timestamp("2016-03-14T16:09:26+01:00"), Some(expected));
    assert_eq!(parse_timestamp("2016-03-14T15:09:26+0000"), Some(expected));
    assert_eq!(parse_timestamp("Mon Mar 14 15:09:26 +0000 2016"), Some(expected));
    assert_eq!(parse_timestamp("Mon, 14 Mar 2016 15:09:26 +0000"), Some(expected));
    assert_eq!(parse_timestamp("2016-03-14T15:09:26"), Some(expected));
    assert_eq!(parse_timestamp("1457968166"), Some(expected));

    assert_eq!(parse_timestamp(""), None);
    assert_eq!(parse_timestamp("yesterday"), None);
}

#[test]
fn test_strip_tags() {
    assert_eq!(
        strip_tags("<a href=\"http://twitter.com\" rel=\"nofollow\">Twitter Web Client</a>"),
        "Twitter Web Client"
    );
    assert_eq!(strip_tags("plain"), "plain");
}

#[test]
fn test_sort_is_stable_for_equal_dates() {
    let item = |id: &str, seconds: i64| {
        let mut normalized = NormalizedItem::errored("stub", "list", id);
        normalized.platform = "list".to_string();
        normalized.canonical_id = id.to_string();
        normalized.normalized_date = at(seconds);
        normalized
    };
    let mut items = vec![item("c", 5), item("a", 1), item("b1", 3), item("b2", 3), item("b3", 3)];

    sort_by_date(&mut items);

    let ids: Vec<&str> = items.iter().map(|i| i.canonical_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b1", "b2", "b3", "c"]);
}

#[test]
fn test_errored_item_shape() {
    let before = Utc::now();
    let item = NormalizedItem::errored("github", "release", "Bad credentials");

    assert!(item.is_errored());
    assert_eq!(item.platform, format!("release{}", ERRORED_SUFFIX));
    assert_eq!(item.canonical_message, "Bad credentials");
    assert!(item.normalized_date >= before);
}
