use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix appended to the platform name of a sentinel item standing in for a
/// failed source.
pub const ERRORED_SUFFIX: &str = "[errored]";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaImage {
    pub url: String,
    /// (height, width); zeroes when the platform does not report dimensions.
    pub size: (u32, u32),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaVideo {
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMedia {
    pub images: Vec<MediaImage>,
    pub videos: Vec<MediaVideo>,
}

impl CanonicalMedia {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }
}

/// One platform-native entry as returned by a remote API.
///
/// The document is kept opaque; every field is reached through an accessor
/// that yields `None` when the field is missing or has an unexpected shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(pub Value);

impl RawItem {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Walks a dotted path (`"caption.text"`, `"media.image.src"`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.0, |current, segment| current.get(segment))
            .filter(|value| !value.is_null())
    }

    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Strings are returned as-is, numbers are rendered. Platforms disagree on
    /// whether identifiers are numeric.
    pub fn string_at(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn u64_at(&self, path: &str) -> Option<u64> {
        match self.get(path)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn items_at(&self, path: &str) -> Vec<RawItem> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|values| values.iter().cloned().map(RawItem).collect())
            .unwrap_or_default()
    }
}

impl From<Value> for RawItem {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// The platform-agnostic shape of one feed entry.
///
/// Built once per raw entry and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub provider: String,
    pub platform: String,
    pub canonical_id: String,
    pub canonical_app: String,
    pub canonical_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_media: Option<CanonicalMedia>,
    pub normalized_date: DateTime<Utc>,
    pub original_data: RawItem,
}

impl NormalizedItem {
    /// Sentinel placed in a merged feed instead of a failed source's items.
    /// It carries the failure text and sorts as "now".
    pub fn errored(provider: &str, platform: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_owned(),
            platform: format!("{platform}{ERRORED_SUFFIX}"),
            canonical_id: String::new(),
            canonical_app: String::new(),
            canonical_message: message.into(),
            canonical_media: None,
            normalized_date: Utc::now(),
            original_data: RawItem::default(),
        }
    }

    pub fn is_errored(&self) -> bool {
        self.platform.ends_with(ERRORED_SUFFIX)
    }
}

// Object style note:
// Items are plain values. Anything that needs to reach a remote service or a
// cache lives in the `mixed-feed` crate; this crate stays free of I/O so that
// consumers can depend on the data model alone.
