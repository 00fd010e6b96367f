use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use interfaces::defs::{CanonicalMedia, MediaImage, MediaVideo, NormalizedItem, RawItem};

/// Lifetime of a cached source payload or merged feed.
pub const DEFAULT_TTL_SECONDS: u64 = 7200;

/// Number of items requested when the caller does not say.
pub const DEFAULT_COUNT: usize = 5;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_payload_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "MixedFeed/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 1,
            max_payload_size_mb: 10,
            max_redirects: 5,
        }
    }
}

/// What a source's network call produced: either the platform's JSON body
/// (list or envelope) or an error marker `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(pub Value);

impl RawPayload {
    pub fn items(items: Vec<Value>) -> Self {
        Self(Value::Array(items))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self(json!({ "error": message.into() }))
    }

    /// A list is a successful result, even when it is empty.
    pub fn is_list(&self) -> bool {
        self.0.is_array()
    }

    pub fn has_error_marker(&self) -> bool {
        self.0.get("error").is_some()
    }

    pub fn error_message(&self) -> String {
        match self.0.get("error") {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn into_items(self) -> Vec<RawItem> {
        match self.0 {
            Value::Array(values) => values.into_iter().map(RawItem).collect(),
            _ => Vec::new(),
        }
    }
}

/// Raised by `FeedSource::to_normalized` for an entry that cannot be placed
/// on the timeline. The entry is dropped and the batch continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("skipped {platform} item: {reason}")]
pub struct NormalizationSkip {
    pub platform: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("{source_name} needs a valid {field}")]
    Credentials { source_name: String, field: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response format error: {0}")]
    ResponseFormat(String),

    #[error("Feed provider {platform} errored: {message}")]
    Provider { platform: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FeedError {
    pub fn credentials(source_name: &str, field: &str) -> Self {
        Self::Credentials {
            source_name: source_name.to_string(),
            field: field.to_string(),
        }
    }

    /// Transport and format failures are recovered at the source boundary
    /// into an error payload; everything else is a caller-facing error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Transport(_) | Self::ResponseFormat(_) | Self::InvalidUrl(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// Rejects a missing or blank credential at construction time.
pub fn require_credential(source_name: &str, field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FeedError::credentials(source_name, field));
    }
    Ok(trimmed.to_string())
}
