use crate::cache::CacheAsideFetcher;
use crate::types::{CanonicalMedia, NormalizationSkip, NormalizedItem, RawItem, RawPayload, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Capability contract for one platform-specific feed (a page timeline, a
/// search, a release list...).
///
/// Implementors supply identity, the network call and the field mapping.
/// Caching and normalization come from the provided `get_normalized_items`.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Source family, e.g. `"twitter"`. Depends on configuration only.
    fn provider_name(&self) -> &str;

    /// Sub-kind within the provider, e.g. `"search"`. May be empty.
    fn platform_name(&self) -> &str;

    /// Must cover every parameter that changes the result set.
    fn build_cache_key(&self, count: usize) -> String;

    fn cache(&self) -> &CacheAsideFetcher;

    /// Performs the network call. Transport and format failures come back as
    /// an error payload, never as an `Err`.
    async fn fetch_raw(&self, count: usize) -> RawPayload;

    /// `None` when the entry carries no usable timestamp.
    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>>;

    fn canonical_message(&self, item: &RawItem) -> String;

    fn canonical_id(&self, item: &RawItem) -> String {
        item.string_at("id").unwrap_or_default()
    }

    fn canonical_app(&self, _item: &RawItem) -> String {
        String::new()
    }

    fn canonical_media(&self, _item: &RawItem) -> Option<CanonicalMedia> {
        None
    }

    /// Tells an empty success apart from an error payload.
    fn is_valid_response(&self, payload: &RawPayload) -> bool {
        payload.is_list() && !payload.has_error_marker()
    }

    fn errors_of(&self, payload: &RawPayload) -> String {
        payload.error_message()
    }

    fn to_normalized(&self, item: &RawItem) -> std::result::Result<NormalizedItem, NormalizationSkip> {
        let normalized_date = self.date_of(item).ok_or_else(|| NormalizationSkip {
            platform: self.platform_name().to_string(),
            reason: "missing or unparsable date".to_string(),
        })?;

        Ok(NormalizedItem {
            provider: self.provider_name().to_string(),
            platform: self.platform_name().to_string(),
            canonical_id: self.canonical_id(item),
            canonical_app: self.canonical_app(item),
            canonical_message: self.canonical_message(item),
            canonical_media: self.canonical_media(item),
            normalized_date,
            original_data: item.clone(),
        })
    }

    /// Cached fetch followed by normalization. An invalid payload surfaces as
    /// `FeedError::Provider` and is never cached.
    async fn get_normalized_items(&self, count: usize) -> Result<Vec<NormalizedItem>> {
        crate::normalize::fetch_normalized(self, count).await
    }
}

/// `provider:platform`, or just `provider` when the platform is empty.
pub fn cache_key_prefix(provider: &str, platform: &str) -> String {
    if platform.is_empty() {
        provider.to_string()
    } else {
        format!("{}:{}", provider, platform)
    }
}

/// Renders an unset key discriminator so positional fields never shift.
pub fn key_part<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
