use crate::cache::CacheAsideFetcher;
use crate::fetcher::{Transport, TransportRequest};
use crate::normalize::date_field;
use crate::sources::{image_at, request_list};
use crate::traits::{cache_key_prefix, key_part, FeedSource};
use crate::types::{require_credential, CanonicalMedia, MediaVideo, RawItem, RawPayload, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

const API_BASE: &str = "https://api.instagram.com/v1";

/// Recent media of one user.
pub struct InstagramUserFeed {
    user_id: String,
    access_token: String,
    min_id: Option<String>,
    max_id: Option<String>,
    transport: Arc<dyn Transport>,
    cache: CacheAsideFetcher,
}

impl InstagramUserFeed {
    pub fn new(user_id: &str, access_token: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let access_token = require_credential("InstagramUserFeed", "access token", access_token)?;
        let user_id = require_credential("InstagramUserFeed", "user id", user_id)?;

        Ok(Self {
            user_id,
            access_token,
            min_id: None,
            max_id: None,
            transport,
            cache: CacheAsideFetcher::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_min_id(mut self, min_id: &str) -> Self {
        self.min_id = Some(min_id.to_string());
        self
    }

    pub fn with_max_id(mut self, max_id: &str) -> Self {
        self.max_id = Some(max_id.to_string());
        self
    }

    pub fn build_request(&self, count: usize) -> TransportRequest {
        TransportRequest::new(format!("{}/users/{}/media/recent", API_BASE, self.user_id))
            .query("access_token", &self.access_token)
            .query("count", count)
            .query_opt("min_id", self.min_id.as_ref())
            .query_opt("max_id", self.max_id.as_ref())
    }
}

#[async_trait]
impl FeedSource for InstagramUserFeed {
    fn provider_name(&self) -> &str {
        "instagram"
    }

    fn platform_name(&self) -> &str {
        "user"
    }

    fn build_cache_key(&self, count: usize) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            cache_key_prefix(self.provider_name(), self.platform_name()),
            self.user_id,
            key_part(self.min_id.as_ref()),
            key_part(self.max_id.as_ref()),
            count
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        info!("Pulling Instagram media for user {}", self.user_id);
        let request = self.build_request(count);
        request_list(self.transport.as_ref(), &request, self.platform_name(), Some("data")).await
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        date_field(item, "created_time")
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        item.str_at("caption.text").unwrap_or_default().to_string()
    }

    fn canonical_media(&self, item: &RawItem) -> Option<CanonicalMedia> {
        let renditions = |kind: &str| -> Vec<String> {
            item.get(kind)
                .and_then(|v| v.as_object())
                .map(|sizes| sizes.keys().map(|name| format!("{}.{}", kind, name)).collect())
                .unwrap_or_default()
        };

        let images = renditions("images")
            .iter()
            .filter_map(|path| image_at(item, path, "url"))
            .collect();
        let videos = renditions("videos")
            .iter()
            .filter_map(|path| item.str_at(&format!("{}.url", path)))
            .map(|url| MediaVideo { url: url.to_string() })
            .collect();

        Some(CanonicalMedia { images, videos })
    }
}
