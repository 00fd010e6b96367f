use crate::cache::CacheAsideFetcher;
use crate::fetcher::{Transport, TransportRequest};
use crate::normalize::{date_field, strip_tags};
use crate::sources::request_list;
use crate::traits::{cache_key_prefix, key_part, FeedSource};
use crate::types::{
    require_credential, CanonicalMedia, FeedError, MediaImage, MediaVideo, RawItem, RawPayload, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const API_BASE: &str = "https://api.twitter.com/1.1";

fn tweet_date(item: &RawItem) -> Option<DateTime<Utc>> {
    date_field(item, "created_at")
}

fn tweet_message(item: &RawItem) -> String {
    item.str_at("full_text")
        .or_else(|| item.str_at("text"))
        .unwrap_or_default()
        .to_string()
}

fn tweet_id(item: &RawItem) -> String {
    item.string_at("id_str")
        .or_else(|| item.string_at("id"))
        .unwrap_or_default()
}

fn tweet_app(item: &RawItem) -> String {
    item.str_at("source").map(strip_tags).unwrap_or_default()
}

/// One image per named size (`thumb`, `small`, `large`...) of every photo, and
/// every variant of every video.
fn tweet_media(item: &RawItem) -> Option<CanonicalMedia> {
    let mut images = Vec::new();
    for media in item.items_at("entities.media") {
        if media.str_at("type") != Some("photo") {
            continue;
        }
        let (Some(base_url), Some(sizes)) = (
            media.str_at("media_url_https").or_else(|| media.str_at("media_url")),
            media.get("sizes").and_then(|s| s.as_object()),
        ) else {
            continue;
        };
        for (name, size) in sizes {
            let size = RawItem::new(size.clone());
            let dimension = |key: &str| size.u64_at(key).and_then(|v| u32::try_from(v).ok()).unwrap_or(0);
            images.push(MediaImage {
                url: format!("{}:{}", base_url, name),
                size: (dimension("h"), dimension("w")),
            });
        }
    }

    let mut videos = Vec::new();
    for media in item.items_at("extended_entities.media") {
        if media.str_at("type") != Some("video") {
            continue;
        }
        for variant in media.items_at("video_info.variants") {
            videos.push(MediaVideo {
                url: variant.str_at("url").unwrap_or_default().to_string(),
            });
        }
    }

    Some(CanonicalMedia { images, videos })
}

/// A user's timeline, read with an app-only bearer token.
pub struct TwitterStatusFeed {
    user_id: String,
    bearer_token: String,
    exclude_replies: bool,
    include_retweets: bool,
    since_id: Option<u64>,
    max_id: Option<u64>,
    transport: Arc<dyn Transport>,
    cache: CacheAsideFetcher,
}

impl TwitterStatusFeed {
    pub fn new(user_id: &str, bearer_token: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let bearer_token = require_credential("TwitterStatusFeed", "bearer token", bearer_token)?;
        let user_id = require_credential("TwitterStatusFeed", "user id", user_id)?;

        Ok(Self {
            user_id,
            bearer_token,
            exclude_replies: true,
            include_retweets: false,
            since_id: None,
            max_id: None,
            transport,
            cache: CacheAsideFetcher::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_replies(mut self, include: bool) -> Self {
        self.exclude_replies = !include;
        self
    }

    pub fn with_retweets(mut self, include: bool) -> Self {
        self.include_retweets = include;
        self
    }

    pub fn with_since_id(mut self, since_id: u64) -> Self {
        self.since_id = Some(since_id);
        self
    }

    pub fn with_max_id(mut self, max_id: u64) -> Self {
        self.max_id = Some(max_id);
        self
    }

    pub fn build_request(&self, count: usize) -> TransportRequest {
        TransportRequest::new(format!("{}/statuses/user_timeline.json", API_BASE))
            .bearer(&self.bearer_token)
            .query("user_id", &self.user_id)
            .query("count", count)
            .query("exclude_replies", self.exclude_replies)
            .query("include_rts", self.include_retweets)
            .query("tweet_mode", "extended")
            .query_opt("since_id", self.since_id)
            .query_opt("max_id", self.max_id)
    }
}

#[async_trait]
impl FeedSource for TwitterStatusFeed {
    fn provider_name(&self) -> &str {
        "twitter"
    }

    fn platform_name(&self) -> &str {
        "status"
    }

    fn build_cache_key(&self, count: usize) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            cache_key_prefix(self.provider_name(), self.platform_name()),
            self.user_id,
            self.exclude_replies,
            self.include_retweets,
            key_part(self.since_id),
            key_part(self.max_id),
            count
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        info!("Pulling Twitter timeline for user {}", self.user_id);
        let request = self.build_request(count);
        request_list(self.transport.as_ref(), &request, self.platform_name(), None).await
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        tweet_date(item)
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        tweet_message(item)
    }

    fn canonical_id(&self, item: &RawItem) -> String {
        tweet_id(item)
    }

    fn canonical_app(&self, item: &RawItem) -> String {
        tweet_app(item)
    }

    fn canonical_media(&self, item: &RawItem) -> Option<CanonicalMedia> {
        tweet_media(item)
    }
}

/// Search terms plus `operator:value` filters (`from:rustlang`, `lang:en`).
/// Empty entries are dropped; filters are kept sorted so equal queries render
/// identically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    terms: Vec<String>,
    filters: BTreeMap<String, String>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: &str) -> Self {
        let term = term.trim();
        if !term.is_empty() {
            self.terms.push(term.to_string());
        }
        self
    }

    pub fn filter(mut self, operator: &str, value: &str) -> Self {
        let (operator, value) = (operator.trim(), value.trim());
        if !operator.is_empty() && !value.is_empty() {
            self.filters.insert(operator.to_string(), value.to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.filters.is_empty()
    }

    /// The `q` parameter as the search API expects it.
    pub fn render(&self) -> String {
        self.terms
            .iter()
            .cloned()
            .chain(self.filters.iter().map(|(k, v)| format!("{}:{}", k, v)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.render().as_bytes()))
    }
}

/// Recent tweets matching a query.
pub struct TwitterSearchFeed {
    query: SearchQuery,
    bearer_token: String,
    transport: Arc<dyn Transport>,
    cache: CacheAsideFetcher,
}

impl TwitterSearchFeed {
    pub fn new(query: SearchQuery, bearer_token: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let bearer_token = require_credential("TwitterSearchFeed", "bearer token", bearer_token)?;
        if query.is_empty() {
            return Err(FeedError::Configuration(
                "TwitterSearchFeed needs at least one search term".to_string(),
            ));
        }

        Ok(Self {
            query,
            bearer_token,
            transport,
            cache: CacheAsideFetcher::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn build_request(&self, count: usize) -> TransportRequest {
        TransportRequest::new(format!("{}/search/tweets.json", API_BASE))
            .bearer(&self.bearer_token)
            .query("q", self.query.render())
            .query("count", count)
            .query("tweet_mode", "extended")
    }
}

#[async_trait]
impl FeedSource for TwitterSearchFeed {
    fn provider_name(&self) -> &str {
        "twitter"
    }

    fn platform_name(&self) -> &str {
        "search"
    }

    fn build_cache_key(&self, count: usize) -> String {
        format!(
            "{}:{}:{}",
            cache_key_prefix(self.provider_name(), self.platform_name()),
            self.query.digest(),
            count
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        info!("Searching Twitter for {:?}", self.query.render());
        let request = self.build_request(count);
        request_list(self.transport.as_ref(), &request, self.platform_name(), Some("statuses")).await
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        tweet_date(item)
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        tweet_message(item)
    }

    fn canonical_id(&self, item: &RawItem) -> String {
        tweet_id(item)
    }

    fn canonical_app(&self, item: &RawItem) -> String {
        tweet_app(item)
    }

    fn canonical_media(&self, item: &RawItem) -> Option<CanonicalMedia> {
        tweet_media(item)
    }
}
