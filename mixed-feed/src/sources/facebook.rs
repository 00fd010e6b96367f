use crate::cache::CacheAsideFetcher;
use crate::fetcher::{Transport, TransportRequest};
use crate::normalize::date_field;
use crate::sources::{image_at, request_list};
use crate::traits::{cache_key_prefix, key_part, FeedSource};
use crate::types::{require_credential, CanonicalMedia, MediaImage, MediaVideo, RawItem, RawPayload, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

const GRAPH_API: &str = "https://graph.facebook.com";

const PAGE_FIELDS: &[&str] = &[
    "application",
    "attachments",
    "created_time",
    "from",
    "full_picture",
    "link",
    "message",
    "picture",
    "source",
    "status_type",
    "story",
];

const USER_FIELDS: &[&str] = &[
    "created_time",
    "full_picture",
    "link",
    "message",
    "picture",
    "source",
    "status_type",
    "story",
    "type",
];

/// The `/{id}/posts` edge shared by page and user timelines. Fields are kept
/// sorted so that equal field sets produce equal requests and keys.
struct GraphTimeline {
    owner_id: String,
    access_token: String,
    fields: BTreeSet<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl GraphTimeline {
    fn new(owner_id: String, access_token: String, defaults: &[&str]) -> Self {
        Self {
            owner_id,
            access_token,
            fields: defaults.iter().map(|f| f.to_string()).collect(),
            since: None,
            until: None,
        }
    }

    fn add_fields<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(
            fields
                .into_iter()
                .map(Into::into)
                .map(|field: String| field.trim().to_string())
                .filter(|field| !field.is_empty()),
        );
    }

    fn joined_fields(&self) -> String {
        self.fields.iter().cloned().collect::<Vec<_>>().join(",")
    }

    fn fields_digest(&self) -> String {
        hex::encode(Sha256::digest(self.joined_fields().as_bytes()))
    }

    fn request(&self, count: usize) -> TransportRequest {
        TransportRequest::new(format!("{}/{}/posts", GRAPH_API, self.owner_id))
            .query("access_token", &self.access_token)
            .query("limit", count)
            .query("fields", self.joined_fields())
            .query_opt("since", self.since.map(|dt| dt.timestamp()))
            .query_opt("until", self.until.map(|dt| dt.timestamp()))
    }

    fn cache_key(&self, prefix: &str, count: usize) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            prefix,
            self.owner_id,
            key_part(self.since.map(|dt| dt.timestamp())),
            key_part(self.until.map(|dt| dt.timestamp())),
            self.fields_digest(),
            count
        )
    }
}

fn graph_message(item: &RawItem) -> String {
    item.str_at("message")
        .or_else(|| item.str_at("story"))
        .unwrap_or_default()
        .to_string()
}

fn graph_app(item: &RawItem) -> String {
    item.string_at("from.id")
        .or_else(|| item.string_at("application.id"))
        .unwrap_or_default()
}

/// Attachment images, falling back to `full_picture`; the post's `source` is
/// its video.
fn graph_media(item: &RawItem) -> Option<CanonicalMedia> {
    let mut images: Vec<MediaImage> = item
        .items_at("attachments.data")
        .iter()
        .filter_map(|attachment| image_at(attachment, "media.image", "src"))
        .collect();

    if images.is_empty() {
        if let Some(url) = item.str_at("full_picture") {
            images.push(MediaImage {
                url: url.to_string(),
                size: (0, 0),
            });
        }
    }

    let videos = item
        .str_at("source")
        .map(|url| vec![MediaVideo { url: url.to_string() }])
        .unwrap_or_default();

    Some(CanonicalMedia { images, videos })
}

/// Public page timeline read with an app access token.
pub struct FacebookPageFeed {
    timeline: GraphTimeline,
    transport: Arc<dyn Transport>,
    cache: CacheAsideFetcher,
}

impl FacebookPageFeed {
    pub fn new(page_id: &str, access_token: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let access_token = require_credential("FacebookPageFeed", "access token", access_token)?;
        let page_id = require_credential("FacebookPageFeed", "page id", page_id)?;

        Ok(Self {
            timeline: GraphTimeline::new(page_id, access_token, PAGE_FIELDS),
            transport,
            cache: CacheAsideFetcher::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    /// Requests extra Graph API fields on top of the defaults.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timeline.add_fields(fields);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.timeline.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.timeline.until = Some(until);
        self
    }

    pub fn page_id(&self) -> &str {
        &self.timeline.owner_id
    }

    /// SHA-256 of the sorted field list, as used in the cache key.
    pub fn fields_digest(&self) -> String {
        self.timeline.fields_digest()
    }

    pub fn build_request(&self, count: usize) -> TransportRequest {
        self.timeline.request(count)
    }
}

#[async_trait]
impl FeedSource for FacebookPageFeed {
    fn provider_name(&self) -> &str {
        "facebook"
    }

    fn platform_name(&self) -> &str {
        "page"
    }

    fn build_cache_key(&self, count: usize) -> String {
        self.timeline.cache_key(
            &cache_key_prefix(self.provider_name(), self.platform_name()),
            count,
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        info!("Pulling Facebook page {}", self.page_id());
        let request = self.build_request(count);
        request_list(self.transport.as_ref(), &request, self.platform_name(), Some("data")).await
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        date_field(item, "created_time")
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        graph_message(item)
    }

    fn canonical_app(&self, item: &RawItem) -> String {
        graph_app(item)
    }

    fn canonical_media(&self, item: &RawItem) -> Option<CanonicalMedia> {
        graph_media(item)
    }
}

/// A user's own timeline, read with a user access token.
pub struct FacebookUserFeed {
    timeline: GraphTimeline,
    transport: Arc<dyn Transport>,
    cache: CacheAsideFetcher,
}

impl FacebookUserFeed {
    pub fn new(user_id: &str, access_token: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let access_token = require_credential("FacebookUserFeed", "user access token", access_token)?;
        let user_id = require_credential("FacebookUserFeed", "user id", user_id)?;

        Ok(Self {
            timeline: GraphTimeline::new(user_id, access_token, USER_FIELDS),
            transport,
            cache: CacheAsideFetcher::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timeline.add_fields(fields);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.timeline.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.timeline.until = Some(until);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.timeline.owner_id
    }

    pub fn fields_digest(&self) -> String {
        self.timeline.fields_digest()
    }

    pub fn build_request(&self, count: usize) -> TransportRequest {
        self.timeline.request(count)
    }
}

#[async_trait]
impl FeedSource for FacebookUserFeed {
    fn provider_name(&self) -> &str {
        "facebook"
    }

    fn platform_name(&self) -> &str {
        "user"
    }

    fn build_cache_key(&self, count: usize) -> String {
        self.timeline.cache_key(
            &cache_key_prefix(self.provider_name(), self.platform_name()),
            count,
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        info!("Pulling Facebook timeline for user {}", self.user_id());
        let request = self.build_request(count);
        request_list(self.transport.as_ref(), &request, self.platform_name(), Some("data")).await
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        date_field(item, "created_time")
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        graph_message(item)
    }

    fn canonical_app(&self, item: &RawItem) -> String {
        graph_app(item)
    }

    fn canonical_media(&self, item: &RawItem) -> Option<CanonicalMedia> {
        graph_media(item)
    }
}
