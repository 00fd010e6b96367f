use crate::cache::CacheAsideFetcher;
use crate::fetcher::{Transport, TransportRequest};
use crate::normalize::date_field;
use crate::sources::{image_at, request_list};
use crate::traits::{cache_key_prefix, FeedSource};
use crate::types::{require_credential, CanonicalMedia, RawItem, RawPayload, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

const API_BASE: &str = "https://api.pinterest.com/v1";
const PIN_FIELDS: &str = "id,color,created_at,creator,media,image[original],note,link,url";

/// Pins of a public board.
pub struct PinterestBoardFeed {
    board_id: String,
    access_token: String,
    transport: Arc<dyn Transport>,
    cache: CacheAsideFetcher,
}

impl PinterestBoardFeed {
    pub fn new(board_id: &str, access_token: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let access_token = require_credential("PinterestBoardFeed", "access token", access_token)?;
        let board_id = require_credential("PinterestBoardFeed", "board id", board_id)?;

        Ok(Self {
            board_id,
            access_token,
            transport,
            cache: CacheAsideFetcher::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    pub fn build_request(&self, count: usize) -> TransportRequest {
        TransportRequest::new(format!("{}/boards/{}/pins/", API_BASE, self.board_id))
            .query("access_token", &self.access_token)
            .query("limit", count)
            .query("fields", PIN_FIELDS)
    }
}

#[async_trait]
impl FeedSource for PinterestBoardFeed {
    fn provider_name(&self) -> &str {
        "pinterest"
    }

    fn platform_name(&self) -> &str {
        "board"
    }

    fn build_cache_key(&self, count: usize) -> String {
        format!(
            "{}:{}:{}",
            cache_key_prefix(self.provider_name(), self.platform_name()),
            self.board_id,
            count
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        info!("Pulling Pinterest board {}", self.board_id);
        let request = self.build_request(count);
        request_list(self.transport.as_ref(), &request, self.platform_name(), Some("data")).await
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        date_field(item, "created_at")
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        item.str_at("note").unwrap_or_default().to_string()
    }

    fn canonical_media(&self, item: &RawItem) -> Option<CanonicalMedia> {
        let images = image_at(item, "image.original", "url").into_iter().collect();
        Some(CanonicalMedia {
            images,
            videos: Vec::new(),
        })
    }
}
