use crate::cache::CacheAsideFetcher;
use crate::fetcher::{Transport, TransportRequest};
use crate::normalize::date_field;
use crate::sources::request_list;
use crate::traits::{cache_key_prefix, FeedSource};
use crate::types::{require_credential, FeedError, RawItem, RawPayload, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

const API_BASE: &str = "https://api.github.com";

fn is_repository_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Accepts `owner/project` and nothing else.
pub fn is_valid_repository(repository: &str) -> bool {
    match repository.split_once('/') {
        Some((owner, project)) => is_repository_segment(owner) && is_repository_segment(project),
        None => false,
    }
}

/// Releases of one repository, newest first as the API returns them.
pub struct GithubReleasesFeed {
    repository: String,
    access_token: String,
    page: u32,
    transport: Arc<dyn Transport>,
    cache: CacheAsideFetcher,
}

impl GithubReleasesFeed {
    pub fn new(repository: &str, access_token: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let repository = require_credential("GithubReleasesFeed", "repository name", repository)?;
        if !is_valid_repository(&repository) {
            return Err(FeedError::credentials(
                "GithubReleasesFeed",
                "repository name \"user/project\"",
            ));
        }
        let access_token = require_credential("GithubReleasesFeed", "access token", access_token)?;

        Ok(Self {
            repository,
            access_token,
            page: 1,
            transport,
            cache: CacheAsideFetcher::disabled(),
        })
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    /// 1-based result page.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn build_request(&self, count: usize) -> TransportRequest {
        TransportRequest::new(format!("{}/repos/{}/releases", API_BASE, self.repository))
            .bearer(&self.access_token)
            .query("per_page", count)
            .query("page", self.page)
    }
}

#[async_trait]
impl FeedSource for GithubReleasesFeed {
    fn provider_name(&self) -> &str {
        "github"
    }

    fn platform_name(&self) -> &str {
        "release"
    }

    fn build_cache_key(&self, count: usize) -> String {
        format!(
            "{}:{}:{}:{}",
            cache_key_prefix(self.provider_name(), self.platform_name()),
            self.repository,
            self.page,
            count
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        info!("Pulling GitHub releases for {}", self.repository);
        let request = self.build_request(count);
        request_list(self.transport.as_ref(), &request, self.platform_name(), None).await
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        date_field(item, "created_at")
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        item.str_at("name")
            .filter(|name| !name.is_empty())
            .or_else(|| item.str_at("tag_name"))
            .unwrap_or_default()
            .to_string()
    }
}
