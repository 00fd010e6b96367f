pub mod types;
pub mod traits;
pub mod cache;
pub mod fetcher;
pub mod normalize;
pub mod aggregator;
pub mod sources;

pub use types::*;
pub use traits::FeedSource;
pub use cache::{CacheAsideFetcher, CacheStore, MemoryCache};
pub use fetcher::{HttpTransport, Transport, TransportRequest, TransportResponse};
pub use aggregator::MixedFeed;
pub use sources::{
    FacebookPageFeed, FacebookUserFeed, GithubReleasesFeed, InstagramUserFeed, PinterestBoardFeed, SearchQuery,
    TwitterSearchFeed, TwitterStatusFeed,
};
