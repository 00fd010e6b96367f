use clap::Parser;
use mixed_feed::{
    CacheAsideFetcher, FacebookPageFeed, FacebookUserFeed, FeedSource, FetchConfig, GithubReleasesFeed, HttpTransport,
    InstagramUserFeed, MemoryCache, MixedFeed, PinterestBoardFeed, SearchQuery, Transport,
    TwitterSearchFeed, TwitterStatusFeed, DEFAULT_COUNT, DEFAULT_TTL_SECONDS,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Pull the most recent posts from several platforms and print them as one
/// chronological JSON feed.
#[derive(Parser, Debug)]
#[command(name = "mixed-feed", version)]
struct Args {
    /// Items requested from every source
    #[arg(long, default_value_t = DEFAULT_COUNT)]
    count: usize,

    /// Fixed identity for the merged feed's cache entry
    #[arg(long)]
    feed_id: Option<String>,

    /// Cache lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_TTL_SECONDS)]
    ttl: u64,

    /// Per-source deadline in seconds
    #[arg(long)]
    source_timeout: Option<u64>,

    /// Print the newest item first
    #[arg(long)]
    newest_first: bool,

    #[arg(long = "facebook-page")]
    facebook_pages: Vec<String>,

    #[arg(long = "facebook-user")]
    facebook_users: Vec<String>,

    #[arg(long = "twitter-user")]
    twitter_users: Vec<String>,

    /// Search query; space separated terms, `operator:value` filters allowed
    #[arg(long = "twitter-search")]
    twitter_searches: Vec<String>,

    /// Repository as `owner/project`
    #[arg(long = "github-repo")]
    github_repos: Vec<String>,

    #[arg(long = "pinterest-board")]
    pinterest_boards: Vec<String>,

    #[arg(long = "instagram-user")]
    instagram_users: Vec<String>,
}

fn credential(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

fn parse_search(raw: &str) -> SearchQuery {
    raw.split_whitespace()
        .fold(SearchQuery::new(), |query, token| match token.split_once(':') {
            Some((operator, value)) => query.filter(operator, value),
            None => query.term(token),
        })
}

fn build_sources(
    args: &Args,
    transport: Arc<dyn Transport>,
    cache: &CacheAsideFetcher,
) -> mixed_feed::Result<Vec<Arc<dyn FeedSource>>> {
    let mut sources: Vec<Arc<dyn FeedSource>> = Vec::new();

    for page in &args.facebook_pages {
        let feed = FacebookPageFeed::new(page, &credential("FACEBOOK_ACCESS_TOKEN"), transport.clone())?;
        sources.push(Arc::new(feed.with_cache(cache.clone())));
    }
    for user in &args.facebook_users {
        let feed = FacebookUserFeed::new(user, &credential("FACEBOOK_USER_ACCESS_TOKEN"), transport.clone())?;
        sources.push(Arc::new(feed.with_cache(cache.clone())));
    }
    for user in &args.twitter_users {
        let feed = TwitterStatusFeed::new(user, &credential("TWITTER_BEARER_TOKEN"), transport.clone())?;
        sources.push(Arc::new(feed.with_cache(cache.clone())));
    }
    for search in &args.twitter_searches {
        let feed = TwitterSearchFeed::new(
            parse_search(search),
            &credential("TWITTER_BEARER_TOKEN"),
            transport.clone(),
        )?;
        sources.push(Arc::new(feed.with_cache(cache.clone())));
    }
    for repo in &args.github_repos {
        let feed = GithubReleasesFeed::new(repo, &credential("GITHUB_TOKEN"), transport.clone())?;
        sources.push(Arc::new(feed.with_cache(cache.clone())));
    }
    for board in &args.pinterest_boards {
        let feed = PinterestBoardFeed::new(board, &credential("PINTEREST_ACCESS_TOKEN"), transport.clone())?;
        sources.push(Arc::new(feed.with_cache(cache.clone())));
    }
    for user in &args.instagram_users {
        let feed = InstagramUserFeed::new(user, &credential("INSTAGRAM_ACCESS_TOKEN"), transport.clone())?;
        sources.push(Arc::new(feed.with_cache(cache.clone())));
    }

    Ok(sources)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(FetchConfig::default())?);
    let cache = CacheAsideFetcher::new(MemoryCache::shared()).with_ttl(args.ttl);

    let sources = build_sources(&args, transport, &cache)?;
    let mut feed = MixedFeed::new(sources, cache)?;
    info!("Configured {} sources", feed.sources().len());
    if let Some(feed_id) = &args.feed_id {
        feed = feed.with_feed_id(feed_id.clone());
    }
    if let Some(seconds) = args.source_timeout {
        feed = feed.with_source_timeout(Duration::from_secs(seconds));
    }

    let mut items = feed.get_normalized_items(args.count).await;
    if args.newest_first {
        items.reverse();
    }

    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}
