//! Feed pipeline: parse feeds, resolve images, merge a column's sources.
//!
//! - [`parser`] - RSS/Atom markup to normalized items via `feed-rs`
//! - [`image`] - embedded image, else `og:image` discovery through the relay
//! - [`aggregator`] - concurrent fetch of a column's sources, merged newest first
//! - [`refresh`] - per-column "latest request wins" publication
//!
//! # Example
//!
//! ```no_run
//! use feedboard::feed::{Aggregator, ImageResolver};
//! use feedboard::relay::RelayClient;
//! use feedboard::store::FeedSource;
//! use url::Url;
//!
//! # async fn run() {
//! let relay = RelayClient::new(
//!     reqwest::Client::new(),
//!     Url::parse("http://127.0.0.1:8787/api/cors").unwrap(),
//! );
//! let images = ImageResolver::new(relay.clone(), "https://via.placeholder.com/150", 512);
//! let aggregator = Aggregator::new(relay, images);
//!
//! let sources = [FeedSource::parse("https://www.theguardian.com/technology/telecoms/rss").unwrap()];
//! let feed = aggregator.aggregate(&sources).await;
//! for article in &feed.articles {
//!     println!("{} ({})", article.title, article.channel_title);
//! }
//! # }
//! ```

pub mod aggregator;
pub mod image;
pub mod parser;
pub mod refresh;

pub use aggregator::{sort_newest_first, AggregatedFeed, Aggregator, DisplayArticle, SourceReport};
pub use image::{find_preview_image, ImageResolver};
pub use parser::{
    parse_feed, RawFeedItem, DEFAULT_DESCRIPTION, DEFAULT_LINK, DEFAULT_TITLE,
    MAX_DESCRIPTION_CHARS,
};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
