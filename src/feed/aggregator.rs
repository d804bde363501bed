use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use super::image::ImageResolver;
use super::parser::{parse_feed, RawFeedItem};
use crate::relay::{RelayClient, RelayError};
use crate::store::FeedSource;

const DEFAULT_CONCURRENCY: usize = 8;

/// A feed item ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayArticle {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
    /// Host of the source feed, without `www.`
    pub channel_title: String,
    /// Embedded, discovered, or placeholder image
    pub image_url: String,
}

impl DisplayArticle {
    fn from_item(item: RawFeedItem, channel_title: String, image_url: String) -> Self {
        Self {
            title: item.title,
            link: item.link,
            description: item.description,
            published: item.published,
            channel_title,
            image_url,
        }
    }

    /// Publication instant for display; unknown dates show as the epoch.
    pub fn published_or_epoch(&self) -> DateTime<Utc> {
        self.published.unwrap_or_default()
    }
}

/// What happened to one source during an aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: FeedSource,
    /// Item count on success, the failure message otherwise.
    pub outcome: Result<usize, String>,
}

impl SourceReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Articles of one column, newest first, plus one report per source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedFeed {
    pub articles: Vec<DisplayArticle>,
    pub reports: Vec<SourceReport>,
}

impl AggregatedFeed {
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Sources skipped in this pass.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.reports.iter().filter(|r| !r.is_ok())
    }
}

/// Fetches, parses and merges the feeds of a column.
///
/// Source fetches and image lookups each run in a bounded window of
/// concurrent requests. Results are gathered in source order and then
/// stably sorted, so request completion order never shows in the output.
#[derive(Debug)]
pub struct Aggregator {
    relay: RelayClient,
    images: ImageResolver,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(relay: RelayClient, images: ImageResolver) -> Self {
        Self {
            relay,
            images,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Caps in-flight requests per phase.
    ///
    /// Feed fetches and page-image lookups are separate phases, so at most
    /// `concurrency` relay requests run at once. Zero is treated as one.
    /// Output order does not depend on this value.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    /// Builds the merged article list for `sources`.
    ///
    /// A source that cannot be fetched is logged, reported, and skipped; it
    /// never fails the pass. An empty source list yields an empty feed.
    ///
    /// # Returns
    ///
    /// Articles newest first (undated last, ties in source then item order)
    /// and one [`SourceReport`] per entry of `sources`, in the same order.
    pub async fn aggregate(&self, sources: &[FeedSource]) -> AggregatedFeed {
        if sources.is_empty() {
            return AggregatedFeed::default();
        }

        let fetched: Vec<(&FeedSource, Result<Vec<RawFeedItem>, RelayError>)> =
            stream::iter(sources)
                .map(|source| async move { (source, self.fetch_source(source).await) })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut reports = Vec::with_capacity(fetched.len());
        let mut pending = Vec::new();
        for (source, result) in fetched {
            match result {
                Ok(items) => {
                    reports.push(SourceReport {
                        source: source.clone(),
                        outcome: Ok(items.len()),
                    });
                    let channel = source.channel_title();
                    pending.extend(items.into_iter().map(|item| (channel.clone(), item)));
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "Skipping feed source");
                    reports.push(SourceReport {
                        source: source.clone(),
                        outcome: Err(e.to_string()),
                    });
                }
            }
        }

        let mut articles: Vec<DisplayArticle> = stream::iter(pending)
            .map(|(channel, item)| async move {
                let image_url = self.images.resolve(&item).await;
                DisplayArticle::from_item(item, channel, image_url)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        sort_newest_first(&mut articles);

        tracing::debug!(
            sources = sources.len(),
            failed = reports.iter().filter(|r| !r.is_ok()).count(),
            articles = articles.len(),
            "Aggregated column"
        );

        AggregatedFeed { articles, reports }
    }

    async fn fetch_source(&self, source: &FeedSource) -> Result<Vec<RawFeedItem>, RelayError> {
        let raw = self.relay.fetch(source.url()).await?;
        let items = parse_feed(&raw);
        if items.is_empty() {
            tracing::debug!(source = %source, "Feed yielded no items");
        }
        Ok(items)
    }
}

/// Orders articles by publication instant, newest first.
///
/// Stable: equal instants keep their current relative order. Unknown dates
/// go after every dated article.
pub fn sort_newest_first(articles: &mut [DisplayArticle]) {
    // `None < Some(_)`, so reversing the comparison puts undated items last
    articles.sort_by(|a, b| b.published.cmp(&a.published));
}
