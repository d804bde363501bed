use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use url::Url;

use super::parser::RawFeedItem;
use crate::relay::RelayClient;

/// Meta keys holding a page's preview image, strongest first.
const PRIMARY_KEYS: [&str; 2] = ["og:image", "og:image:url"];
const FALLBACK_KEYS: [&str; 1] = ["twitter:image"];

/// Picks the display image for feed items.
///
/// An image embedded in the feed wins and costs nothing. Otherwise the
/// article page is fetched through the relay and its `og:image` (or
/// `twitter:image`) metadata is used. Every failure ends at the placeholder.
///
/// Discovery results are cached per article link, including pages that had
/// no preview image. Transport failures are not cached, so the next refresh
/// tries again.
pub struct ImageResolver {
    relay: RelayClient,
    placeholder: String,
    cache: Mutex<LruCache<String, Option<String>>>,
}

impl std::fmt::Debug for ImageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResolver")
            .field("relay", &self.relay.base().as_str())
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

impl ImageResolver {
    /// Creates a resolver with an empty discovery cache.
    ///
    /// # Arguments
    ///
    /// * `relay` - client used for page fetches
    /// * `placeholder` - URL returned when no image is found
    /// * `cache_capacity` - article links remembered; zero is treated as one
    pub fn new(relay: RelayClient, placeholder: impl Into<String>, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            relay,
            placeholder: placeholder.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Number of article links with a remembered discovery result.
    pub fn cached_links(&self) -> usize {
        self.lock_cache().len()
    }

    /// Returns the image URL to show for `item`. Never fails.
    ///
    /// The embedded image wins without any request. Otherwise the article
    /// page is fetched through the relay once per link and its preview image
    /// remembered; a page without one is remembered too. Transport failures
    /// are not cached, so the next refresh tries again.
    pub async fn resolve(&self, item: &RawFeedItem) -> String {
        if let Some(image) = &item.image {
            return image.clone();
        }

        let page = match Url::parse(&item.link) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return self.placeholder.clone(),
        };

        if let Some(cached) = self.lock_cache().get(page.as_str()).cloned() {
            return cached.unwrap_or_else(|| self.placeholder.clone());
        }

        let html = match self.relay.fetch(&page).await {
            Ok(html) => html,
            Err(e) => {
                tracing::debug!(page = %page, error = %e, "Image discovery fetch failed");
                return self.placeholder.clone();
            }
        };

        let discovered = find_preview_image(&html, &page);
        if discovered.is_none() {
            tracing::debug!(page = %page, "No preview image metadata");
        }
        self.lock_cache()
            .put(page.as_str().to_string(), discovered.clone());

        discovered.unwrap_or_else(|| self.placeholder.clone())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, Option<String>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Extracts the preview image URL from a page's `<meta>` tags.
///
/// Looks for `property` or `name` equal to `og:image` (or `og:image:url`),
/// falling back to `twitter:image`. Relative values are resolved against
/// `page_url`; only http(s) results are returned.
///
/// Uses plain string scanning, not a full HTML parser.
///
/// # Examples
///
/// ```
/// use feedboard::feed::find_preview_image;
/// use url::Url;
///
/// let page = Url::parse("https://example.com/posts/1").unwrap();
/// let html = r#"<head><meta property="og:image" content="/img/cover.png"></head>"#;
/// assert_eq!(
///     find_preview_image(html, &page).as_deref(),
///     Some("https://example.com/img/cover.png")
/// );
/// ```
pub fn find_preview_image(html: &str, page_url: &Url) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let html_lower = html.to_ascii_lowercase();
    let mut search_from = 0;
    let mut fallback: Option<String> = None;

    while let Some(offset) = html_lower[search_from..].find("<meta") {
        let start = search_from + offset;
        let Some(len) = html_lower[start..].find('>') else {
            break;
        };
        let tag = &html[start..=start + len];
        search_from = start + len + 1;

        let attrs = parse_attributes(tag);
        let key = attr(&attrs, "property").or_else(|| attr(&attrs, "name"));
        let Some(key) = key.map(|k| k.trim().to_ascii_lowercase()) else {
            continue;
        };

        let is_primary = PRIMARY_KEYS.contains(&key.as_str());
        if !is_primary && (fallback.is_some() || !FALLBACK_KEYS.contains(&key.as_str())) {
            continue;
        }

        let Some(image) = attr(&attrs, "content").and_then(|c| resolve_image_url(c, page_url))
        else {
            continue;
        };

        if is_primary {
            return Some(image);
        }
        fallback = Some(image);
    }

    fallback
}

fn attr<'a>(attrs: &[(String, &'a str)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| *value)
}

/// Splits a start tag into `(lowercased name, raw value)` pairs.
///
/// Accepts double-quoted, single-quoted and unquoted values. Attributes
/// without a value are skipped.
fn parse_attributes(tag: &str) -> Vec<(String, &str)> {
    let inner = tag
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end_matches('/');
    // Skip the element name
    let mut rest = inner
        .find(|c: char| c.is_ascii_whitespace())
        .map_or("", |i| &inner[i..]);

    let mut attrs = Vec::new();
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let Some(after_eq) = rest.strip_prefix('=') else {
            continue;
        };
        let after_eq = after_eq.trim_start();

        let (value, remainder) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &after_eq[1..];
                match body.find(quote) {
                    Some(end) => (&body[..end], &body[end + 1..]),
                    None => (body, ""),
                }
            }
            _ => {
                let end = after_eq
                    .find(|c: char| c.is_ascii_whitespace())
                    .unwrap_or(after_eq.len());
                (&after_eq[..end], &after_eq[end..])
            }
        };
        attrs.push((name, value));
        rest = remainder;
    }
    attrs
}

fn resolve_image_url(raw: &str, page_url: &Url) -> Option<String> {
    let value = raw.trim().replace("&amp;", "&");
    if value.is_empty() {
        return None;
    }
    let resolved = page_url.join(&value).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page() -> Url {
        Url::parse("https://news.example.com/2024/story.html").unwrap()
    }

    fn item(link: &str, image: Option<&str>) -> RawFeedItem {
        RawFeedItem {
            title: "Story".to_string(),
            link: link.to_string(),
            description: "Text".to_string(),
            published: None,
            image: image.map(str::to_string),
        }
    }

    async fn resolver_for(server: &MockServer) -> ImageResolver {
        let base = Url::parse(&format!("{}/api/cors", server.uri())).unwrap();
        ImageResolver::new(
            RelayClient::new(reqwest::Client::new(), base),
            "https://via.placeholder.com/150",
            16,
        )
    }

    #[test]
    fn test_og_image_property() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta property="og:image" content="https://cdn.example.com/cover.jpg" />
        </head></html>"#;
        assert_eq!(
            find_preview_image(html, &page()).as_deref(),
            Some("https://cdn.example.com/cover.jpg")
        );
    }

    #[test]
    fn test_og_image_name_attribute_any_order() {
        let html = r#"<META CONTENT='https://cdn.example.com/a.png' NAME='og:image'>"#;
        assert_eq!(
            find_preview_image(html, &page()).as_deref(),
            Some("https://cdn.example.com/a.png")
        );
    }

    #[test]
    fn test_relative_content_resolved_against_page() {
        let html = r#"<meta property="og:image" content="../img/a.png?w=1&amp;h=2">"#;
        assert_eq!(
            find_preview_image(html, &page()).as_deref(),
            Some("https://news.example.com/img/a.png?w=1&h=2")
        );
    }

    #[test]
    fn test_og_wins_over_earlier_twitter() {
        let html = r#"
            <meta name="twitter:image" content="https://cdn.example.com/tw.png">
            <meta property="og:image" content="https://cdn.example.com/og.png">"#;
        assert_eq!(
            find_preview_image(html, &page()).as_deref(),
            Some("https://cdn.example.com/og.png")
        );
    }

    #[test]
    fn test_twitter_fallback() {
        let html = r#"<meta name=twitter:image content=https://cdn.example.com/tw.png>"#;
        assert_eq!(
            find_preview_image(html, &page()).as_deref(),
            Some("https://cdn.example.com/tw.png")
        );
    }

    #[test]
    fn test_no_metadata_or_unusable_values() {
        assert_eq!(find_preview_image("<html><body>hi</body></html>", &page()), None);
        assert_eq!(
            find_preview_image(r#"<meta property="og:image" content="  ">"#, &page()),
            None
        );
        assert_eq!(
            find_preview_image(
                r#"<meta property="og:image" content="javascript:alert(1)">"#,
                &page()
            ),
            None
        );
        assert_eq!(find_preview_image("<meta property=\"og:image\"", &page()), None);
    }

    #[tokio::test]
    async fn test_embedded_image_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let resolver = resolver_for(&server).await;
        let image = resolver
            .resolve(&item("https://news.example.com/a", Some("https://cdn/x.jpg")))
            .await;
        assert_eq!(image, "https://cdn/x.jpg");
    }

    #[tokio::test]
    async fn test_non_http_link_gets_placeholder_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let resolver = resolver_for(&server).await;
        assert_eq!(resolver.resolve(&item("#", None)).await, resolver.placeholder());
        assert_eq!(
            resolver.resolve(&item("mailto:a@b.c", None)).await,
            resolver.placeholder()
        );
    }

    #[tokio::test]
    async fn test_discovery_through_relay_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cors"))
            .and(query_param("url", "https://news.example.com/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<meta property="og:image" content="/cover.png">"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver_for(&server).await;
        let link = item("https://news.example.com/a", None);
        assert_eq!(resolver.resolve(&link).await, "https://news.example.com/cover.png");
        assert_eq!(resolver.resolve(&link).await, "https://news.example.com/cover.png");
        assert_eq!(resolver.cached_links(), 1);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_cached_as_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cors"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver_for(&server).await;
        let link = item("https://news.example.com/plain", None);
        assert_eq!(resolver.resolve(&link).await, resolver.placeholder());
        assert_eq!(resolver.resolve(&link).await, resolver.placeholder());
    }

    #[tokio::test]
    async fn test_fetch_failure_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cors"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let resolver = resolver_for(&server).await;
        let link = item("https://news.example.com/down", None);
        assert_eq!(resolver.resolve(&link).await, resolver.placeholder());
        assert_eq!(resolver.resolve(&link).await, resolver.placeholder());
        assert_eq!(resolver.cached_links(), 0);
    }
}
