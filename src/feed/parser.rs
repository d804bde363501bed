use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link, MediaObject};
use feed_rs::parser;

use crate::util::{strip_control_chars, strip_tags, truncate_chars};

pub const DEFAULT_TITLE: &str = "No Title";
pub const DEFAULT_LINK: &str = "#";
pub const DEFAULT_DESCRIPTION: &str = "No Description";
/// Descriptions longer than this (in characters) are cut and get `...`.
pub const MAX_DESCRIPTION_CHARS: usize = 400;

/// One feed item, normalized. Every field has a usable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// `None` when the feed gave no parseable date; such items sort last.
    pub published: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

impl RawFeedItem {
    /// Publication instant for display, with unknown dates shown as the epoch.
    pub fn published_or_epoch(&self) -> DateTime<Utc> {
        self.published.unwrap_or_default()
    }
}

/// Parses RSS/Atom markup into normalized items, in document order.
///
/// Never fails: markup the feed library cannot decode yields no items.
pub fn parse_feed(raw: &str) -> Vec<RawFeedItem> {
    let feed = match parser::parse(raw.as_bytes()) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::debug!(error = %e, bytes = raw.len(), "Unparseable feed, no items");
            return Vec::new();
        }
    };

    feed.entries.into_iter().map(normalize_entry).collect()
}

fn normalize_entry(entry: Entry) -> RawFeedItem {
    let title = entry
        .title
        .as_ref()
        .and_then(|t| non_blank(&t.content))
        .map(|t| strip_control_chars(t).into_owned())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let link = pick_link(&entry.links).unwrap_or_else(|| DEFAULT_LINK.to_string());

    let raw_description = entry
        .summary
        .as_ref()
        .and_then(|s| non_blank(&s.content))
        .or_else(|| {
            entry
                .content
                .as_ref()
                .and_then(|c| c.body.as_deref())
                .and_then(non_blank)
        });
    let description = raw_description
        .map(clean_description)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    RawFeedItem {
        title,
        link,
        description,
        published: entry.published.or(entry.updated),
        image: embedded_image(&entry.media),
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Atom `alternate` link first, then the first link with an href.
fn pick_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate") && non_blank(&l.href).is_some())
        .or_else(|| links.iter().find(|l| non_blank(&l.href).is_some()))
        .map(|l| l.href.trim().to_string())
}

/// Tags removed, whitespace collapsed, then cut to the display limit.
fn clean_description(html: &str) -> String {
    let stripped = strip_tags(html);
    let sanitized = strip_control_chars(&stripped);
    let collapsed = sanitized.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, MAX_DESCRIPTION_CHARS).into_owned()
}

/// Image carried by the feed itself.
///
/// Preference: a media content with an `image/*` type, then any media
/// content without a declared type, then a thumbnail.
///
/// RSS enclosures and `media:content` both land in [`MediaObject::content`]
/// and cannot be told apart, so a declared non-image type (an `audio/mpeg`
/// podcast enclosure, a `video/mp4` clip) never counts as an image.
fn embedded_image(media: &[MediaObject]) -> Option<String> {
    let contents = || media.iter().flat_map(|m| m.content.iter());

    let typed = contents().find(|c| {
        c.url.is_some()
            && c
                .content_type
                .as_ref()
                .is_some_and(|ct| ct.ty() == "image")
    });
    let untyped = || contents().find(|c| c.url.is_some() && c.content_type.is_none());

    if let Some(url) = typed.or_else(untyped).and_then(|c| c.url.as_ref()) {
        return Some(url.to_string());
    }

    media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.trim())
        .find(|uri| !uri.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <item>
      <title>First post</title>
      <link>https://example.com/first</link>
      <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
      <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
      <enclosure url="https://example.com/first.jpg" type="image/jpeg" length="100"/>
    </item>
    <item>
      <title>   </title>
      <description>Second</description>
      <media:content url="https://example.com/second.png" medium="image"/>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:example</id>
  <updated>2024-03-01T00:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:example:1</id>
    <link rel="self" href="https://example.com/self"/>
    <link rel="alternate" href="https://example.com/entry"/>
    <updated>2024-03-01T12:00:00Z</updated>
    <summary type="html">&lt;div&gt;Summary   text&lt;/div&gt;</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let items = parse_feed(RSS);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "First post");
        assert_eq!(first.link, "https://example.com/first");
        assert_eq!(first.description, "Hello world");
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(first.image.as_deref(), Some("https://example.com/first.jpg"));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let items = parse_feed(RSS);
        let second = &items[1];
        assert_eq!(second.title, DEFAULT_TITLE);
        assert_eq!(second.link, DEFAULT_LINK);
        assert_eq!(second.published, None);
        assert_eq!(second.published_or_epoch().timestamp(), 0);
        assert_eq!(second.image.as_deref(), Some("https://example.com/second.png"));
    }

    #[test]
    fn test_parse_atom_prefers_alternate_link() {
        let items = parse_feed(ATOM);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://example.com/entry");
        assert_eq!(items[0].description, "Summary text");
        assert_eq!(
            items[0].published,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(items[0].image, None);
    }

    #[test]
    fn test_long_description_truncated() {
        let body = "x".repeat(MAX_DESCRIPTION_CHARS + 50);
        let rss = format!(
            r#"<rss version="2.0"><channel><title>t</title>
               <item><title>Long</title><description>{body}</description></item>
               </channel></rss>"#
        );
        let items = parse_feed(&rss);
        let description = &items[0].description;
        assert_eq!(description.chars().count(), MAX_DESCRIPTION_CHARS + 3);
        assert!(description.ends_with("..."));
    }

    #[test]
    fn test_description_at_limit_untouched() {
        let body = "y".repeat(MAX_DESCRIPTION_CHARS);
        let rss = format!(
            r#"<rss version="2.0"><channel><title>t</title>
               <item><title>Exact</title><description>{body}</description></item>
               </channel></rss>"#
        );
        assert_eq!(parse_feed(&rss)[0].description, body);
    }

    #[test]
    fn test_missing_description_defaults() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>Bare</title><link>https://example.com/bare</link></item>
            </channel></rss>"#;
        assert_eq!(parse_feed(rss)[0].description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn test_audio_enclosure_is_not_an_image() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>Podcast</title>
              <enclosure url="https://example.com/ep.mp3" type="audio/mpeg" length="1"/>
            </item>
            </channel></rss>"#;
        assert_eq!(parse_feed(rss)[0].image, None);
    }

    #[test]
    fn test_image_type_match_ignores_case() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>Shouty</title>
              <enclosure url="https://example.com/a.png" type="IMAGE/PNG" length="1"/>
            </item>
            </channel></rss>"#;
        assert_eq!(
            parse_feed(rss)[0].image.as_deref(),
            Some("https://example.com/a.png")
        );
    }

    #[test]
    fn test_typed_video_media_falls_through_to_thumbnail() {
        let rss = r#"<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
            <channel><title>t</title>
            <item><title>Clip</title>
              <media:content url="https://example.com/clip.mp4" type="video/mp4"/>
              <media:thumbnail url="https://example.com/clip.jpg"/>
            </item>
            </channel></rss>"#;
        assert_eq!(
            parse_feed(rss)[0].image.as_deref(),
            Some("https://example.com/clip.jpg")
        );
    }

    #[test]
    fn test_unparseable_date_is_unknown() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>Bad</title><pubDate>not a date</pubDate></item>
            <item><title>Good</title><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
            </channel></rss>"#;
        let dates: Vec<_> = parse_feed(rss)
            .into_iter()
            .map(|item| (item.title, item.published))
            .collect();
        assert_eq!(
            dates,
            vec![
                ("Bad".to_string(), None),
                (
                    "Good".to_string(),
                    Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
                ),
            ]
        );
    }

    #[test]
    fn test_thumbnail_is_last_resort() {
        let rss = r#"<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
            <channel><title>t</title>
            <item><title>Video</title>
              <media:thumbnail url="https://example.com/thumb.jpg"/>
            </item>
            </channel></rss>"#;
        assert_eq!(
            parse_feed(rss)[0].image.as_deref(),
            Some("https://example.com/thumb.jpg")
        );
    }

    #[test]
    fn test_garbage_yields_no_items() {
        assert!(parse_feed("").is_empty());
        assert!(parse_feed("<html><body>not a feed</body></html>").is_empty());
        assert!(parse_feed("{ definitely not xml").is_empty());
    }
}
