use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::util::{validate_url, UrlValidationError};

#[derive(Debug, Error)]
#[error("Invalid feed URL '{input}': {reason}")]
pub struct FeedSourceError {
    pub input: String,
    pub reason: UrlValidationError,
}

/// The bare URL of a feed endpoint.
///
/// Never carries a relay prefix: relay wrapping is applied by
/// [`RelayClient`](crate::relay::RelayClient) at fetch time only. Two
/// sources are the same key when their normalized URLs are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedSource(Url);

impl FeedSource {
    /// Parses a bare feed URL.
    pub fn parse(input: &str) -> Result<Self, FeedSourceError> {
        validate_url(input)
            .map(Self)
            .map_err(|reason| FeedSourceError {
                input: input.to_string(),
                reason,
            })
    }

    /// Parses a feed URL that may carry one or more legacy relay prefixes.
    ///
    /// Older dashboards stored sources as `<relay prefix><target>`, and
    /// re-editing them could stack the prefix twice. Every matching prefix
    /// is peeled off before parsing. A prefix ending in `=` (query-style
    /// relays such as `https://relay/api/cors?url=`) has its remainder
    /// percent-decoded.
    ///
    /// # Examples
    ///
    /// ```
    /// use feedboard::store::FeedSource;
    ///
    /// let prefixes = vec!["https://cors-anywhere.herokuapp.com/".to_string()];
    /// let source = FeedSource::parse_legacy(
    ///     "https://cors-anywhere.herokuapp.com/https://cors-anywhere.herokuapp.com/https://example.com/rss",
    ///     &prefixes,
    /// )
    /// .unwrap();
    /// assert_eq!(source.as_str(), "https://example.com/rss");
    /// ```
    pub fn parse_legacy(input: &str, prefixes: &[String]) -> Result<Self, FeedSourceError> {
        let mut current = input.trim().to_string();
        'peel: loop {
            for prefix in prefixes.iter().filter(|p| !p.is_empty()) {
                if let Some(rest) = current.strip_prefix(prefix.as_str()) {
                    current = if prefix.ends_with('=') {
                        decode_component(rest)
                    } else {
                        rest.to_string()
                    };
                    continue 'peel;
                }
            }
            break;
        }
        Self::parse(&current).map_err(|e| FeedSourceError {
            input: input.to_string(),
            reason: e.reason,
        })
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Display name for articles from this source: the host without `www.`.
    ///
    /// # Examples
    ///
    /// ```
    /// use feedboard::store::FeedSource;
    ///
    /// let source = FeedSource::parse("https://www.theguardian.com/technology/rss").unwrap();
    /// assert_eq!(source.channel_title(), "theguardian.com");
    /// ```
    pub fn channel_title(&self) -> String {
        match self.0.host_str() {
            Some(host) => host.strip_prefix("www.").unwrap_or(host).to_string(),
            None => self.0.to_string(),
        }
    }
}

fn decode_component(encoded: &str) -> String {
    url::form_urlencoded::parse(format!("v={encoded}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedSource {
    type Err = FeedSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FeedSource {
    type Error = FeedSourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FeedSource> for String {
    fn from(source: FeedSource) -> Self {
        source.0.into()
    }
}
