use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::ensure_public_host;

/// Default cap on a relayed response body (10MB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Redirect hops followed before a request fails.
pub const MAX_REDIRECTS: usize = 3;

const USER_AGENT: &str = concat!("feedboard/", env!("CARGO_PKG_VERSION"));

/// Errors from a single relay round-trip.
///
/// There are no retries: every variant is terminal for that call, and the
/// caller treats the target as "yielded nothing this round".
#[derive(Debug, Error)]
pub enum RelayError {
    /// Transport failure (DNS, connect, TLS, timeout, broken body stream)
    #[error("Relay request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The relay answered with a non-2xx status
    #[error("Relay returned HTTP status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Fewer body bytes arrived than `Content-Length` announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Client builder with the timeout and user agent every feedboard request
/// carries. No redirect policy is set yet.
pub fn http_client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
}

/// Builds the shared HTTP client used for relay requests.
///
/// Redirects follow [`redirect_policy`] with private hosts allowed.
///
/// # Errors
///
/// Returns the `reqwest` error when the TLS backend fails to initialize.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    http_client_builder(timeout)
        .redirect(redirect_policy(true))
        .build()
}

/// Redirect policy with loop detection and at most [`MAX_REDIRECTS`] hops.
///
/// Unless `allow_private_targets` is set, every hop is re-checked with
/// [`ensure_public_host`] (SEC-014: no hop may land on loopback or the LAN).
/// A rejected hop fails the request with the
/// [`UrlValidationError`](crate::util::UrlValidationError) as the error source.
///
/// # Arguments
///
/// * `allow_private_targets` - skip the per-hop host check
pub fn redirect_policy(allow_private_targets: bool) -> Policy {
    Policy::custom(move |attempt| {
        // previous() starts with the original URL, which is not a hop
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        if !allow_private_targets {
            if let Err(e) = ensure_public_host(url) {
                tracing::warn!(to = %url, error = %e, "Refusing redirect to private host");
                return attempt.error(e);
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len(),
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Fetches arbitrary URLs through a CORS relay endpoint.
///
/// The relay is addressed as `<base>?url=<url-encoded target>`. Targets are
/// always bare URLs; the relay wrapping exists only for the duration of the
/// request and is never stored.
///
/// Cloning is cheap: `reqwest::Client` is reference-counted internally.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    base: Url,
    max_response_bytes: usize,
}

impl RelayClient {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self {
            client,
            base,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Caps response bodies at `limit` bytes (default
    /// [`DEFAULT_MAX_RESPONSE_BYTES`]). Larger bodies fail with
    /// [`RelayError::ResponseTooLarge`] without being read in full.
    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    /// The relay endpoint this client talks to.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The full relay request URL for `target`.
    ///
    /// # Examples
    ///
    /// ```
    /// use feedboard::relay::RelayClient;
    /// use url::Url;
    ///
    /// let relay = RelayClient::new(
    ///     reqwest::Client::new(),
    ///     Url::parse("https://dash.example.com/api/cors").unwrap(),
    /// );
    /// let target = Url::parse("https://example.com/rss?lang=en").unwrap();
    /// assert_eq!(
    ///     relay.relay_url(&target).as_str(),
    ///     "https://dash.example.com/api/cors?url=https%3A%2F%2Fexample.com%2Frss%3Flang%3Den"
    /// );
    /// ```
    pub fn relay_url(&self, target: &Url) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("url", target.as_str());
        url
    }

    /// Fetches `target` through the relay and returns the body as text.
    ///
    /// Exactly one request is made. Invalid UTF-8 is replaced rather than
    /// rejected, since feed and page bodies are parsed best-effort anyway.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Network`] - transport failure, including timeout
    /// - [`RelayError::HttpStatus`] - relay answered with a non-2xx status
    /// - [`RelayError::ResponseTooLarge`] - body exceeded the configured limit
    /// - [`RelayError::IncompleteResponse`] - body shorter than announced
    pub async fn fetch(&self, target: &Url) -> Result<String, RelayError> {
        let request_url = self.relay_url(target);
        tracing::trace!(target = %target, "Relay fetch");

        let response = self.client.get(request_url).send().await?;

        if !response.status().is_success() {
            return Err(RelayError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, self.max_response_bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Reads a response body, failing as soon as it grows past `limit` or when
/// it ends short of the announced `Content-Length`.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, RelayError> {
    let expected_length = response.content_length();
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(RelayError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(RelayError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    // A truncated feed must not reach the parser as if it were whole
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(RelayError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
