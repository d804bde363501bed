use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Errors that can occur during URL validation.
///
/// Parsing failures and scheme problems apply to every URL the dashboard
/// stores; the host checks apply to targets the relay is asked to fetch.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
    /// The URL points to localhost or a local-only hostname.
    #[error("Local host not allowed: {0}")]
    LocalHost(String),
}

/// Parses `url_str` as an absolute http(s) URL with a host.
///
/// # Examples
///
/// ```
/// use feedboard::util::validate_url;
///
/// assert!(validate_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("/relative/path").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

/// Rejects URLs whose host is loopback, private, link-local, or a
/// local-only hostname.
///
/// Hostnames are not resolved; only literal addresses and well-known local
/// suffixes are checked.
///
/// # Examples
///
/// ```
/// use feedboard::util::{ensure_public_host, validate_url};
///
/// let public = validate_url("https://example.com/rss").unwrap();
/// assert!(ensure_public_host(&public).is_ok());
///
/// let private = validate_url("http://192.168.1.1/rss").unwrap();
/// assert!(ensure_public_host(&private).is_err());
/// ```
pub fn ensure_public_host(url: &Url) -> Result<(), UrlValidationError> {
    match url.host().ok_or(UrlValidationError::MissingHost)? {
        Host::Domain(domain) => {
            if is_local_hostname(domain) {
                return Err(UrlValidationError::LocalHost(domain.to_owned()));
            }
        }
        Host::Ipv4(ip) => {
            if is_private_v4(&ip) {
                return Err(UrlValidationError::PrivateIp(IpAddr::V4(ip)));
            }
        }
        Host::Ipv6(ip) => {
            if is_private_v6(&ip) {
                return Err(UrlValidationError::PrivateIp(IpAddr::V6(ip)));
            }
        }
    }
    Ok(())
}

fn is_local_hostname(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "localhost"
        || [".localhost", ".local", ".internal", ".lan"]
            .iter()
            .any(|suffix| host.ends_with(suffix))
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(&v4);
    }
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
