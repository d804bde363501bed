//! Utility functions shared by the feed pipeline and the relay.
//!
//! - **URL validation**: scheme checks and private-network rejection for relay targets
//! - **Text processing**: tag stripping, character truncation, control-character removal
//!
//! # Examples
//!
//! ```
//! use feedboard::util::{strip_tags, truncate_chars, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(strip_tags("<p>Hello</p>"), "Hello");
//! assert_eq!(truncate_chars("Hello World", 5), "Hello...");
//! ```

mod text;
mod url_validator;

pub use text::{strip_control_chars, strip_tags, truncate_chars, ELLIPSIS};
pub use url_validator::{ensure_public_host, validate_url, UrlValidationError};
