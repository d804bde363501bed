//! Column-based RSS/Atom dashboard.
//!
//! Feeds are grouped into named columns ([`store`]). Each column is fetched
//! through a CORS relay ([`relay`]), parsed and merged into one
//! newest-first article list ([`feed`]). The `feedboard` binary wraps this
//! in a CLI and can also serve the relay endpoint itself.

pub mod config;
pub mod feed;
pub mod relay;
pub mod store;
pub mod util;
