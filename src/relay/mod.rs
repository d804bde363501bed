//! CORS relay: the client side used by the feed pipeline, and a server
//! implementing the relay endpoint for self-hosted setups.
//!
//! - [`client`] - one request per call through `<relay>?url=<target>`
//! - [`server`] - axum handler answering that contract

mod client;
mod server;

pub use client::{
    build_http_client, http_client_builder, redirect_policy, RelayClient, RelayError,
    DEFAULT_MAX_RESPONSE_BYTES, MAX_REDIRECTS,
};
pub use server::{router, serve, RelayState, RELAY_PATH};
