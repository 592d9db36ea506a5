//! HTTP side of dav-sync
//!
//! - `client` - `HttpTransport`, the reqwest `Transport`
//! - `api` - `DavApi`, request shaping and status classification for the dav endpoints
//! - `models` - wire shapes
//! - `fake` - `FakeDavServer`, an in-memory `Transport` for tests and offline use
//! - `dav_client` - `DavClient`, the facade applications use

pub mod api;
pub mod client;
pub mod dav_client;
pub mod fake;
pub mod models;

pub use api::{classify_response, DavApi, SESSION_EXPIRED_CODE};
pub use client::HttpTransport;
pub use dav_client::{ClientError, DavClient};
pub use fake::FakeDavServer;
