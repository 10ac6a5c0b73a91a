#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Declarative HTTP client for `ModKit`
//!
//! Describe a request as a value, hand it to an [`HttpClient`], read the
//! response. The crate provides:
//! - [`Request`] with string method/URI, typed body, query source, headers,
//!   cookies, basic auth and a pre-send hook
//! - Query strings from [`QueryValues`], `#[derive(QueryEncode)]` records or
//!   any `Serialize` record
//! - Symmetric compression: the request body is compressed and a matching
//!   response is decompressed with the same [`Compression`] codec
//! - A redirect limit reported as an error together with the last response
//! - Overall and connect timeouts with timeout classification on errors
//! - HTTP forward proxy and CONNECT tunneling with credentials and extra
//!   CONNECT headers
//! - Pluggable [`CookieStore`] and [`Transport`]
//!
//! # Example
//!
//! ```ignore
//! use modkit_fetch::{Compression, HttpClient, QueryEncode, QuerySource, Request};
//!
//! #[derive(QueryEncode)]
//! struct Search {
//!     #[query(rename = "q")]
//!     pub term: String,
//!     #[query(omitempty)]
//!     pub page: Option<u32>,
//! }
//!
//! let client = HttpClient::builder().max_redirects(3).build()?;
//! let response = client
//!     .dispatch(
//!         Request::get("https://api.example.com/search")
//!             .query(QuerySource::record(Search { term: "rust".into(), page: None }))
//!             .compression(Compression::gzip()),
//!     )
//!     .await?;
//! let hits: Vec<Hit> = response.json().await?;
//! ```

extern crate self as modkit_fetch;

mod body;
mod builder;
mod client;
mod compression;
mod config;
mod cookie;
mod error;
mod layers;
mod query;
mod request;
mod response;
mod tls;
mod transport;

pub use body::RequestBody;
pub use builder::{HttpClientBuilder, Transport};
pub use client::{DispatchContext, HttpClient};
pub use compression::{Codec, Compress, Compression, Decompress, DeflateCodec, GzipCodec};
pub use config::{
    ClientOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpClientConfig,
    TlsRootConfig,
};
pub use cookie::{CookieStore, MemoryCookieStore};
pub use error::{BoxError, DispatchError, HttpError, InvalidUriKind};
pub use layers::{
    CookieFuture, CookieLayer, CookieService, ProxyAuthorizationLayer, ProxyAuthorizationService,
    RedirectLimit, RedirectOutcome, UserAgentLayer, UserAgentService,
};
pub use query::{QueryEncode, QuerySource, QueryValue, QueryValues};
pub use request::{BasicAuth, BeforeRequestHook, Cookie, Request, WireRequest, parse_uri};
pub use response::{HttpResponse, RawBody, ResponseBody};
pub use transport::{ProxyRoute, ProxySettings, redact_proxy};

/// `#[derive(QueryEncode)]`, see [`QueryEncode`]
pub use modkit_fetch_macros::QueryEncode;
