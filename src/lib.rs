//! # authnet
//!
//! A Chromium-inspired HTTP client authentication core for Rust.
//!
//! `authnet` handles the authentication side of an HTTP client: it parses
//! server and proxy challenges, picks the strongest scheme it can obtain
//! credentials for, emits `Authorization` / `Proxy-Authorization` headers,
//! and checks the server's proof for schemes that support mutual
//! authentication.
//!
//! ## Features
//!
//! - **Basic** (RFC 7617) and **Digest** (RFC 2617, accepting RFC 2069
//!   `Authentication-Info` responses) with qop=auth, MD5-sess, stale
//!   nonce refresh, and nonce-count tracking
//! - **Negotiate / NTLM** through a pluggable security provider trait
//! - **Both roles**: server auth (401) and proxy auth (407), including
//!   tunnel-establishment handling and the broken-proxy 401-on-CONNECT
//!   case
//! - **Mutual authentication**: Digest `rspauth` verification and
//!   Negotiate continuation-token checks
//!
//! ## Quick Start
//!
//! ```rust
//! use authnet::http::{AuthController, AuthPreferences, Credentials};
//! use http::{HeaderMap, HeaderValue, StatusCode};
//! use url::Url;
//!
//! let origin = Url::parse("http://example.com/").unwrap();
//! let mut auth = AuthController::new(&origin, AuthPreferences::default());
//! auth.set_server_auth(Box::new(|_prompt| Some(Credentials::new("jo", "foo"))));
//!
//! // Driven by the transport for each request:
//! let mut request = auth.create_request("GET", "/");
//! let mut response = HeaderMap::new();
//! response.insert("www-authenticate", HeaderValue::from_static("Basic realm=\"x\""));
//! let disposition = auth
//!     .post_send(&mut request, StatusCode::UNAUTHORIZED, &response)
//!     .unwrap();
//! assert!(disposition.is_retry());
//!
//! let mut headers = HeaderMap::new();
//! auth.pre_send(&request, &mut headers);
//! assert_eq!(headers["authorization"], "Basic am86Zm9v");
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Status and error definitions
//! - [`http`] - Challenge parsing, schemes, sessions, and pipeline hooks
//!
//! ## Security
//!
//! Passwords handed to the core are zeroized as soon as the derived
//! secret (the Basic blob or the Digest H(A1)) has been computed, and all
//! per-session credential material is dropped when a session is cleared.

pub mod base;
pub mod http;

pub use base::{AuthDisposition, AuthError};
