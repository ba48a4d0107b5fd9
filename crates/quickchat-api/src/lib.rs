//! # quickchat-api
//!
//! HTTP client for the QuickChat server API.
//!
//! The server speaks JSON over a handful of `.php` endpoints behind one
//! response envelope (`{ success, data?, error?, csrf_token? }`), with a
//! cookie-based session and a CSRF token on mutating requests.  This crate
//! wraps that surface in typed async operations and one error taxonomy;
//! it knows nothing about caching, merging, or polling cadence.

pub mod client;
pub mod types;

mod error;

pub use client::ApiClient;
pub use error::ApiError;
pub use types::{ApiEnvelope, SessionState};
