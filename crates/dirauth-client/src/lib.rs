//! Dirauth Client - Directory reader
//!
//! This crate provides the client view of the directory: an HTTP client
//! that verifies query proofs, and a caching wrapper with a single fetch
//! worker.

pub mod cache;
pub mod client;
pub mod error;
pub mod http;

pub use cache::{CacheConfig, CachingClient, PostMode, DEFAULT_CACHE_CAPACITY};
pub use client::{DocumentEntry, EpochInfo, PkiClient};
pub use error::ClientError;
pub use http::{AppHashSource, HttpPkiClient, RpcAppHashSource};
