//! HTTP transport used by the fetcher.

mod client;

pub use client::{HttpClient, HttpClientConfig, HttpError};
