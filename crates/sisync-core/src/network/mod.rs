//! Network layer: the remote client contract and its HTTP implementation.
//!
//! This module provides:
//! - The [`RemoteClient`] trait every engine component talks through
//! - [`Environment`], a role-tagged handle to one authenticated endpoint
//! - A reqwest client with rate-limit awareness and retry with backoff

mod client;
mod remote;
mod retry;

pub use client::{extract_domain, HttpRemoteClient, RateLimitState};
pub use remote::{Environment, EnvironmentRole, RemoteClient, RemoteResponse};
pub use retry::{retry_async, retry_async_when, RetryConfig};
