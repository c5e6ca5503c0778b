//! pooldash-client: Management API client for pooldash
//!
//! This crate provides the boundary to the pool's management API:
//! - The [`PoolApi`] trait every stateful component is written against
//! - The reqwest-backed [`ApiClient`]
//! - Response decoding that turns backend `error` fields into errors
//! - [`MockPoolApi`], an in-memory pool for tests and demos

pub mod api;
pub mod client;
pub mod mock;
pub mod response;

pub use api::PoolApi;
pub use client::ApiClient;
pub use mock::{MockFailure, MockPool, MockPoolApi};
