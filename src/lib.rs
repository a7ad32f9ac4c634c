//! swarmdns: concurrent bulk DNS resolution and subdomain enumeration engine
//!
//! Exposes the library surface the binary in `main.rs` drives: CLI parsing
//! and validated configuration, the resolver client, the worker pool, and
//! the supporting storage/output/observability modules.

pub mod config;
pub mod dns;
pub mod errors;
pub mod host_store;
pub mod input;
pub mod model;
pub mod output;
pub mod rate_limit;
pub mod resolver_pool;
pub mod resume;
pub mod retry;
pub mod runner;
pub mod sanitize;
pub mod stats;
pub mod wildcard;
