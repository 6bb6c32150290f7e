//! mailsweep network layer
//!
//! Provides the HTTP-facing pieces of a scan:
//! - Proxy selection and validation, shared client construction
//! - Search engine and directory discovery providers
//! - Remote domain lists
//! - Existence filtering through a pluggable resolver
//! - Page fetching with size cap and encoding fallback

pub mod crawler;
pub mod proxy;
pub mod resolver;
pub mod fetcher;
pub mod sources;

pub use crawler::*;
pub use proxy::*;
pub use resolver::*;
pub use fetcher::*;
pub use sources::*;
