//! Backend boundary
//!
//! Everything the core needs from the RiskWrapped API goes through the
//! [`RiskBackend`] trait:
//! - `HttpBackend` talks to the live REST API
//! - `MockBackend` serves in-memory fixtures for tests and demos

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpBackend;
pub use mock::MockBackend;
pub use traits::RiskBackend;
