//! tasktrack - multi-user task tracker, authentication and session core
//!
//! The `core` module is the REST backend: registration, login, logout and
//! refresh over a dual access/refresh JWT scheme backed by PostgreSQL.
//! The `client` module is the consumer side: it holds the token pair and
//! transparently refreshes an expired access token once per failed call.

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod core;
