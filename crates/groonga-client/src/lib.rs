//! Groonga client abstraction.
//!
//! This crate defines the `GroongaClient` trait the applier replays delta
//! entries through. `HttpClient` talks to a Groonga HTTP server; the
//! in-memory engine in [`testing`] implements the same trait for tests.
//!
//! Responses in both the header-array shape (`[[rc, start, elapsed, ...], body]`)
//! and the command version 3 shape (`{"header": {...}, "body": ...}`) are
//! understood.

mod http;
mod response;
mod traits;

#[doc(hidden)]
pub mod testing;

pub use http::{HttpClient, DEFAULT_URL};
pub use response::Response;
pub use traits::GroongaClient;
