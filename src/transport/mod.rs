//! Upstream HTTP transport.

mod http;

pub use http::{HttpTransport, DEFAULT_BASE_URL};
