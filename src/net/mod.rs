//! Network access module
//!
//! Provides everything the collectors need to talk to remote services:
//! - An HTTP transport abstraction with a reqwest implementation
//! - A rotating proxy pool with health checks
//! - A shared request pacer

mod pacer;
mod proxy;
mod transport;

pub use pacer::RequestPacer;
pub use proxy::{Proxy, ProxyPool, IP_ECHO_URL};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport, BROWSER_USER_AGENT};

#[cfg(test)]
pub(crate) use transport::testing;
