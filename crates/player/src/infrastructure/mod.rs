//! Adapters for the outbound ports.

pub mod http_client;
#[cfg(any(test, feature = "testing"))]
pub mod loopback;
pub mod websocket;

pub use http_client::HttpBootstrapSource;
pub use websocket::WsTransport;
