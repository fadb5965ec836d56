//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must implement,
//! allowing application services to interact with the engine without
//! depending on concrete implementations.

pub mod bootstrap_source;
pub mod channel_transport;

pub use bootstrap_source::{BootstrapFetchError, BootstrapSource};
pub use channel_transport::{
    ChannelDelivery, ChannelTransport, ConnectionState, EventStream, TransportError,
};

#[cfg(test)]
pub use bootstrap_source::MockBootstrapSource;
#[cfg(test)]
pub use channel_transport::MockChannelTransport;
