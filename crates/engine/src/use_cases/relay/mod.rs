//! Relay use cases.
//!
//! Routes inbound session events: classify, apply durable side effects,
//! fan out on the session channel.

use std::sync::Arc;

mod route_event;

pub use route_event::{RouteError, RouteEvent, RouteOutcome};

/// Container for relay use cases.
pub struct RelayUseCases {
    pub route: Arc<RouteEvent>,
}

impl RelayUseCases {
    pub fn new(route: Arc<RouteEvent>) -> Self {
        Self { route }
    }
}
