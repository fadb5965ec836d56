//! Session use cases.
//!
//! Session lifecycle (start, end, lookup, player registration) and the
//! bootstrap snapshot served to late joiners.

use std::sync::Arc;

mod bootstrap;
mod lifecycle;

pub use bootstrap::{BootstrapError, LoadBootstrap};
pub use lifecycle::{
    EndSession, GetSession, RegisterPlayer, SessionLifecycleError, StartSession,
    JOIN_CODE_ALPHABET, JOIN_CODE_LEN,
};

/// Container for session use cases.
pub struct SessionUseCases {
    pub start: Arc<StartSession>,
    pub end: Arc<EndSession>,
    pub get: Arc<GetSession>,
    pub register_player: Arc<RegisterPlayer>,
    pub bootstrap: Arc<LoadBootstrap>,
}

impl SessionUseCases {
    pub fn new(
        start: Arc<StartSession>,
        end: Arc<EndSession>,
        get: Arc<GetSession>,
        register_player: Arc<RegisterPlayer>,
        bootstrap: Arc<LoadBootstrap>,
    ) -> Self {
        Self {
            start,
            end,
            get,
            register_player,
            bootstrap,
        }
    }
}
