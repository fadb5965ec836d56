//! Application services
//!
//! - [`SessionAdapter`]: one client's view of a live session channel
//! - [`BootstrapLoader`]: snapshot-then-subscribe join sequence

pub mod bootstrap_loader;
pub mod session_adapter;

pub use bootstrap_loader::{BootstrapLoader, BootstrapOutcome, DEFAULT_BOOTSTRAP_TIMEOUT};
pub use session_adapter::{Callback, SessionAdapter};
