//! Time and randomness behind traits so use cases can be tested
//! deterministically.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of `updatedAt` and `createdAt` stamps.
#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Join-code letters and server-stamped event ids.
#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Uniform index in `min..=max`.
    fn gen_range(&self, min: i32, max: i32) -> i32;
    /// Fresh id for an event published without one.
    fn event_id(&self) -> Uuid;
}
