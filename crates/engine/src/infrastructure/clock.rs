//! Wall clock and OS randomness.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::infrastructure::ports::{ClockPort, RandomPort};

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl RandomPort for SystemRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    fn event_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Clock pinned to one instant, for storage tests.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_range_stays_in_bounds() {
        let random = SystemRandom::new();
        for _ in 0..100 {
            let value = random.gen_range(0, 31);
            assert!((0..=31).contains(&value));
        }
        assert_eq!(random.gen_range(5, 5), 5);
    }

    #[test]
    fn event_ids_are_unique() {
        let random = SystemRandom::new();
        assert_ne!(random.event_id(), random.event_id());
    }
}
