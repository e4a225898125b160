//! Lifecycle phase derivation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Upcoming,
    Live,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Upcoming => "upcoming",
            Phase::Live => "live",
            Phase::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Derive the phase of a session.
///
/// A persisted completion overrides everything. Otherwise the session is
/// upcoming until its scheduled start and live from then on; there is no
/// upper time bound. Callers must re-evaluate on every poll rather than cache
/// the result.
pub fn derive_phase(
    scheduled_start: DateTime<Utc>,
    now: DateTime<Utc>,
    persisted_completed: bool,
) -> Phase {
    if persisted_completed {
        Phase::Completed
    } else if now < scheduled_start {
        Phase::Upcoming
    } else {
        Phase::Live
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    #[test]
    fn before_start_is_upcoming() {
        let start = at(1_000);
        assert_eq!(derive_phase(start, at(999), false), Phase::Upcoming);
    }

    #[test]
    fn at_start_is_live() {
        let start = at(1_000);
        assert_eq!(derive_phase(start, start, false), Phase::Live);
    }

    #[test]
    fn live_has_no_upper_bound() {
        let start = at(1_000);
        let much_later = start + Duration::days(365);
        assert_eq!(derive_phase(start, much_later, false), Phase::Live);
    }

    #[test]
    fn future_completed_session_is_completed() {
        let start = at(10_000);
        assert_eq!(derive_phase(start, at(0), true), Phase::Completed);
    }

    proptest! {
        #[test]
        fn completed_overrides_any_time(start in 0i64..4_000_000_000, now in 0i64..4_000_000_000) {
            prop_assert_eq!(derive_phase(at(start), at(now), true), Phase::Completed);
        }

        #[test]
        fn uncompleted_is_never_completed(start in 0i64..4_000_000_000, now in 0i64..4_000_000_000) {
            let phase = derive_phase(at(start), at(now), false);
            prop_assert_ne!(phase, Phase::Completed);
            prop_assert_eq!(phase == Phase::Upcoming, now < start);
        }
    }
}
