//! Decisive timestamps for change-unit ordering.
//!
//! Every change-unit receives a decisive timestamp exactly once, at the
//! moment it is accepted into an entity mutation. The timestamp is the last
//! tie-breaker of the mutation ordering and is otherwise never interpreted.
//!
//! The stamp is a hybrid of wall-clock milliseconds and a logical counter so
//! that a burst of change-units accepted within the same millisecond still
//! receives strictly increasing values.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// A hybrid wall-clock/logical timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisiveTimestamp {
    /// Physical component (milliseconds since Unix epoch).
    wall_time: u64,
    /// Logical counter for stamps issued within the same millisecond.
    logical: u32,
}

impl DecisiveTimestamp {
    /// The smallest possible timestamp.
    pub const ZERO: Self = Self::new(0, 0);

    /// Creates a timestamp at the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall_time: wall_clock_millis(),
            logical: 0,
        }
    }

    /// Creates a timestamp from components (replay and tests).
    #[must_use]
    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// Returns the wall time component.
    #[must_use]
    pub const fn wall_time(&self) -> u64 {
        self.wall_time
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// Returns the next timestamp, strictly greater than `self`.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = wall_clock_millis();
        if now > self.wall_time {
            Self {
                wall_time: now,
                logical: 0,
            }
        } else if self.logical == u32::MAX {
            Self {
                wall_time: self.wall_time + 1,
                logical: 0,
            }
        } else {
            Self {
                wall_time: self.wall_time,
                logical: self.logical + 1,
            }
        }
    }
}

impl Default for DecisiveTimestamp {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialOrd for DecisiveTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DecisiveTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.wall_time.cmp(&other.wall_time) {
            Ordering::Equal => self.logical.cmp(&other.logical),
            other => other,
        }
    }
}

impl fmt::Display for DecisiveTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.wall_time, self.logical)
    }
}

impl FromStr for DecisiveTimestamp {
    type Err = crate::Error;

    /// Parses the `wall_time.logical` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::InvalidTimestamp(s.to_string());
        let (wall, logical) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            wall_time: wall.parse().map_err(|_| invalid())?,
            logical: logical.parse().map_err(|_| invalid())?,
        })
    }
}

/// Issues strictly increasing decisive timestamps.
///
/// One clock is used per accepting batch; stamps from different clocks are
/// only roughly ordered by their wall-time component.
#[derive(Debug, Clone)]
pub struct DecisiveClock {
    last: DecisiveTimestamp,
}

impl DecisiveClock {
    /// Creates a clock seeded with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: DecisiveTimestamp::now(),
        }
    }

    /// Creates a clock that continues after `last` (tests and WAL replay).
    #[must_use]
    pub const fn starting_after(last: DecisiveTimestamp) -> Self {
        Self { last }
    }

    /// Issues the next timestamp.
    pub fn next_timestamp(&mut self) -> DecisiveTimestamp {
        self.last = self.last.tick();
        self.last
    }
}

impl Default for DecisiveClock {
    fn default() -> Self {
        Self::new()
    }
}
