//! Duration windows for deadlines and heartbeat intervals.

use core::fmt;
use core::time::Duration;

/// Range of accepted durations, inclusive on both ends.
///
/// Used for a deadline's run time and for the gap between two heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeRange {
    /// Shortest accepted duration.
    pub min: Duration,
    /// Longest accepted duration.
    pub max: Duration,
}

/// Error returned when a range is constructed with `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRange {
    pub min: Duration,
    pub max: Duration,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid time range: min {:?} is greater than max {:?}",
            self.min, self.max
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidRange {}

/// Where an observed duration falls relative to a [`TimeRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RangeCheck {
    /// Shorter than `min`.
    TooEarly,
    /// Within `[min, max]`.
    InRange,
    /// Longer than `max`.
    TooLate,
}

impl TimeRange {
    /// Create a new range.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`. Use [`TimeRange::try_new`] for untrusted input.
    pub fn new(min: Duration, max: Duration) -> Self {
        match Self::try_new(min, max) {
            Ok(range) => range,
            Err(err) => panic!("{err}"),
        }
    }

    /// Create a new range, rejecting `min > max`.
    pub fn try_new(min: Duration, max: Duration) -> Result<Self, InvalidRange> {
        if min > max {
            return Err(InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Create a range from millisecond bounds.
    pub fn from_millis(min: u64, max: u64) -> Result<Self, InvalidRange> {
        Self::try_new(Duration::from_millis(min), Duration::from_millis(max))
    }

    /// Classify an observed duration.
    pub fn check(&self, elapsed: Duration) -> RangeCheck {
        if elapsed < self.min {
            RangeCheck::TooEarly
        } else if elapsed > self.max {
            RangeCheck::TooLate
        } else {
            RangeCheck::InRange
        }
    }

    /// Check if `elapsed` lies within the range.
    pub fn contains(&self, elapsed: Duration) -> bool {
        self.check(elapsed) == RangeCheck::InRange
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}ms, {}ms]", self.min.as_millis(), self.max.as_millis())
    }
}
