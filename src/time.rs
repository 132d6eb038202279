use hifitime::{Duration, Epoch};

/// A closed time interval `[start, end]`, with `start <= end`.
///
/// Used both to describe a maneuver window inside a [`crate::segment::Segment::Solution`]
/// and as scratch space while the maneuver-solving loop accumulates candidate windows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    start: Epoch,
    end: Epoch,
}

impl Interval {
    pub fn new(start: Epoch, end: Epoch) -> Self {
        if end >= start {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn start(&self) -> Epoch {
        self.start
    }

    pub fn end(&self) -> Epoch {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn center(&self) -> Epoch {
        self.start + self.duration() / 2.0
    }

    pub fn contains(&self, instant: Epoch) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Whether two intervals overlap (sharing only an endpoint does not count as overlapping).
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn truncated_to(&self, max_duration: Duration) -> Self {
        if self.duration() <= max_duration {
            *self
        } else {
            Self::new(self.start, self.start + max_duration)
        }
    }

    pub fn truncated_from_end(&self, max_duration: Duration) -> Self {
        if self.duration() <= max_duration {
            *self
        } else {
            Self::new(self.end - max_duration, self.end)
        }
    }

    pub fn centered(&self, max_duration: Duration) -> Self {
        if self.duration() <= max_duration {
            *self
        } else {
            let center = self.center();
            Self::new(center - max_duration / 2.0, center + max_duration / 2.0)
        }
    }
}

/// Returns true iff the provided intervals, assumed sorted by `start`, are pairwise disjoint.
pub fn are_disjoint_and_sorted(intervals: &[Interval]) -> bool {
    intervals
        .windows(2)
        .all(|pair| pair[0].end() <= pair[1].start())
}
