use std::{cmp::Ordering, fmt};

use crate::{AlignmentRecord, UNMAPPED_REFERENCE, core::AlignmentSpan};

/// A closed, 1-based query interval on one reference, or the unplaced pseudo-interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryInterval {
    reference_index: i32,
    start: i64,
    end: i64,
}
impl QueryInterval {
    /// Creates the interval `[start, end]` on a reference.
    ///
    /// A start below 1 is clamped to 1 and an `end <= 0` extends to the end of the reference.
    #[must_use]
    pub fn new(reference_index: usize, start: i64, end: i64) -> Self {
        Self {
            reference_index: i32::try_from(reference_index).unwrap_or(i32::MAX),
            start: start.max(1),
            end: if end <= 0 { i64::MAX } else { end },
        }
    }

    /// Creates the interval of `span` bases starting at `start`
    #[must_use]
    pub fn with_span(reference_index: usize, start: i64, span: i64) -> Self {
        let start = start.max(1);
        Self::new(reference_index, start, start + span.max(1) - 1)
    }

    /// Selects unplaced records
    #[must_use]
    pub const fn unmapped() -> Self {
        Self {
            reference_index: UNMAPPED_REFERENCE,
            start: 0,
            end: 0,
        }
    }

    #[must_use]
    pub fn reference_index(&self) -> i32 {
        self.reference_index
    }

    #[must_use]
    pub fn start(&self) -> i64 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> i64 {
        self.end
    }

    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        self.reference_index == UNMAPPED_REFERENCE
    }

    /// Whether an indexed slice or container span may hold matching records
    #[must_use]
    pub fn overlaps_span(&self, span: &AlignmentSpan) -> bool {
        if self.is_unmapped() {
            return span.is_unmapped();
        }
        span.reference_index == self.reference_index
            && span.alignment_start <= self.end
            && span.alignment_end() >= self.start
    }

    fn on_reference(&self, record: &AlignmentRecord) -> bool {
        record.is_placed()
            && record
                .reference_index()
                .is_some_and(|idx| idx as i64 == i64::from(self.reference_index))
    }

    /// Whether the record shares at least one base with the interval
    #[must_use]
    pub fn overlaps_record(&self, record: &AlignmentRecord) -> bool {
        if self.is_unmapped() {
            return !record.is_placed();
        }
        self.on_reference(record)
            && record.alignment_start() <= self.end
            && record.alignment_end() >= self.start
    }

    /// Whether the record lies entirely within the interval
    #[must_use]
    pub fn contains_record(&self, record: &AlignmentRecord) -> bool {
        if self.is_unmapped() {
            return !record.is_placed();
        }
        self.on_reference(record)
            && record.alignment_start() >= self.start
            && record.alignment_end() <= self.end
    }

    /// Orders intervals by reference then start, with the unplaced interval last
    fn order_key(&self) -> (bool, i32, i64) {
        (self.is_unmapped(), self.reference_index, self.start)
    }
}
impl PartialOrd for QueryInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueryInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key()
            .cmp(&other.order_key())
            .then(self.end.cmp(&other.end))
    }
}
impl fmt::Display for QueryInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unmapped() {
            write!(f, "*")
        } else if self.end == i64::MAX {
            write!(f, "{}:{}-", self.reference_index, self.start)
        } else {
            write!(f, "{}:{}-{}", self.reference_index, self.start, self.end)
        }
    }
}

/// Sorts intervals and merges those that overlap or abut on the same reference
#[must_use]
pub fn optimize_intervals(intervals: &[QueryInterval]) -> Vec<QueryInterval> {
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable();

    let mut merged: Vec<QueryInterval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if last.is_unmapped() && interval.is_unmapped() => {}
            Some(last)
                if last.reference_index == interval.reference_index
                    && !interval.is_unmapped()
                    && interval.start <= last.end.saturating_add(1) =>
            {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}
