use std::borrow::Cow;
use std::ops::Range;

use crate::text::{PointTrackingMode, Revision};

/// How a span reacts to an insertion exactly at one of its edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanTrackingMode {
    /// Insertions at either edge stay outside the span
    EdgeExclusive,
    /// Insertions at either edge grow the span
    EdgeInclusive,
}

impl SpanTrackingMode {
    fn edge_modes(self) -> (PointTrackingMode, PointTrackingMode) {
        match self {
            SpanTrackingMode::EdgeExclusive => {
                (PointTrackingMode::Positive, PointTrackingMode::Negative)
            }
            SpanTrackingMode::EdgeInclusive => {
                (PointTrackingMode::Negative, PointTrackingMode::Positive)
            }
        }
    }
}

/// A byte range `[start, end)` bound to exactly one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSpan {
    revision: Revision,
    range: Range<usize>,
}

/// Outcome of moving a span onto a later revision.
///
/// Translation never rejects a span; callers compare lengths and decide validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub span: SnapshotSpan,
    pub original_len: usize,
}

impl Translation {
    /// True when no edit landed strictly inside the original span
    pub fn preserves_length(&self) -> bool {
        self.span.len() == self.original_len
    }
}

impl SnapshotSpan {
    /// Returns `None` if the range is reversed or runs past the end of the revision
    pub fn new(revision: Revision, range: Range<usize>) -> Option<Self> {
        if range.start > range.end || range.end > revision.len() {
            return None;
        }
        Some(Self { revision, range })
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn end(&self) -> usize {
        self.range.end
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The covered text
    pub fn text(&self) -> Cow<'_, str> {
        self.revision.text().slice_to_cow(self.range.clone())
    }

    /// Zero-based line of the span start
    pub fn line(&self) -> usize {
        self.revision.line_of_offset(self.range.start)
    }

    /// Zero-based column of the span start within its line
    pub fn column(&self) -> usize {
        let line_start = self.revision.offset_of_line(self.line());
        self.range.start.saturating_sub(line_start)
    }

    /// Overlapping or touching ranges intersect, empty ranges included
    pub fn intersects(&self, range: &Range<usize>) -> bool {
        self.range.start.max(range.start) <= self.range.end.min(range.end)
    }

    /// Move this span onto a later revision of the same buffer
    pub fn translate_to(&self, target: &Revision, mode: SpanTrackingMode) -> Option<Translation> {
        let (start_mode, end_mode) = mode.edge_modes();
        let start = self
            .revision
            .translate_offset(self.range.start, target, start_mode)?;
        // Edge-exclusive empty spans at an insertion point would invert
        let end = self
            .revision
            .translate_offset(self.range.end, target, end_mode)?
            .max(start);

        Some(Translation {
            span: SnapshotSpan {
                revision: target.clone(),
                range: start..end,
            },
            original_len: self.len(),
        })
    }
}

/// Sorted set of non-overlapping ranges on one revision.
///
/// Overlapping and adjacent ranges are merged on insertion. Empty ranges are kept
/// (a pure deletion leaves an empty range marking where text disappeared) unless
/// another range covers or touches them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSpans {
    revision: Revision,
    ranges: Vec<Range<usize>>,
}

impl NormalizedSpans {
    pub fn empty(revision: Revision) -> Self {
        Self {
            revision,
            ranges: Vec::new(),
        }
    }

    /// A single range covering the whole revision
    pub fn full(revision: Revision) -> Self {
        let len = revision.len();
        Self {
            revision,
            ranges: vec![0..len],
        }
    }

    pub fn from_ranges(revision: Revision, ranges: impl IntoIterator<Item = Range<usize>>) -> Self {
        let mut spans = Self::empty(revision);
        for range in ranges {
            spans.union(range);
        }
        spans
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Range<usize>> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Smallest single range covering every member
    pub fn bounds(&self) -> Option<Range<usize>> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some(first.start..last.end)
    }

    /// Merge `range` into the set, clamped to the revision length
    pub fn union(&mut self, range: Range<usize>) {
        let len = self.revision.len();
        let mut merged = range.start.min(len)..range.end.min(len).max(range.start.min(len));

        // First member that could touch `merged`, then every member that does
        let first = self.ranges.partition_point(|r| r.end < merged.start);
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].start <= merged.end {
            merged.start = merged.start.min(self.ranges[last].start);
            merged.end = merged.end.max(self.ranges[last].end);
            last += 1;
        }

        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Union of two sets on the same revision
    pub fn union_with(&mut self, other: &NormalizedSpans) {
        debug_assert_eq!(self.revision, other.revision);
        for range in &other.ranges {
            self.union(range.clone());
        }
    }

    pub fn intersects_with(&self, range: &Range<usize>) -> bool {
        self.ranges
            .iter()
            .any(|r| r.start.max(range.start) <= r.end.min(range.end))
    }

    /// Translate every member onto `target` and re-normalize
    pub fn translate_to(&self, target: &Revision, mode: SpanTrackingMode) -> Option<NormalizedSpans> {
        let mut translated = NormalizedSpans::empty(target.clone());
        for range in &self.ranges {
            let span = SnapshotSpan {
                revision: self.revision.clone(),
                range: range.clone(),
            };
            translated.union(span.translate_to(target, mode)?.span.range());
        }
        Some(translated)
    }
}
