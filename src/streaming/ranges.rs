//! Bookkeeping for byte spans that have already been fetched.

use std::fmt;

/// A half-open span of byte offsets, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    /// First offset in the span.
    pub start: u64,
    /// One past the last offset in the span.
    pub end: u64,
}

impl ByteRange {
    /// Creates a span, swapping the bounds if they are given in reverse.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        if start > end {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// Number of bytes in the span.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `other` lies entirely inside `self`.
    #[must_use]
    pub fn covers(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns `true` if the spans share a byte or meet at a boundary.
    fn touches(&self, other: &ByteRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl From<std::ops::Range<u64>> for ByteRange {
    fn from(range: std::ops::Range<u64>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl From<ByteRange> for std::ops::Range<u64> {
    fn from(range: ByteRange) -> Self {
        range.start..range.end
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Coalesced set of cached byte spans.
///
/// Stored ranges are kept sorted by start, pairwise disjoint and pairwise non-adjacent: for
/// consecutive ranges `a` and `b`, `a.end < b.start` always holds.
///
/// # Merge policy
///
/// Spans are half-open, so `[a, b)` and `[b, c)` leave no byte uncovered between them and are
/// merged into `[a, c)`. A span that stops one byte short (`[a, b)` then `[b + 1, c)`) leaves byte
/// `b` uncached and stays separate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `[start, end)` as cached, merging it with every range it overlaps or touches.
    ///
    /// Reversed bounds are swapped. An empty span is ignored.
    pub fn add(&mut self, start: u64, end: u64) {
        let mut merged = ByteRange::new(start, end);
        if merged.is_empty() {
            return;
        }

        // First stored range that could touch `merged`, and one past the last.
        let first = self.ranges.partition_point(|r| r.end < merged.start);
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].touches(&merged) {
            merged.start = merged.start.min(self.ranges[last].start);
            merged.end = merged.end.max(self.ranges[last].end);
            last += 1;
        }

        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Returns `true` if `[start, end)` lies entirely inside a single stored range.
    ///
    /// A span that is only partly covered, or covered by two ranges with a gap between them, is
    /// not contained. Empty spans are trivially contained.
    #[must_use]
    pub fn contains(&self, start: u64, end: u64) -> bool {
        let query = ByteRange::new(start, end);
        if query.is_empty() {
            return true;
        }
        let idx = self.ranges.partition_point(|r| r.end < query.end);
        self.ranges.get(idx).is_some_and(|r| r.covers(&query))
    }

    /// Splits `[start, end)` into consecutive pieces that are each either fully cached or fully
    /// uncached.
    ///
    /// The cut points are every stored-range endpoint falling strictly inside the query. Because
    /// stored ranges are disjoint, every switch between cached and uncached bytes happens at
    /// one of those endpoints.
    #[must_use]
    pub fn partition(&self, start: u64, end: u64) -> Vec<ByteRange> {
        let query = ByteRange::new(start, end);
        if query.is_empty() {
            return Vec::new();
        }

        let mut cuts: Vec<u64> = self
            .ranges
            .iter()
            .flat_map(|r| [r.start, r.end])
            .filter(|&boundary| query.start < boundary && boundary < query.end)
            .collect();
        cuts.sort_unstable();
        cuts.dedup();

        let mut pieces = Vec::with_capacity(cuts.len() + 1);
        let mut from = query.start;
        for cut in cuts {
            pieces.push(ByteRange { start: from, end: cut });
            from = cut;
        }
        pieces.push(ByteRange {
            start: from,
            end: query.end,
        });
        pieces
    }

    /// Returns the stored range holding the byte at `offset`, if any.
    #[must_use]
    pub fn range_at(&self, offset: u64) -> Option<ByteRange> {
        let idx = self.ranges.partition_point(|r| r.end <= offset);
        self.ranges.get(idx).filter(|r| r.start <= offset).copied()
    }

    /// Returns the first stored range starting after `offset`.
    #[must_use]
    pub fn next_after(&self, offset: u64) -> Option<ByteRange> {
        let idx = self.ranges.partition_point(|r| r.start <= offset);
        self.ranges.get(idx).copied()
    }

    /// Iterates the stored ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.iter()
    }

    /// Number of disjoint stored ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of cached bytes.
    #[must_use]
    pub fn covered_bytes(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a ByteRange;
    type IntoIter = std::slice::Iter<'a, ByteRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spans(set: &RangeSet) -> Vec<(u64, u64)> {
        set.iter().map(|r| (r.start, r.end)).collect()
    }

    fn assert_well_formed(set: &RangeSet) {
        for r in set {
            assert!(r.start < r.end, "empty range stored: {r}");
        }
        for pair in set.ranges.windows(2) {
            assert!(
                pair[0].end < pair[1].start,
                "ranges {} and {} overlap or touch",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut set = RangeSet::new();
        set.add(0, 10);
        set.add(10, 20);
        assert_eq!(spans(&set), vec![(0, 20)]);

        set.add(25, 30);
        assert_eq!(spans(&set), vec![(0, 20), (25, 30)]);

        set.add(20, 25);
        assert_eq!(spans(&set), vec![(0, 30)]);
    }

    #[test]
    fn one_byte_gap_stays_separate() {
        let mut set = RangeSet::new();
        set.add(0, 10);
        set.add(11, 20);
        assert_eq!(spans(&set), vec![(0, 10), (11, 20)]);
        assert!(!set.contains(5, 15));
    }

    #[test]
    fn add_swaps_reversed_bounds_and_ignores_empty() {
        let mut set = RangeSet::new();
        set.add(20, 10);
        set.add(40, 40);
        assert_eq!(spans(&set), vec![(10, 20)]);
    }

    #[test]
    fn add_bridges_several_ranges() {
        let mut set = RangeSet::new();
        set.add(0, 5);
        set.add(10, 15);
        set.add(20, 25);
        set.add(40, 50);
        set.add(3, 22);
        assert_eq!(spans(&set), vec![(0, 25), (40, 50)]);
    }

    #[test]
    fn add_inside_existing_range_is_noop() {
        let mut set = RangeSet::new();
        set.add(0, 100);
        set.add(10, 20);
        assert_eq!(spans(&set), vec![(0, 100)]);
    }

    #[test]
    fn contains_requires_single_range() {
        let mut set = RangeSet::new();
        set.add(0, 20);
        set.add(25, 30);

        assert!(set.contains(0, 20));
        assert!(set.contains(5, 6));
        assert!(set.contains(29, 30));
        assert!(!set.contains(19, 21));
        assert!(!set.contains(15, 28));
        assert!(!set.contains(30, 31));
        assert!(set.contains(7, 7));
    }

    #[test]
    fn partition_splits_at_stored_boundaries() {
        let mut set = RangeSet::new();
        set.add(0, 20);
        set.add(25, 30);

        let pieces = set.partition(5, 28);
        assert_eq!(
            pieces,
            vec![
                ByteRange::new(5, 20),
                ByteRange::new(20, 25),
                ByteRange::new(25, 28),
            ]
        );
    }

    #[test]
    fn partition_on_empty_set_is_identity() {
        let set = RangeSet::new();
        assert_eq!(set.partition(3, 9), vec![ByteRange::new(3, 9)]);
        assert!(set.partition(4, 4).is_empty());
    }

    #[test]
    fn partition_outside_stored_ranges() {
        let mut set = RangeSet::new();
        set.add(100, 200);
        assert_eq!(set.partition(0, 50), vec![ByteRange::new(0, 50)]);
        assert_eq!(set.partition(150, 160), vec![ByteRange::new(150, 160)]);
        assert_eq!(
            set.partition(50, 250),
            vec![
                ByteRange::new(50, 100),
                ByteRange::new(100, 200),
                ByteRange::new(200, 250),
            ]
        );
    }

    #[test]
    fn range_lookup_by_offset() {
        let mut set = RangeSet::new();
        set.add(10, 20);
        set.add(40, 50);

        assert_eq!(set.range_at(9), None);
        assert_eq!(set.range_at(10), Some(ByteRange::new(10, 20)));
        assert_eq!(set.range_at(19), Some(ByteRange::new(10, 20)));
        assert_eq!(set.range_at(20), None);
        assert_eq!(set.range_at(45), Some(ByteRange::new(40, 50)));

        assert_eq!(set.next_after(0), Some(ByteRange::new(10, 20)));
        assert_eq!(set.next_after(10), Some(ByteRange::new(40, 50)));
        assert_eq!(set.next_after(25), Some(ByteRange::new(40, 50)));
        assert_eq!(set.next_after(40), None);
        assert_eq!(RangeSet::new().next_after(0), None);
    }

    #[test]
    fn covered_bytes_sums_ranges() {
        let mut set = RangeSet::new();
        set.add(0, 10);
        set.add(20, 25);
        assert_eq!(set.covered_bytes(), 15);
        assert_eq!(set.len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 200,
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_add_keeps_ranges_disjoint(
            adds in prop::collection::vec((0u64..500, 0u64..500), 0..40),
        ) {
            let mut set = RangeSet::new();
            let mut expected = vec![false; 500];
            for &(a, b) in &adds {
                set.add(a, b);
                for byte in a.min(b)..a.max(b) {
                    expected[byte as usize] = true;
                }
            }

            assert_well_formed(&set);
            for (byte, &cached) in expected.iter().enumerate() {
                let byte = byte as u64;
                prop_assert_eq!(set.contains(byte, byte + 1), cached);
            }
        }

        #[test]
        fn prop_partition_covers_query(
            adds in prop::collection::vec((0u64..300, 0u64..300), 0..20),
            start in 0u64..320,
            len in 1u64..120,
        ) {
            let mut set = RangeSet::new();
            for &(a, b) in &adds {
                set.add(a, b);
            }

            let end = start + len;
            let pieces = set.partition(start, end);

            prop_assert_eq!(pieces.first().map(|p| p.start), Some(start));
            prop_assert_eq!(pieces.last().map(|p| p.end), Some(end));
            for pair in pieces.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            for piece in &pieces {
                prop_assert!(!piece.is_empty());
                let cached = set.contains(piece.start, piece.end);
                let any_cached = (piece.start..piece.end).any(|b| set.contains(b, b + 1));
                prop_assert_eq!(cached, any_cached);
            }
        }
    }
}
