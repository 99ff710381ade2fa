//! Slices of the resource.

use crate::{approx_eq, Valuation, EPSILON};
use std::fmt;

/// An immutable half-open interval `[start, end)` of the resource.
///
/// Slices are value objects: splitting never mutates a slice, it produces new sub-slices.
/// Two slices are equal when both endpoints agree within [`EPSILON`](crate::EPSILON).
#[derive(Clone, Copy, Debug)]
pub struct Slice {
    start: f64,
    end: f64,
}

impl PartialEq for Slice {
    fn eq(&self, other: &Self) -> bool {
        approx_eq(self.start, other.start) && approx_eq(self.end, other.end)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl Slice {
    /// Creates a slice over `[start, end)`.
    pub fn new(start: f64, end: f64) -> Self {
        debug_assert!(start < end, "slice [{start}, {end}) is empty");
        Self { start, end }
    }

    /// Start position of this slice.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// End position of this slice.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Width of this slice.
    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// Value of this slice under `valuation`.
    pub fn value_to<V: Valuation>(&self, valuation: &V) -> f64 {
        valuation.evaluate(self.start, self.end)
    }

    /// Returns whether `other` lies entirely within this slice.
    pub fn contains(&self, other: &Slice) -> bool {
        other.start >= self.start - EPSILON && other.end <= self.end + EPSILON
    }

    /// Splits this slice in two at `position`.
    ///
    /// Returns `[start, position)` and `[position, end)`. A position within
    /// [`EPSILON`](crate::EPSILON) of either endpoint is a no-op: the original slice is
    /// returned alone.
    pub fn split_at(&self, position: f64) -> Vec<Slice> {
        if approx_eq(position, self.start) || approx_eq(position, self.end) {
            return vec![*self];
        }
        vec![
            Slice::new(self.start, position),
            Slice::new(position, self.end),
        ]
    }

    /// Splits this slice into `count` parts of equal value under `valuation`.
    ///
    /// If the valuation exhausts the slice before `count` parts are produced, the final part
    /// absorbs the remainder, so fewer than `count` parts may be returned.
    pub fn split_into_equal_value<V: Valuation>(&self, valuation: &V, count: usize) -> Vec<Slice> {
        let part_value = self.value_to(valuation) / count as f64;
        let mut parts = Vec::with_capacity(count);
        let mut cursor = self.start;
        for _ in 0..count.saturating_sub(1) {
            match valuation.mark_for(cursor, part_value) {
                Some(end) if end > cursor + EPSILON && end < self.end - EPSILON => {
                    parts.push(Slice::new(cursor, end));
                    cursor = end;
                }
                _ => break,
            }
        }
        parts.push(Slice::new(cursor, self.end));
        parts
    }

    /// Splits this slice so that each part is worth `target_value` under `valuation`.
    ///
    /// The part count is `floor(total / target_value)`; the slice is returned whole when less
    /// than two such parts fit.
    pub fn split_to_value<V: Valuation>(&self, valuation: &V, target_value: f64) -> Vec<Slice> {
        let count = (self.value_to(valuation) / target_value).floor() as usize;
        if count < 2 {
            return vec![*self];
        }
        self.split_into_equal_value(valuation, count)
    }
}

/// Splits `slices` so that the result holds `count` parts as equal in value as possible
/// under `valuation`.
///
/// Slices worth no more than the average are kept whole; slices worth more are split into
/// average-value parts. The result may therefore hold slightly fewer or more than `count`
/// parts depending on how value is spread across `slices`.
pub fn split_all_into_equal_value<V: Valuation>(
    valuation: &V,
    count: usize,
    slices: &[Slice],
) -> Vec<Slice> {
    let total: f64 = slices.iter().map(|s| s.value_to(valuation)).sum();
    let average = total / count as f64;
    let mut parts = Vec::with_capacity(count);
    for slice in slices {
        if slice.value_to(valuation) <= average + EPSILON {
            parts.push(*slice);
            continue;
        }
        parts.extend(slice.split_to_value(valuation, average));
    }
    parts
}
