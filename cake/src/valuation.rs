//! Valuation functions over the resource.
//!
//! A [`Valuation`] answers two queries: the value of an interval (`evaluate`) and the inverse
//! query (`mark_for`) that finds the end position capturing a target value from a given start.
//! Both are assumed additive with non-negative density; everything left of `0` and right of
//! [`Valuation::extent`] is worthless.

use crate::EPSILON;

/// A participant's private value function over `[0, extent)`.
pub trait Valuation {
    /// Length of the resource this valuation is defined over.
    fn extent(&self) -> f64;

    /// Returns the value of the interval `[start, end)`. Additive over disjoint intervals and
    /// clamped to `[0, extent)`; `end <= start` yields zero.
    fn evaluate(&self, start: f64, end: f64) -> f64;

    /// Returns `end` such that `evaluate(start, end) == target_value`, or `None` if no such
    /// position exists within the resource.
    fn mark_for(&self, start: f64, target_value: f64) -> Option<f64>;

    /// Value of the whole resource.
    fn total(&self) -> f64 {
        self.evaluate(0.0, self.extent())
    }
}

/// A valuation with constant density on each unit-width segment.
///
/// `PiecewiseConstant::new([11.0, 22.0, 33.0])` values `[0,1)` at 11, `[1,2)` at 22 and
/// `[2,3)` at 33.
#[derive(Clone, Debug)]
pub struct PiecewiseConstant {
    densities: Vec<f64>,
}

impl PiecewiseConstant {
    /// Creates a valuation from per-segment values.
    pub fn new(densities: impl Into<Vec<f64>>) -> Self {
        let densities = densities.into();
        assert!(!densities.is_empty(), "at least one segment required");
        assert!(
            densities.iter().all(|d| *d >= 0.0),
            "densities must be non-negative"
        );
        Self { densities }
    }
}

impl Valuation for PiecewiseConstant {
    fn extent(&self) -> f64 {
        self.densities.len() as f64
    }

    fn evaluate(&self, start: f64, end: f64) -> f64 {
        let extent = self.extent();
        let start = start.clamp(0.0, extent);
        let end = end.clamp(0.0, extent);
        if end <= start {
            return 0.0;
        }

        let first = start.floor() as usize;
        let last = end.ceil() as usize;
        let mut value = self.densities[first] * ((first + 1) as f64 - start);
        value += self.densities[first + 1..last].iter().sum::<f64>();
        value -= self.densities[last - 1] * (last as f64 - end);
        value
    }

    fn mark_for(&self, start: f64, target_value: f64) -> Option<f64> {
        if target_value < 0.0 {
            return None;
        }
        let extent = self.extent();
        let start = start.clamp(0.0, extent);
        let first = start.floor() as usize;
        let mut remaining = target_value;

        if first < self.densities.len() {
            let density = self.densities[first];
            let capacity = density * ((first + 1) as f64 - start);
            if remaining <= capacity {
                if density > 0.0 {
                    return Some(start + remaining / density);
                }
                return Some(start);
            }
            remaining -= capacity;
        }

        for (segment, &density) in self.densities.iter().enumerate().skip(first + 1) {
            if remaining <= density {
                if density > 0.0 {
                    return Some(segment as f64 + remaining / density);
                }
                return Some(segment as f64);
            }
            remaining -= density;
        }

        // Absorb accumulated rounding error at the right edge of the resource.
        if remaining <= EPSILON {
            return Some(extent);
        }
        None
    }
}

/// A valuation with linear density on each unit-width segment.
///
/// Each segment is given as `(value, slope)`: the segment's total value and the slope of its
/// density. On segment `i`, the density at offset `t` in `[0,1)` is `value - slope / 2 +
/// slope * t`, which integrates to `value` over the segment. Densities must stay non-negative.
#[derive(Clone, Debug)]
pub struct PiecewiseLinear {
    segments: Vec<(f64, f64)>,
}

impl PiecewiseLinear {
    /// Creates a valuation from per-segment `(value, slope)` pairs.
    pub fn new(segments: impl Into<Vec<(f64, f64)>>) -> Self {
        let segments = segments.into();
        assert!(!segments.is_empty(), "at least one segment required");
        for (value, slope) in &segments {
            let intercept = value - slope / 2.0;
            assert!(
                intercept >= 0.0 && intercept + slope >= 0.0,
                "density must be non-negative across the segment"
            );
        }
        Self { segments }
    }

    /// Value of `[a, b)` within segment `segment`, with `a` and `b` as absolute positions.
    fn segment_value(&self, segment: usize, a: f64, b: f64) -> f64 {
        let (value, slope) = self.segments[segment];
        let intercept = value - slope / 2.0;
        let a = a - segment as f64;
        let b = b - segment as f64;
        intercept * (b - a) + slope * (b * b - a * a) / 2.0
    }
}

impl Valuation for PiecewiseLinear {
    fn extent(&self) -> f64 {
        self.segments.len() as f64
    }

    fn evaluate(&self, start: f64, end: f64) -> f64 {
        let extent = self.extent();
        let start = start.clamp(0.0, extent);
        let end = end.clamp(0.0, extent);
        if end <= start {
            return 0.0;
        }

        let first = start.floor() as usize;
        let last = (end.ceil() as usize).max(first + 1);
        let mut value = 0.0;
        for segment in first..last {
            let a = start.max(segment as f64);
            let b = end.min((segment + 1) as f64);
            if b > a {
                value += self.segment_value(segment, a, b);
            }
        }
        value
    }

    fn mark_for(&self, start: f64, target_value: f64) -> Option<f64> {
        if target_value < 0.0 {
            return None;
        }
        let extent = self.extent();
        let start = start.clamp(0.0, extent);
        let first = start.floor() as usize;
        let mut remaining = target_value;

        for segment in first..self.segments.len() {
            let a = start.max(segment as f64);
            let b = (segment + 1) as f64;
            let capacity = self.segment_value(segment, a, b);
            if remaining <= capacity {
                let (value, slope) = self.segments[segment];
                let intercept = value - slope / 2.0;
                let offset = a - segment as f64;
                if slope.abs() < 1e-12 {
                    if intercept <= 0.0 {
                        return Some(a);
                    }
                    return Some(a + remaining / intercept);
                }
                // Solve (slope / 2) x^2 + intercept x = remaining + the same expression at the
                // current offset; the positive branch is the unique root right of the offset.
                let discriminant = intercept * intercept
                    + 2.0 * slope * (slope / 2.0 * offset * offset + intercept * offset + remaining);
                let root = (-intercept + discriminant.max(0.0).sqrt()) / slope;
                return Some(segment as f64 + root.clamp(offset, 1.0));
            }
            remaining -= capacity;
        }

        if remaining <= EPSILON {
            return Some(extent);
        }
        None
    }
}
