//! Divide a continuous resource among four participants without envy.
//!
//! The resource (the "cake") is the interval `[0, extent)`. Each participant holds a private
//! additive [`Valuation`] over it. [`Protocol::divide`] computes an allocation of disjoint
//! (possibly non-contiguous) intervals such that no participant strictly prefers another
//! participant's share to their own, up to the approximation factor of the underlying
//! four-agent protocol.
//!
//! # Example
//!
//! ```
//! use fairdiv_cake::{PiecewiseConstant, Protocol};
//!
//! let participants = vec![
//!     PiecewiseConstant::new([3.0, 6.0, 3.0]),
//!     PiecewiseConstant::new([0.0, 2.0, 4.0, 6.0]),
//!     PiecewiseConstant::new([6.0, 4.0, 2.0, 0.0]),
//!     PiecewiseConstant::new([3.0, 3.0, 3.0, 3.0]),
//! ];
//! let division = Protocol::new(participants).unwrap().divide().unwrap();
//! for participant in fairdiv_cake::Participant::ALL {
//!     assert!(!division.pieces(participant).is_empty());
//! }
//! ```

use std::fmt;

mod valuation;
pub use valuation::{PiecewiseConstant, PiecewiseLinear, Valuation};
mod slice;
pub use slice::Slice;
mod marking;
pub use marking::{Mark, Marking};
mod allocation;
pub use allocation::Allocation;
mod preference;
pub use preference::{Preference, Preferences};
pub mod satisfaction;
mod protocol;
pub use protocol::{Division, Protocol};

/// Canonical tolerance for endpoint and value comparisons.
///
/// Split positions within `EPSILON` of a slice boundary are treated as the boundary itself,
/// and two slices are considered equal when both endpoints agree within `EPSILON`.
pub const EPSILON: f64 = 1e-5;

/// Returns whether two positions (or values) are equal within [`EPSILON`].
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// One of the four participants in a division, identified by index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Participant(u8);

impl Participant {
    /// The number of participants the protocol is defined for.
    pub const COUNT: usize = 4;

    /// All participants, in the fixed iteration order used throughout the protocol.
    pub const ALL: [Participant; Self::COUNT] = [
        Participant(0),
        Participant(1),
        Participant(2),
        Participant(3),
    ];

    /// Position of this participant in `0..4`.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of participants backed by a 4-bit mask.
///
/// Used for exclusion sets during conflict detection, avoiding ad-hoc list filtering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParticipantSet(u8);

impl ParticipantSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Adds a participant to the set.
    pub fn insert(&mut self, participant: Participant) {
        self.0 |= 1 << participant.index();
    }

    /// Returns a copy of the set with `participant` added.
    pub fn with(mut self, participant: Participant) -> Self {
        self.insert(participant);
        self
    }

    /// Returns whether the set contains `participant`.
    pub fn contains(&self, participant: Participant) -> bool {
        self.0 & (1 << participant.index()) != 0
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Participant> for ParticipantSet {
    fn from_iter<T: IntoIterator<Item = Participant>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for participant in iter {
            set.insert(participant);
        }
        set
    }
}

/// Errors that may be encountered when dividing a resource.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The protocol is defined for exactly four participants.
    #[error("expected exactly 4 participants, got {0}")]
    ParticipantCount(usize),
    /// Every participant must assign strictly positive value to the whole resource.
    #[error("participant {0} assigns no value to the resource")]
    WorthlessResource(Participant),
    /// A mark query could not be satisfied within the slice it was made on.
    #[error("participant {participant} cannot mark [{start}, {end}) for value {value}")]
    UnreachableMark {
        /// Participant that issued the query.
        participant: Participant,
        /// Start of the slice being marked.
        start: f64,
        /// End of the slice being marked.
        end: f64,
        /// Value the mark was supposed to capture.
        value: f64,
    },
    /// A protocol invariant was breached. Indicates a logic defect, not bad input.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_set() {
        let mut set = ParticipantSet::EMPTY;
        assert!(set.is_empty());
        set.insert(Participant::ALL[1]);
        set.insert(Participant::ALL[3]);
        assert!(set.contains(Participant::ALL[1]));
        assert!(set.contains(Participant::ALL[3]));
        assert!(!set.contains(Participant::ALL[0]));
        assert!(!set.contains(Participant::ALL[2]));

        let with = set.with(Participant::ALL[0]);
        assert!(with.contains(Participant::ALL[0]));
        assert!(!set.contains(Participant::ALL[0]));
    }

    #[test]
    fn test_participant_set_from_iter() {
        let set: ParticipantSet = Participant::ALL.into_iter().collect();
        for participant in Participant::ALL {
            assert!(set.contains(participant));
        }
    }

    #[test]
    fn test_approx_eq() {
        assert!(approx_eq(1.0, 1.0));
        assert!(approx_eq(1.0, 1.0 + EPSILON / 2.0));
        assert!(!approx_eq(1.0, 1.0 + EPSILON * 2.0));
    }
}
