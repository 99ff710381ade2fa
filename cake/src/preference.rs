//! Participant preferences over a set of slices.

use crate::{Error, Participant, ParticipantSet, Slice, Valuation};

/// A participant's three favorite slices, most preferred first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preference {
    ranked: [Slice; 3],
}

impl Preference {
    /// Most preferred slice.
    pub fn first(&self) -> Slice {
        self.ranked[0]
    }

    /// Second most preferred slice.
    pub fn second(&self) -> Slice {
        self.ranked[1]
    }

    /// Third most preferred slice.
    pub fn third(&self) -> Slice {
        self.ranked[2]
    }
}

/// The preferences of a set of participants over one set of slices.
///
/// Computed once per core invocation, after the cutter quarters the residue.
#[derive(Clone, Debug)]
pub struct Preferences {
    entries: Vec<(Participant, Preference)>,
}

impl Preferences {
    /// Computes the top-three preference of each of `participants` over `slices`.
    ///
    /// Ties rank the earlier slice (in `slices` order) higher. Fewer than three slices is an
    /// invariant violation.
    pub fn compute<V: Valuation>(
        participants: &[Participant],
        valuations: &[V],
        slices: &[Slice],
    ) -> Result<Self, Error> {
        let mut entries = Vec::with_capacity(participants.len());
        for participant in participants {
            let valuation = &valuations[participant.index()];
            let first = favorite_slice_excluding(valuation, slices, &[])?;
            let second = favorite_slice_excluding(valuation, slices, &[first])?;
            let third = favorite_slice_excluding(valuation, slices, &[first, second])?;
            entries.push((
                *participant,
                Preference {
                    ranked: [first, second, third],
                },
            ));
        }
        Ok(Self { entries })
    }

    /// The preference of `participant`. An invariant violation if it was not computed.
    pub fn of(&self, participant: Participant) -> Result<Preference, Error> {
        self.entries
            .iter()
            .find(|(p, _)| *p == participant)
            .map(|(_, preference)| *preference)
            .ok_or(Error::Invariant("no preference computed for participant"))
    }

    /// Participants (outside `exclude`) ranking `slice` first, and those ranking it second.
    pub fn claimants(
        &self,
        slice: &Slice,
        exclude: ParticipantSet,
    ) -> (Vec<Participant>, Vec<Participant>) {
        let mut first = Vec::new();
        let mut second = Vec::new();
        for (participant, preference) in &self.entries {
            if exclude.contains(*participant) {
                continue;
            }
            if preference.first() == *slice {
                first.push(*participant);
            }
            if preference.second() == *slice {
                second.push(*participant);
            }
        }
        (first, second)
    }
}

/// The slice in `slices` worth the most to `valuation`, ties favoring the earlier slice.
///
/// An invariant violation when `slices` is empty.
pub fn favorite_slice<V: Valuation>(valuation: &V, slices: &[Slice]) -> Result<Slice, Error> {
    favorite_slice_excluding(valuation, slices, &[])
}

fn favorite_slice_excluding<V: Valuation>(
    valuation: &V,
    slices: &[Slice],
    exclude: &[Slice],
) -> Result<Slice, Error> {
    let mut best: Option<(Slice, f64)> = None;
    for slice in slices {
        if exclude.contains(slice) {
            continue;
        }
        let value = slice.value_to(valuation);
        if best.map_or(true, |(_, most)| value > most) {
            best = Some((*slice, value));
        }
    }
    best.map(|(slice, _)| slice)
        .ok_or(Error::Invariant("no slice to prefer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PiecewiseConstant;

    const P0: Participant = Participant::ALL[0];
    const P1: Participant = Participant::ALL[1];

    #[test]
    fn test_favorite_slice() {
        let slices = [
            Slice::new(0.0, 1.0),
            Slice::new(1.0, 2.0),
            Slice::new(2.0, 3.0),
        ];
        let valuation = PiecewiseConstant::new([33.0, 11.0, 1.0]);
        assert_eq!(favorite_slice(&valuation, &slices).unwrap(), slices[0]);
        let valuation = PiecewiseConstant::new([33.0, 11.0, 66.0]);
        assert_eq!(favorite_slice(&valuation, &slices).unwrap(), slices[2]);
    }

    #[test]
    fn test_favorite_slice_tie_takes_first() {
        let slices = [Slice::new(0.0, 1.0), Slice::new(1.0, 2.0)];
        let valuation = PiecewiseConstant::new([10.0, 10.0]);
        assert_eq!(favorite_slice(&valuation, &slices).unwrap(), slices[0]);
    }

    #[test]
    fn test_favorite_slice_empty() {
        let valuation = PiecewiseConstant::new([10.0]);
        assert!(matches!(
            favorite_slice(&valuation, &[]),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn test_compute_ranking() {
        let slices = [
            Slice::new(0.0, 1.0),
            Slice::new(1.0, 2.0),
            Slice::new(2.0, 3.0),
        ];
        let valuations = vec![
            PiecewiseConstant::new([33.0, 11.0, 1.0]),
            PiecewiseConstant::new([33.0, 11.0, 66.0]),
        ];
        let preferences = Preferences::compute(&[P0, P1], &valuations, &slices).unwrap();

        let p0 = preferences.of(P0).unwrap();
        assert_eq!(p0.first(), slices[0]);
        assert_eq!(p0.second(), slices[1]);
        assert_eq!(p0.third(), slices[2]);

        let p1 = preferences.of(P1).unwrap();
        assert_eq!(p1.first(), slices[2]);
        assert_eq!(p1.second(), slices[0]);
        assert_eq!(p1.third(), slices[1]);
    }

    #[test]
    fn test_claimants() {
        let slices = [
            Slice::new(0.0, 1.0),
            Slice::new(1.0, 2.0),
            Slice::new(2.0, 3.0),
        ];
        let valuations = vec![
            PiecewiseConstant::new([33.0, 11.0, 1.0]),
            PiecewiseConstant::new([33.0, 11.0, 66.0]),
        ];
        let preferences = Preferences::compute(&[P0, P1], &valuations, &slices).unwrap();

        let (first, second) = preferences.claimants(&slices[0], ParticipantSet::EMPTY);
        assert_eq!(first, vec![P0]);
        assert_eq!(second, vec![P1]);

        let (first, second) = preferences.claimants(&slices[0], ParticipantSet::EMPTY.with(P1));
        assert_eq!(first, vec![P0]);
        assert!(second.is_empty());
    }
}
