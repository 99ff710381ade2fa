//! Ownership tracking for slices of the resource.
//!
//! An [`Allocation`] treats a list of slices as the whole working area: it tracks how those
//! slices are split, who owns which part, and the marks made along the way. The protocol
//! engine keeps one allocation for the whole resource and one short-lived allocation per
//! sub-routine invocation, folding the latter into the former with [`Allocation::combine`].

use crate::marking::Marking;
use crate::{approx_eq, Error, Participant, ParticipantSet, Slice, Valuation};
use tracing::trace;

/// Tracks splits, ownership and marks over a set of slices.
#[derive(Clone, Debug)]
pub struct Allocation {
    /// Slices that have not been split within this allocation.
    complete: Vec<Slice>,
    /// Current leaf slices: every position is covered by exactly one.
    slices: Vec<Slice>,
    /// Ownership by leaf slice, in assignment order.
    owners: Vec<(Slice, Participant)>,
    marking: Marking,
}

impl Allocation {
    /// Creates an allocation over `slices`, all initially complete and unowned.
    pub fn new(slices: Vec<Slice>) -> Self {
        Self {
            complete: slices.clone(),
            slices,
            owners: Vec::new(),
            marking: Marking::default(),
        }
    }

    /// The marking context of this allocation.
    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    /// Mutable access to the marking context.
    pub fn marking_mut(&mut self) -> &mut Marking {
        &mut self.marking
    }

    /// All current leaf slices.
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Ownership assignments, in the order they were made.
    pub fn owners(&self) -> &[(Slice, Participant)] {
        &self.owners
    }

    /// Unowned leaf slices, ordered by start position.
    pub fn unallocated(&self) -> Vec<Slice> {
        let mut free: Vec<Slice> = self
            .slices
            .iter()
            .filter(|slice| self.owner_of(slice).is_none())
            .copied()
            .collect();
        free.sort_by(|a, b| a.start().total_cmp(&b.start()));
        free
    }

    /// Unowned slices that were never split within this allocation.
    pub fn free_complete(&self) -> Vec<Slice> {
        self.complete
            .iter()
            .filter(|slice| self.owner_of(slice).is_none())
            .copied()
            .collect()
    }

    /// Leaf slices produced by splits within this allocation.
    pub fn partial(&self) -> Vec<Slice> {
        self.slices
            .iter()
            .filter(|slice| !self.complete.contains(slice))
            .copied()
            .collect()
    }

    /// Participants owning at least one slice.
    pub fn owners_set(&self) -> ParticipantSet {
        self.owners.iter().map(|(_, owner)| *owner).collect()
    }

    /// All slices owned by `participant`, in assignment order.
    pub fn pieces_of(&self, participant: Participant) -> Vec<Slice> {
        self.owners
            .iter()
            .filter(|(_, owner)| *owner == participant)
            .map(|(slice, _)| *slice)
            .collect()
    }

    /// The owner of `slice`, if any.
    pub fn owner_of(&self, slice: &Slice) -> Option<Participant> {
        self.owners
            .iter()
            .find(|(owned, _)| owned == slice)
            .map(|(_, owner)| *owner)
    }

    /// Gives `slice` to `participant`.
    ///
    /// Ownership cascades: every leaf contained in `slice` is (re)assigned, so allocating a
    /// slice that was split within this allocation hands over all of its parts.
    pub fn allocate(&mut self, participant: Participant, slice: Slice) {
        let parts: Vec<Slice> = self
            .slices
            .iter()
            .filter(|leaf| slice.contains(leaf))
            .copied()
            .collect();
        for part in parts {
            trace!(%participant, slice = %part, "allocating");
            match self.owners.iter_mut().find(|(owned, _)| *owned == part) {
                Some((_, owner)) => *owner = participant,
                None => self.owners.push((part, participant)),
            }
        }
    }

    /// Records that `original` was split into `parts`.
    ///
    /// A no-op split (a single part equal to the original) leaves the allocation untouched, so
    /// the slice stays complete. Splitting an owned slice is an invariant violation.
    pub fn split(&mut self, original: Slice, parts: Vec<Slice>) -> Result<(), Error> {
        if parts.len() == 1 && parts[0] == original {
            return Ok(());
        }
        if self.owner_of(&original).is_some() {
            return Err(Error::Invariant("cannot split an allocated slice"));
        }
        self.complete.retain(|slice| *slice != original);
        self.slices.retain(|slice| *slice != original);
        self.slices.extend(parts);
        Ok(())
    }

    /// The owned slice worth the least to `valuation`, across all owners.
    pub fn insignificant_slice<V: Valuation>(&self, valuation: &V) -> Result<Slice, Error> {
        let mut worst: Option<(Slice, f64)> = None;
        for (slice, _) in &self.owners {
            let value = slice.value_to(valuation);
            if worst.map_or(true, |(_, least)| value < least) {
                worst = Some((*slice, value));
            }
        }
        worst
            .map(|(slice, _)| slice)
            .ok_or(Error::Invariant("no owned slices"))
    }

    /// The first participant (in index order) who owns the slice they themselves consider the
    /// least valuable of all owned slices, if any.
    pub fn participant_with_insignificant<V: Valuation>(
        &self,
        valuations: &[V],
    ) -> Option<Participant> {
        let owners = self.owners_set();
        for participant in Participant::ALL {
            if !owners.contains(participant) {
                continue;
            }
            let worst = self
                .insignificant_slice(&valuations[participant.index()])
                .ok()?;
            if self.owner_of(&worst) == Some(participant) {
                return Some(participant);
            }
        }
        None
    }

    /// Folds `other` (an allocation over a subset of this one's slices) into this allocation.
    ///
    /// Splits made in `other` are replayed here, ownership is carried over, and finally
    /// adjacent unowned leaves are merged back into single slices so the next sub-routine sees
    /// a residue of maximal contiguous slices.
    pub fn combine(&mut self, other: &Allocation) -> Result<(), Error> {
        // Replay the other's splits: group its leaves by the leaf of ours containing them.
        let mut groups: Vec<(Slice, Vec<Slice>)> = Vec::new();
        for leaf in other.slices() {
            let Some(parent) = self.slices.iter().find(|slice| slice.contains(leaf)) else {
                continue;
            };
            match groups.iter_mut().find(|(slice, _)| slice == parent) {
                Some((_, group)) => group.push(*leaf),
                None => groups.push((*parent, vec![*leaf])),
            }
        }
        for (parent, group) in groups {
            if group.len() > 1 {
                self.split(parent, group)?;
            }
        }

        for (slice, owner) in other.owners() {
            self.allocate(*owner, *slice);
        }
        self.merge_unallocated();
        Ok(())
    }

    /// Merges runs of adjacent unowned leaves into single slices.
    fn merge_unallocated(&mut self) {
        let free = self.unallocated();
        let mut runs: Vec<Vec<Slice>> = Vec::new();
        for slice in free {
            match runs.last_mut() {
                Some(run) if approx_eq(run.last().expect("runs are non-empty").end(), slice.start()) => {
                    run.push(slice);
                }
                _ => runs.push(vec![slice]),
            }
        }
        for run in runs {
            if run.len() < 2 {
                continue;
            }
            let merged = Slice::new(run[0].start(), run.last().expect("run has two slices").end());
            self.complete.retain(|slice| !run.contains(slice));
            self.slices.retain(|slice| !run.contains(slice));
            self.slices.push(merged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PiecewiseConstant;

    const P0: Participant = Participant::ALL[0];
    const P1: Participant = Participant::ALL[1];
    const P2: Participant = Participant::ALL[2];

    #[test]
    fn test_allocate_and_query() {
        let a = Slice::new(0.0, 1.0);
        let b = Slice::new(1.0, 2.0);
        let mut allocation = Allocation::new(vec![a, b]);
        assert!(allocation.pieces_of(P0).is_empty());

        allocation.allocate(P0, a);
        assert_eq!(allocation.pieces_of(P0), vec![a]);
        assert_eq!(allocation.owner_of(&a), Some(P0));
        assert_eq!(allocation.unallocated(), vec![b]);
        assert_eq!(allocation.free_complete(), vec![b]);

        // Reallocation transfers ownership.
        allocation.allocate(P1, a);
        assert_eq!(allocation.owner_of(&a), Some(P1));
        assert!(allocation.pieces_of(P0).is_empty());
    }

    #[test]
    fn test_allocate_cascades_to_parts() {
        let whole = Slice::new(0.0, 1.0);
        let mut allocation = Allocation::new(vec![whole]);
        let parts = whole.split_at(0.3);
        allocation.split(whole, parts.clone()).unwrap();

        allocation.allocate(P0, whole);
        assert_eq!(allocation.pieces_of(P0), parts);
    }

    #[test]
    fn test_split_tracks_partials() {
        let whole = Slice::new(0.0, 1.0);
        let mut allocation = Allocation::new(vec![whole]);
        allocation.split(whole, whole.split_at(0.3)).unwrap();
        assert_eq!(
            allocation.partial(),
            vec![Slice::new(0.0, 0.3), Slice::new(0.3, 1.0)]
        );
        assert!(allocation.free_complete().is_empty());
    }

    #[test]
    fn test_noop_split_keeps_slice_complete() {
        let whole = Slice::new(0.0, 1.0);
        let mut allocation = Allocation::new(vec![whole]);
        allocation.split(whole, whole.split_at(1.0)).unwrap();
        assert_eq!(allocation.free_complete(), vec![whole]);
        assert!(allocation.partial().is_empty());
    }

    #[test]
    fn test_split_allocated_slice_fails() {
        let whole = Slice::new(0.0, 1.0);
        let mut allocation = Allocation::new(vec![whole]);
        allocation.allocate(P0, whole);
        assert!(matches!(
            allocation.split(whole, whole.split_at(0.5)),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn test_insignificant_slice() {
        let valuation = PiecewiseConstant::new([33.0, 33.0]);
        let a = Slice::new(0.0, 1.0);
        let b = Slice::new(1.0, 1.5);
        let c = Slice::new(1.5, 1.6);
        let mut allocation = Allocation::new(vec![a, b, c]);
        allocation.allocate(P0, a);
        allocation.allocate(P0, b);
        assert_eq!(allocation.insignificant_slice(&valuation).unwrap(), b);

        // Slices owned by anyone count, not just one's own.
        allocation.allocate(P1, c);
        assert_eq!(allocation.insignificant_slice(&valuation).unwrap(), c);
    }

    #[test]
    fn test_participant_with_insignificant() {
        let valuations = vec![
            PiecewiseConstant::new([33.0, 33.0]),
            PiecewiseConstant::new([33.0, 33.0]),
            PiecewiseConstant::new([33.0, 33.0]),
            PiecewiseConstant::new([33.0, 33.0]),
        ];
        let a = Slice::new(0.0, 1.0);
        let b = Slice::new(1.0, 1.5);
        let c = Slice::new(1.5, 1.6);
        let mut allocation = Allocation::new(vec![a, b, c]);
        allocation.allocate(P0, a);
        allocation.allocate(P1, b);
        allocation.allocate(P0, c);
        assert_eq!(
            allocation.participant_with_insignificant(&valuations),
            Some(P0)
        );
    }

    #[test]
    fn test_combine_replays_splits_and_ownership() {
        let a = Slice::new(0.0, 1.0);
        let b = Slice::new(1.0, 1.5);
        let c = Slice::new(1.5, 1.6);
        let d = Slice::new(1.7, 1.8);
        let mut total = Allocation::new(vec![a, b, c, d]);
        total.allocate(P0, a);

        let mut inner = Allocation::new(vec![b, c, d]);
        inner.allocate(P0, b);
        inner.allocate(P1, c);
        let parts = d.split_at(1.75);
        inner.split(d, parts.clone()).unwrap();
        inner.allocate(P2, parts[0]);
        inner.allocate(P2, parts[1]);

        total.combine(&inner).unwrap();
        assert!(total.unallocated().is_empty());
        assert_eq!(total.owner_of(&b), Some(P0));
        assert_eq!(total.owner_of(&c), Some(P1));
        assert_eq!(total.pieces_of(P2), parts);
    }

    #[test]
    fn test_combine_merges_adjacent_unallocated() {
        let a = Slice::new(0.0, 1.0);
        let b = Slice::new(1.0, 2.0);
        let c = Slice::new(2.0, 3.0);
        let mut total = Allocation::new(vec![a, b, c]);

        let mut inner = Allocation::new(vec![a, b, c]);
        inner.allocate(P0, a);
        total.combine(&inner).unwrap();

        // The two unowned leaves share an endpoint and collapse into one residue slice.
        assert_eq!(total.unallocated(), vec![Slice::new(1.0, 3.0)]);
    }
}
