//! Mark bookkeeping and the marking-driven allocation rules.
//!
//! During the core sub-routine, each contested participant places exactly one mark on a slice:
//! a position such that the left part of the slice, up to the mark, is worth some reference
//! value to them. The [`Marking`] context records those marks; the allocators at the bottom of
//! this module turn them into allocations under the rightmost rule.

use crate::allocation::Allocation;
use crate::preference::{favorite_slice, Preferences};
use crate::{Error, Participant, ParticipantSet, Slice, Valuation};
use tracing::debug;

/// A single mark: a position recorded on a slice by a participant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mark {
    /// Participant who made the mark.
    pub participant: Participant,
    /// Absolute position of the mark.
    pub position: f64,
}

/// Records the marks made on a set of slices during one core invocation.
///
/// Marks are recorded against the slice as it existed when marked. Queries by containment
/// ([`Marking::marks_covering`]) recover the marks that apply to a sub-slice after a split.
#[derive(Clone, Debug, Default)]
pub struct Marking {
    slices: Vec<(Slice, Vec<Mark>)>,
}

impl Marking {
    /// Marks `slice` for `participant` at the position where the left part is worth
    /// `desired_value` to them.
    ///
    /// Fails when the valuation cannot reach `desired_value` within the slice; callers are
    /// responsible for only requesting reachable values.
    pub fn mark<V: Valuation>(
        &mut self,
        participant: Participant,
        valuation: &V,
        slice: Slice,
        desired_value: f64,
    ) -> Result<f64, Error> {
        let position = valuation
            .mark_for(slice.start(), desired_value)
            .filter(|position| *position <= slice.end() + crate::EPSILON)
            .ok_or(Error::UnreachableMark {
                participant,
                start: slice.start(),
                end: slice.end(),
                value: desired_value,
            })?
            // Slices past the valuation's extent invert to the extent itself; the mark
            // belongs at the slice start in that case.
            .max(slice.start());

        let marks = match self.slices.iter_mut().find(|(s, _)| *s == slice) {
            Some((_, marks)) => marks,
            None => {
                self.slices.push((slice, Vec::new()));
                &mut self.slices.last_mut().expect("just pushed").1
            }
        };
        marks.push(Mark {
            participant,
            position,
        });
        Ok(position)
    }

    /// Marks `slice` so that its left part is worth the same to `participant` as
    /// `reference` is.
    pub fn mark_to_equalize<V: Valuation>(
        &mut self,
        participant: Participant,
        valuation: &V,
        slice: Slice,
        reference: Slice,
    ) -> Result<f64, Error> {
        let desired_value = reference.value_to(valuation);
        self.mark(participant, valuation, slice, desired_value)
    }

    /// All marks on `slice`, ordered by increasing position. Empty if the slice was
    /// never marked.
    pub fn marks_on(&self, slice: &Slice) -> Vec<Mark> {
        let mut marks = self
            .slices
            .iter()
            .find(|(s, _)| s == slice)
            .map(|(_, marks)| marks.clone())
            .unwrap_or_default();
        marks.sort_by(|a, b| a.position.total_cmp(&b.position));
        marks
    }

    /// All marks recorded on any slice containing `slice`, ordered by increasing position.
    ///
    /// After a marked slice is split, this recovers the marks that were made on the original.
    pub fn marks_covering(&self, slice: &Slice) -> Vec<Mark> {
        let mut marks: Vec<Mark> = self
            .slices
            .iter()
            .filter(|(s, _)| s.contains(slice))
            .flat_map(|(_, marks)| marks.iter().copied())
            .collect();
        marks.sort_by(|a, b| a.position.total_cmp(&b.position));
        marks
    }

    /// For each participant, the slices on which they hold the rightmost mark, indexed by
    /// participant.
    pub fn rightmost_by_participant(&self) -> [Vec<Slice>; Participant::COUNT] {
        let mut out: [Vec<Slice>; Participant::COUNT] = Default::default();
        for (slice, marks) in &self.slices {
            let Some(first) = marks.first() else {
                continue;
            };
            let mut rightmost = *first;
            for mark in &marks[1..] {
                if mark.position > rightmost.position {
                    rightmost = *mark;
                }
            }
            out[rightmost.participant.index()].push(*slice);
        }
        out
    }

    /// The second-rightmost mark on `slice`. An invariant violation with fewer than two marks.
    pub fn second_rightmost(&self, slice: &Slice) -> Result<Mark, Error> {
        let marks = self.marks_on(slice);
        if marks.len() < 2 {
            return Err(Error::Invariant("second-rightmost mark requires two marks"));
        }
        Ok(marks[marks.len() - 2])
    }
}

/// Makes the single mark for a contested participant, following the core protocol's
/// precedence rule.
///
/// The participant marks their favorite slice at the position equalizing it with their second
/// favorite when the second favorite is uncontested, or in the specific tie sub-case where the
/// second favorite has exactly one second-preference competitor and both the participant and
/// that competitor have exactly one conflict on their respective first choices. Otherwise they
/// mark their second favorite at the position equalizing it with their third.
///
/// Returns the marked slice and the mark position.
pub fn mark_by_preference<V: Valuation>(
    participant: Participant,
    valuations: &[V],
    preferences: &Preferences,
    marking: &mut Marking,
    excluded: ParticipantSet,
) -> Result<(Slice, f64), Error> {
    let conflict_exclude = excluded.with(participant);
    let valuation = &valuations[participant.index()];

    let preference = preferences.of(participant)?;
    let favorite = preference.first();
    let (favorite_first_claimants, _) = preferences.claimants(&favorite, conflict_exclude);

    let second = preference.second();
    let (second_first_claimants, second_second_claimants) =
        preferences.claimants(&second, conflict_exclude);

    if second_first_claimants.is_empty() && second_second_claimants.is_empty() {
        let position = marking.mark_to_equalize(participant, valuation, favorite, second)?;
        return Ok((favorite, position));
    }

    if second_first_claimants.is_empty() && second_second_claimants.len() == 1 {
        let competitor = second_second_claimants[0];
        let competitor_favorite = preferences.of(competitor)?.first();
        let (competitor_first_claimants, _) =
            preferences.claimants(&competitor_favorite, excluded.with(competitor));
        if favorite_first_claimants.len() == 1 && competitor_first_claimants.len() == 1 {
            let position = marking.mark_to_equalize(participant, valuation, favorite, second)?;
            return Ok((favorite, position));
        }
    }

    let third = preference.third();
    let position = marking.mark_to_equalize(participant, valuation, second, third)?;
    Ok((second, position))
}

/// Allocates under the rightmost rule when `participant` holds the rightmost mark on exactly
/// two slices.
///
/// Both slices are split at their second-rightmost mark. `participant` receives whichever left
/// part they prefer; the maker of the second-rightmost mark on the chosen slice receives the
/// other left part.
pub fn allocate_doubly_rightmost<V: Valuation>(
    participant: Participant,
    marked: [Slice; 2],
    valuations: &[V],
    allocation: &mut Allocation,
) -> Result<(), Error> {
    let second_first = allocation.marking().second_rightmost(&marked[0])?;
    let second_second = allocation.marking().second_rightmost(&marked[1])?;

    let first_parts = marked[0].split_at(second_first.position);
    let second_parts = marked[1].split_at(second_second.position);
    allocation.split(marked[0], first_parts.clone())?;
    allocation.split(marked[1], second_parts.clone())?;

    let first_left = first_parts[0];
    let second_left = second_parts[0];
    let chosen = favorite_slice(
        &valuations[participant.index()],
        &[first_left, second_left],
    )?;
    let (other, second_marker) = if chosen == first_left {
        (second_left, second_first.participant)
    } else {
        (first_left, second_second.participant)
    };

    allocation.allocate(participant, chosen);
    allocation.allocate(second_marker, other);
    debug!(%participant, %chosen, beneficiary = %second_marker, %other, "doubly-rightmost allocation");
    Ok(())
}

/// Allocates every marked slice under the rightmost rule.
///
/// Each marked slice is split at its second-rightmost mark and the left part goes to whoever
/// made the slice's rightmost mark.
pub fn allocate_marked(allocation: &mut Allocation) -> Result<(), Error> {
    let by_participant = allocation.marking().rightmost_by_participant();
    for participant in Participant::ALL {
        for slice in &by_participant[participant.index()] {
            let second = allocation.marking().second_rightmost(slice)?;
            let parts = slice.split_at(second.position);
            allocation.split(*slice, parts.clone())?;
            allocation.allocate(participant, parts[0]);
            debug!(%participant, slice = %parts[0], "rightmost allocation");
        }
    }
    Ok(())
}
