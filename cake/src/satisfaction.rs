//! Satisfaction, domination and gain measures over allocations.
//!
//! Satisfaction is the value a participant assigns to their own pieces; gain compares that
//! against the value they assign to everyone else's pieces. Both drive the phase transitions
//! of the protocol: who cuts next, who is excluded from competition, and which run a
//! correction targets.

use crate::allocation::Allocation;
use crate::{Error, Participant, Slice, Valuation};

/// Total value of `slices` under `valuation`.
pub fn value_of_slices<V: Valuation>(valuation: &V, slices: &[Slice]) -> f64 {
    slices.iter().map(|slice| slice.value_to(valuation)).sum()
}

/// The value `participant` assigns to their own pieces in `allocation`.
pub fn satisfaction<V: Valuation>(
    participant: Participant,
    valuations: &[V],
    allocation: &Allocation,
) -> f64 {
    value_of_slices(
        &valuations[participant.index()],
        &allocation.pieces_of(participant),
    )
}

/// The satisfaction of `participant` minus the value they assign to the pieces owned by
/// each of `others`.
pub fn gain<V: Valuation>(
    participant: Participant,
    others: &[Participant],
    valuations: &[V],
    allocation: &Allocation,
) -> f64 {
    let valuation = &valuations[participant.index()];
    let own = satisfaction(participant, valuations, allocation);
    let envy: f64 = others
        .iter()
        .map(|other| value_of_slices(valuation, &allocation.pieces_of(*other)))
        .sum();
    own - envy
}

/// The most satisfied of `participants`, ties resolving to the earlier participant.
pub fn most_satisfied<V: Valuation>(
    participants: &[Participant],
    valuations: &[V],
    allocation: &Allocation,
) -> Result<Participant, Error> {
    let mut best: Option<(Participant, f64)> = None;
    for participant in participants {
        let value = satisfaction(*participant, valuations, allocation);
        if best.map_or(true, |(_, most)| value > most) {
            best = Some((*participant, value));
        }
    }
    best.map(|(participant, _)| participant)
        .ok_or(Error::Invariant("no participants to compare"))
}

/// The least satisfied of `participants`, ties resolving to the earlier participant.
pub fn least_satisfied<V: Valuation>(
    participants: &[Participant],
    valuations: &[V],
    allocation: &Allocation,
) -> Result<Participant, Error> {
    let mut worst: Option<(Participant, f64)> = None;
    for participant in participants {
        let value = satisfaction(*participant, valuations, allocation);
        if worst.map_or(true, |(_, least)| value < least) {
            worst = Some((*participant, value));
        }
    }
    worst
        .map(|(participant, _)| participant)
        .ok_or(Error::Invariant("no participants to compare"))
}

/// Whether `participant` is strictly less satisfied than `dominator`.
pub fn is_dominated_by<V: Valuation>(
    participant: Participant,
    dominator: Participant,
    valuations: &[V],
    allocation: &Allocation,
) -> bool {
    satisfaction(participant, valuations, allocation)
        < satisfaction(dominator, valuations, allocation)
}

/// Whether `participant` is strictly less satisfied than every one of `dominators`.
pub fn is_dominated_by_all<V: Valuation>(
    participant: Participant,
    dominators: &[Participant],
    valuations: &[V],
    allocation: &Allocation,
) -> bool {
    dominators
        .iter()
        .all(|dominator| is_dominated_by(participant, *dominator, valuations, allocation))
}

/// Index of the run in `runs` where every one of `probed` gained no more than they did across
/// the other runs combined.
///
/// Used to pick the run a correction targets. An invariant violation when no run qualifies
/// for all probed participants.
pub fn lowest_gain_run<V: Valuation>(
    probed: &[Participant],
    valuations: &[V],
    runs: &[Allocation],
) -> Result<usize, Error> {
    'runs: for (index, run) in runs.iter().enumerate() {
        for participant in probed {
            let others: Vec<Participant> = probed
                .iter()
                .filter(|other| *other != participant)
                .copied()
                .collect();
            let here = gain(*participant, &others, valuations, run);
            let elsewhere: f64 = runs
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .map(|(_, other)| gain(*participant, &others, valuations, other))
                .sum();
            if here > elsewhere {
                continue 'runs;
            }
        }
        return Ok(index);
    }
    Err(Error::Invariant("no run with lowest gain for all probed"))
}
