//! The four-participant division protocol.
//!
//! [`Protocol::divide`] runs three phases over the whole resource. Phase one repeatedly has
//! participant 0 quarter the residue and lets the others compete for the quarters; phase two
//! does the same with a cutter picked by satisfaction; phase three splits whatever residue is
//! left between the two contested participants. Two fallbacks close the remaining cases: a
//! three-participant trim-and-choose division when the first cutter ends up most satisfied,
//! and a two-participant half-value split at the very end.

use crate::allocation::Allocation;
use crate::marking;
use crate::preference::{favorite_slice, Preferences};
use crate::satisfaction;
use crate::slice::split_all_into_equal_value;
use crate::{approx_eq, Error, Participant, ParticipantSet, Slice, Valuation};
use tracing::debug;

/// The outcome of a division: each participant's pieces, ordered by start position.
#[derive(Clone, Debug)]
pub struct Division {
    pieces: Vec<Vec<Slice>>,
}

impl Division {
    /// The pieces given to `participant`.
    pub fn pieces(&self, participant: Participant) -> &[Slice] {
        &self.pieces[participant.index()]
    }
}

/// Divides `[0, extent)` among four participants.
pub struct Protocol<V: Valuation> {
    valuations: Vec<V>,
}

impl<V: Valuation> Protocol<V> {
    /// Creates a protocol over the given valuations, one per participant in index order.
    ///
    /// Fails unless there are exactly four valuations, each assigning strictly positive value
    /// to the resource.
    pub fn new(valuations: Vec<V>) -> Result<Self, Error> {
        if valuations.len() != Participant::COUNT {
            return Err(Error::ParticipantCount(valuations.len()));
        }
        for participant in Participant::ALL {
            if valuations[participant.index()].total() <= 0.0 {
                return Err(Error::WorthlessResource(participant));
            }
        }
        Ok(Self { valuations })
    }

    /// Length of the resource: the largest extent any participant's valuation covers.
    fn extent(&self) -> f64 {
        self.valuations
            .iter()
            .map(|valuation| valuation.extent())
            .fold(0.0, f64::max)
    }

    /// Runs the full protocol and returns every participant's pieces.
    pub fn divide(&self) -> Result<Division, Error> {
        let cake = Slice::new(0.0, self.extent());
        let mut total = Allocation::new(vec![cake]);
        debug!(cake = %cake, "starting division");

        // Phase one: participant 0 cuts, up to five times.
        let cutter = Participant::ALL[0];
        let mut runs = Vec::with_capacity(4);
        for _ in 0..4 {
            let run = self.core(cutter, total.unallocated(), None)?;
            total.combine(&run)?;
            runs.push(run);
            if total.unallocated().is_empty() {
                return Ok(self.finish(&total));
            }
        }

        // If one participant kept receiving the slice they value least, fix up the run where
        // the contested pair gained the least.
        let flagged: Vec<Participant> = runs
            .iter()
            .filter_map(|run| run.participant_with_insignificant(&self.valuations))
            .collect();
        if flagged.len() == runs.len() && flagged.iter().all(|p| *p == flagged[0]) {
            debug!(participant = %flagged[0], "insignificant slice in every run, correcting");
            let probed = [Participant::ALL[1], Participant::ALL[2]];
            let index = satisfaction::lowest_gain_run(&probed, &self.valuations, &runs)?;
            self.correction(cutter, &runs[index], &mut total)?;
        }

        let run = self.core(cutter, total.unallocated(), None)?;
        total.combine(&run)?;
        if total.unallocated().is_empty() {
            return Ok(self.finish(&total));
        }

        let most = satisfaction::most_satisfied(&Participant::ALL, &self.valuations, &total)?;
        if most == cutter {
            // The cutter cannot be envied further; divide the residue among the rest.
            debug!("cutter is most satisfied, dividing residue three ways");
            let trio = [
                Participant::ALL[1],
                Participant::ALL[2],
                Participant::ALL[3],
            ];
            let run = self.trim_and_choose(trio, total.unallocated())?;
            total.combine(&run)?;
            return Ok(self.finish(&total));
        }
        debug!(participant = %most, "most satisfied participant cuts next");
        let run = self.core(most, total.unallocated(), Some(cutter))?;
        total.combine(&run)?;
        if total.unallocated().is_empty() {
            return Ok(self.finish(&total));
        }

        // Phase two: the least satisfied participant sits out as A; the last of the others
        // cuts twice, with the more satisfied of the contested pair excluded each time.
        let a = satisfaction::least_satisfied(&Participant::ALL, &self.valuations, &total)?;
        let others: Vec<Participant> = Participant::ALL
            .into_iter()
            .filter(|p| *p != a)
            .collect();
        let (b, c, d) = (others[0], others[1], others[2]);
        debug!(%a, %b, %c, %d, "starting second phase");

        let mut runs = Vec::with_capacity(2);
        for _ in 0..2 {
            let exclude = satisfaction::most_satisfied(&[b, c], &self.valuations, &total)?;
            let run = self.core(d, total.unallocated(), Some(exclude))?;
            total.combine(&run)?;
            runs.push(run);
            if total.unallocated().is_empty() {
                return Ok(self.finish(&total));
            }
        }

        if !satisfaction::is_dominated_by_all(b, &[a, d], &self.valuations, &total)
            || !satisfaction::is_dominated_by_all(c, &[a, d], &self.valuations, &total)
        {
            let flagged: Vec<(usize, Participant)> = runs
                .iter()
                .enumerate()
                .filter_map(|(index, run)| {
                    run.participant_with_insignificant(&self.valuations)
                        .map(|participant| (index, participant))
                })
                .collect();
            match flagged.first() {
                None => {
                    debug!("no insignificant slice in either run, skipping correction");
                }
                Some((_, f)) => {
                    let f = *f;
                    if flagged.iter().any(|(_, p)| *p != f) {
                        return Err(Error::Invariant(
                            "conflicting insignificant participants across runs",
                        ));
                    }
                    if f != b && f != c {
                        return Err(Error::Invariant(
                            "insignificant participant outside the contested pair",
                        ));
                    }
                    let others: Vec<Participant> = Participant::ALL
                        .into_iter()
                        .filter(|p| *p != f)
                        .collect();
                    let mut target: Option<(usize, f64)> = None;
                    for (index, _) in &flagged {
                        let value = satisfaction::gain(f, &others, &self.valuations, &runs[*index]);
                        if target.map_or(true, |(_, least)| value < least) {
                            target = Some((*index, value));
                        }
                    }
                    let (index, _) = target.ok_or(Error::Invariant("no run to correct"))?;
                    debug!(participant = %f, run = index, "correcting lowest-gain run");
                    self.correction(d, &runs[index], &mut total)?;
                }
            }
        }

        // Phase three: whatever residue remains is split between the contested pair.
        debug!(%b, %c, "splitting residue between the contested pair");
        let run = self.halve(b, c, total.unallocated())?;
        total.combine(&run)?;
        Ok(self.finish(&total))
    }

    /// One core run: `cutter` quarters the residue, the others compete for the quarters.
    ///
    /// Participants whose favorite quarter is uncontested take it outright. The rest each
    /// place one mark and the marked slices are allocated under the rightmost rule; anyone
    /// still empty-handed picks their favorite remaining whole quarter. The cutter takes the
    /// last whole quarter. A participant in `excluded` competes for nothing this run.
    fn core(
        &self,
        cutter: Participant,
        residue: Vec<Slice>,
        excluded: Option<Participant>,
    ) -> Result<Allocation, Error> {
        let mut slices =
            split_all_into_equal_value(&self.valuations[cutter.index()], Participant::COUNT, &residue);
        // A residue worth nothing to the cutter cannot be quartered by value. Competition
        // still needs four slices, so fall back to halving the widest slice by width.
        while slices.len() < Participant::COUNT {
            let mut widest = 0;
            for (index, slice) in slices.iter().enumerate() {
                if slice.width() > slices[widest].width() {
                    widest = index;
                }
            }
            let slice = slices[widest];
            let parts = slice.split_at(slice.start() + slice.width() / 2.0);
            if parts.len() < 2 {
                break;
            }
            slices.splice(widest..=widest, parts);
        }
        debug!(%cutter, quarters = slices.len(), "cut residue");
        let mut allocation = Allocation::new(slices.clone());

        let mut active: Vec<Participant> = Participant::ALL
            .into_iter()
            .filter(|p| *p != cutter)
            .collect();
        let preferences = Preferences::compute(&active, &self.valuations, &slices)?;

        let mut satisfied = Vec::new();
        for participant in &active {
            let favorite = preferences.of(*participant)?.first();
            let mut exclude = ParticipantSet::EMPTY.with(*participant);
            if let Some(excluded) = excluded {
                exclude.insert(excluded);
            }
            let (first_claimants, _) = preferences.claimants(&favorite, exclude);
            if first_claimants.is_empty() {
                debug!(%participant, slice = %favorite, "uncontested favorite");
                allocation.allocate(*participant, favorite);
                satisfied.push(*participant);
            }
        }
        active.retain(|participant| !satisfied.contains(participant));

        if active.is_empty() {
            self.cutter_takes_remaining(cutter, &mut allocation)?;
            return Ok(allocation);
        }

        // Competition: each contested participant places one mark.
        let mut exclude_for_marks: ParticipantSet = satisfied.iter().copied().collect();
        if let Some(excluded) = excluded {
            exclude_for_marks.insert(excluded);
        }
        for participant in active.iter().filter(|p| Some(**p) != excluded) {
            let (slice, position) = marking::mark_by_preference(
                *participant,
                &self.valuations,
                &preferences,
                allocation.marking_mut(),
                exclude_for_marks,
            )?;
            debug!(%participant, position, slice = %slice, "marked");
        }

        let rightmost = allocation.marking().rightmost_by_participant();
        let doubly = Participant::ALL
            .into_iter()
            .find(|p| rightmost[p.index()].len() == 2);
        match doubly {
            Some(participant) => {
                let marked = [
                    rightmost[participant.index()][0],
                    rightmost[participant.index()][1],
                ];
                marking::allocate_doubly_rightmost(
                    participant,
                    marked,
                    &self.valuations,
                    &mut allocation,
                )?;
            }
            None => marking::allocate_marked(&mut allocation)?,
        }

        // Contested participants left with nothing pick a whole quarter.
        for participant in active.iter().filter(|p| Some(**p) != excluded) {
            if allocation.owners_set().contains(*participant) {
                continue;
            }
            let favorite = favorite_slice(
                &self.valuations[participant.index()],
                &allocation.free_complete(),
            )?;
            debug!(%participant, slice = %favorite, "picked remaining quarter");
            allocation.allocate(*participant, favorite);
        }

        self.cutter_takes_remaining(cutter, &mut allocation)?;
        Ok(allocation)
    }

    fn cutter_takes_remaining(
        &self,
        cutter: Participant,
        allocation: &mut Allocation,
    ) -> Result<(), Error> {
        let free = allocation.free_complete();
        let slice = free
            .first()
            .ok_or(Error::Invariant("no whole slice left for the cutter"))?;
        debug!(%cutter, slice = %slice, "cutter takes remaining slice");
        allocation.allocate(cutter, *slice);
        Ok(())
    }

    /// Reassigns pieces of a finished run in which `a` ended up owning the slice everyone's
    /// pieces make look worthless to them.
    ///
    /// The slice moves to the other participant who marked it. If the run split nothing else,
    /// the remaining slices are re-picked by favorite; otherwise the other split slice goes to
    /// the rightmost marker on it (other than the receiver), the last non-cutter picks a whole
    /// quarter and the cutter takes what is left.
    fn correction(
        &self,
        cutter: Participant,
        run: &Allocation,
        total: &mut Allocation,
    ) -> Result<(), Error> {
        let a = run
            .participant_with_insignificant(&self.valuations)
            .ok_or(Error::Invariant("correction requires an insignificant slice"))?;
        let insignificant = run.insignificant_slice(&self.valuations[a.index()])?;
        let marks = run.marking().marks_covering(&insignificant);
        if marks.len() != 2 {
            return Err(Error::Invariant("insignificant slice must carry two marks"));
        }
        let b = marks
            .iter()
            .map(|mark| mark.participant)
            .find(|participant| *participant != a)
            .ok_or(Error::Invariant("insignificant slice marked only by its owner"))?;
        debug!(%a, %b, slice = %insignificant, "transferring insignificant slice");
        total.allocate(b, insignificant);

        let remaining: Vec<Participant> = Participant::ALL
            .into_iter()
            .filter(|p| *p != a && *p != b)
            .collect();
        let (c, d) = (remaining[0], remaining[1]);

        let partial = run.partial();
        if partial.len() <= 1 {
            // Nothing else was split: re-pick the run's slices by favorite.
            let mut taken = vec![insignificant];
            for participant in [c, a, d] {
                let candidates: Vec<Slice> = run
                    .slices()
                    .iter()
                    .filter(|slice| !taken.contains(slice))
                    .copied()
                    .collect();
                if candidates.is_empty() {
                    break;
                }
                let favorite =
                    favorite_slice(&self.valuations[participant.index()], &candidates)?;
                debug!(%participant, slice = %favorite, "re-picked");
                total.allocate(participant, favorite);
                taken.push(favorite);
            }
            return Ok(());
        }

        let other = partial
            .iter()
            .find(|slice| **slice != insignificant)
            .copied()
            .ok_or(Error::Invariant("no other split slice"))?;
        let marks = run.marking().marks_covering(&other);
        let e = marks
            .iter()
            .rev()
            .map(|mark| mark.participant)
            .find(|participant| *participant != b)
            .ok_or(Error::Invariant("no mark on the other split slice"))?;
        debug!(%e, slice = %other, "rightmost marker receives the other split slice");
        total.allocate(e, other);

        let last = Participant::ALL
            .into_iter()
            .find(|p| *p != cutter && *p != e && *p != b)
            .ok_or(Error::Invariant("no participant left to choose"))?;
        let free = run.free_complete();
        let favorite = favorite_slice(&self.valuations[last.index()], &free)?;
        debug!(%last, slice = %favorite, "last non-cutter picked");
        total.allocate(last, favorite);

        let leftover = free
            .into_iter()
            .find(|slice| *slice != favorite)
            .ok_or(Error::Invariant("no whole slice left for the cutter"))?;
        debug!(%cutter, slice = %leftover, "cutter takes remaining slice");
        total.allocate(cutter, leftover);
        Ok(())
    }

    /// Divides the residue among three participants: the first cuts it into thirds, the
    /// second trims the largest third, and picks proceed so that nobody envies another.
    fn trim_and_choose(
        &self,
        trio: [Participant; 3],
        residue: Vec<Slice>,
    ) -> Result<Allocation, Error> {
        let [p1, p2, p3] = trio;
        let thirds = split_all_into_equal_value(&self.valuations[p1.index()], 3, &residue);
        let mut allocation = Allocation::new(thirds);

        let v2 = &self.valuations[p2.index()];
        let mut order: Vec<Slice> = allocation.slices().to_vec();
        order.sort_by(|x, y| y.value_to(v2).total_cmp(&x.value_to(v2)));

        // When the trimmer sees the two largest thirds as equal there is nothing to trim;
        // picks in reverse order settle it.
        if order.len() < 3 || approx_eq(order[0].value_to(v2), order[1].value_to(v2)) {
            self.pick_remaining([p3, p2, p1], &mut allocation)?;
            return Ok(allocation);
        }

        let largest = order[0];
        let second = order[1];
        let third = order[2];
        let target = second.value_to(v2);
        let position = v2
            .mark_for(largest.start(), target)
            .ok_or(Error::UnreachableMark {
                participant: p2,
                start: largest.start(),
                end: largest.end(),
                value: target,
            })?;
        let parts = largest.split_at(position);
        if parts.len() < 2 {
            // Trim came out at the boundary: the thirds are effectively equal.
            self.pick_remaining([p3, p2, p1], &mut allocation)?;
            return Ok(allocation);
        }
        let kept = parts[0];
        let trimming = parts[1];
        allocation.split(largest, parts.clone())?;
        debug!(trimmer = %p2, %kept, %trimming, "trimmed largest third");

        let mut large = vec![kept, second, third];
        let favorite = favorite_slice(&self.valuations[p3.index()], &large)?;
        allocation.allocate(p3, favorite);
        large.retain(|slice| *slice != favorite);

        // Whoever of the choosers did not take the trimmed third divides the trimming.
        let (pa, pb) = if kept != favorite {
            allocation.allocate(p2, kept);
            large.retain(|slice| *slice != kept);
            (p2, p3)
        } else {
            let favorite = favorite_slice(v2, &large)?;
            allocation.allocate(p2, favorite);
            large.retain(|slice| *slice != favorite);
            (p3, p2)
        };
        let last = large
            .pop()
            .ok_or(Error::Invariant("no third left for the divider"))?;
        allocation.allocate(p1, last);

        let trim_parts = trimming.split_into_equal_value(&self.valuations[pb.index()], 3);
        allocation.split(trimming, trim_parts)?;
        self.pick_remaining([pa, p1, pb], &mut allocation)?;
        Ok(allocation)
    }

    /// Splits every residue slice between two participants at the average of their half-value
    /// marks; whoever marked further left takes the left part.
    fn halve(
        &self,
        a: Participant,
        b: Participant,
        residue: Vec<Slice>,
    ) -> Result<Allocation, Error> {
        let mut allocation = Allocation::new(residue.clone());
        let va = &self.valuations[a.index()];
        let vb = &self.valuations[b.index()];

        for slice in residue {
            let mark_a =
                allocation
                    .marking_mut()
                    .mark(a, va, slice, slice.value_to(va) / 2.0)?;
            let mark_b =
                allocation
                    .marking_mut()
                    .mark(b, vb, slice, slice.value_to(vb) / 2.0)?;

            if approx_eq(mark_a, mark_b) {
                let parts = slice.split_into_equal_value(va, 2);
                if parts.len() < 2 {
                    allocation.allocate(a, slice);
                    continue;
                }
                allocation.split(slice, parts.clone())?;
                allocation.allocate(a, parts[0]);
                allocation.allocate(b, parts[1]);
                continue;
            }

            let position = (mark_a + mark_b) / 2.0;
            let parts = slice.split_at(position);
            if parts.len() < 2 {
                allocation.allocate(a, slice);
                continue;
            }
            allocation.split(slice, parts.clone())?;
            if mark_a < mark_b {
                allocation.allocate(a, parts[0]);
                allocation.allocate(b, parts[1]);
            } else {
                allocation.allocate(a, parts[1]);
                allocation.allocate(b, parts[0]);
            }
        }
        Ok(allocation)
    }

    /// Lets `order` repeatedly pick their favorite of the unowned slices until none remain.
    fn pick_remaining(
        &self,
        order: [Participant; 3],
        allocation: &mut Allocation,
    ) -> Result<(), Error> {
        let mut index = 0;
        loop {
            let free = allocation.unallocated();
            if free.is_empty() {
                return Ok(());
            }
            let participant = order[index % order.len()];
            index += 1;
            let favorite = favorite_slice(&self.valuations[participant.index()], &free)?;
            debug!(%participant, slice = %favorite, "picked");
            allocation.allocate(participant, favorite);
        }
    }

    fn finish(&self, total: &Allocation) -> Division {
        let mut pieces: Vec<Vec<Slice>> = Participant::ALL
            .into_iter()
            .map(|participant| total.pieces_of(participant))
            .collect();
        for list in &mut pieces {
            list.sort_by(|x, y| x.start().total_cmp(&y.start()));
        }
        Division { pieces }
    }
}
