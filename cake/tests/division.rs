//! End-to-end division runs over the whole resource.

use fairdiv_cake::{approx_eq, Division, Participant, PiecewiseConstant, Protocol, Slice, EPSILON};

/// The four density profiles used in the crate documentation.
fn worked_example() -> Vec<PiecewiseConstant> {
    vec![
        PiecewiseConstant::new([3.0, 6.0, 3.0]),
        PiecewiseConstant::new([0.0, 2.0, 4.0, 6.0]),
        PiecewiseConstant::new([6.0, 4.0, 2.0, 0.0]),
        PiecewiseConstant::new([3.0, 3.0, 3.0, 3.0]),
    ]
}

fn all_pieces(division: &Division) -> Vec<Slice> {
    Participant::ALL
        .into_iter()
        .flat_map(|participant| division.pieces(participant).to_vec())
        .collect()
}

/// Asserts the pieces tile `[0, extent)` exactly: no gaps, no overlaps.
fn assert_covers(division: &Division, extent: f64) {
    let mut pieces = all_pieces(division);
    pieces.sort_by(|a, b| a.start().total_cmp(&b.start()));
    let mut cursor = 0.0;
    for piece in &pieces {
        assert!(
            approx_eq(piece.start(), cursor),
            "gap or overlap at {cursor}: next piece is {piece}"
        );
        cursor = piece.end();
    }
    assert!(approx_eq(cursor, extent), "pieces end at {cursor}, not {extent}");
}

/// Asserts no participant prefers another's bundle, after trimming its single best piece,
/// by more than a factor of three fourths.
fn assert_no_trimmed_envy(valuations: &[PiecewiseConstant], division: &Division) {
    for participant in Participant::ALL {
        let valuation = &valuations[participant.index()];
        let own: f64 = division
            .pieces(participant)
            .iter()
            .map(|slice| slice.value_to(valuation))
            .sum();
        for other in Participant::ALL {
            if other == participant {
                continue;
            }
            let values: Vec<f64> = division
                .pieces(other)
                .iter()
                .map(|slice| slice.value_to(valuation))
                .collect();
            let total: f64 = values.iter().sum();
            let best = values.iter().fold(0.0_f64, |a, b| a.max(*b));
            assert!(
                own + EPSILON >= 0.75 * (total - best),
                "{participant} (worth {own}) envies {other}'s trimmed bundle (worth {})",
                total - best
            );
        }
    }
}

#[test]
fn test_worked_example() {
    let valuations = worked_example();
    let division = Protocol::new(valuations.clone()).unwrap().divide().unwrap();

    assert_covers(&division, 4.0);
    for participant in Participant::ALL {
        assert!(
            !division.pieces(participant).is_empty(),
            "{participant} received nothing"
        );
    }
    assert_no_trimmed_envy(&valuations, &division);
}

#[test]
fn test_worked_example_is_deterministic() {
    let first = Protocol::new(worked_example()).unwrap().divide().unwrap();
    let second = Protocol::new(worked_example()).unwrap().divide().unwrap();
    for participant in Participant::ALL {
        assert_eq!(first.pieces(participant), second.pieces(participant));
    }
}

#[test]
fn test_identical_valuations() {
    let valuations = vec![
        PiecewiseConstant::new([1.0, 1.0, 1.0, 1.0]),
        PiecewiseConstant::new([1.0, 1.0, 1.0, 1.0]),
        PiecewiseConstant::new([1.0, 1.0, 1.0, 1.0]),
        PiecewiseConstant::new([1.0, 1.0, 1.0, 1.0]),
    ];
    let division = Protocol::new(valuations.clone()).unwrap().divide().unwrap();

    assert_covers(&division, 4.0);
    // Indistinguishable participants end up with equal shares.
    for participant in Participant::ALL {
        let valuation = &valuations[participant.index()];
        let own: f64 = division
            .pieces(participant)
            .iter()
            .map(|slice| slice.value_to(valuation))
            .sum();
        assert!(approx_eq(own, 1.0), "{participant} received {own}");
    }
    assert_no_trimmed_envy(&valuations, &division);
}

#[test]
fn test_disjoint_favorites_settle_in_one_round() {
    // Each non-cutter concentrates their value on a different quarter: nobody competes, so
    // everyone takes their favorite outright and the cutter keeps the last quarter.
    let valuations = vec![
        PiecewiseConstant::new([1.0, 1.0, 1.0, 1.0]),
        PiecewiseConstant::new([9.0, 1.0, 1.0, 1.0]),
        PiecewiseConstant::new([1.0, 9.0, 1.0, 1.0]),
        PiecewiseConstant::new([1.0, 1.0, 9.0, 1.0]),
    ];
    let division = Protocol::new(valuations.clone()).unwrap().divide().unwrap();

    assert_covers(&division, 4.0);
    assert_eq!(division.pieces(Participant::ALL[1]), &[Slice::new(0.0, 1.0)]);
    assert_eq!(division.pieces(Participant::ALL[2]), &[Slice::new(1.0, 2.0)]);
    assert_eq!(division.pieces(Participant::ALL[3]), &[Slice::new(2.0, 3.0)]);
    assert_eq!(division.pieces(Participant::ALL[0]), &[Slice::new(3.0, 4.0)]);
    assert_no_trimmed_envy(&valuations, &division);
}

#[test]
fn test_mixed_extents_cover_longest() {
    // Valuations with different extents: the resource spans the longest one, and regions
    // worthless to some participants are still allocated.
    let valuations = worked_example();
    let division = Protocol::new(valuations).unwrap().divide().unwrap();
    let pieces = all_pieces(&division);
    let measure: f64 = pieces.iter().map(|slice| slice.width()).sum();
    assert!(approx_eq(measure, 4.0));
}
