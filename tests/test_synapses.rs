//! Tests for the SynapseGraph learning primitive.

use cortical::util::bit_mask;
use cortical::{CorticalError, SegUpdate, SynapseGraph};
use proptest::prelude::*;

#[test]
fn test_growth_then_reinforcement_connects() {
    let mut sg = SynapseGraph::new(64, 2, 16, 0.20);

    // Grow a fresh segment well below the connected threshold.
    let ups = vec![SegUpdate::learn((3, 1, 0), vec![5, 6, 7], vec![])];
    sg.bulk_learn(&ups, &bit_mask(64, [5, 6, 7]), 0.05, 0.01, 0.16)
        .unwrap();

    assert_eq!(sg.excitations(&[5, 6, 7], 1).len(), 0);

    // One reinforcement pushes 0.16 past 0.20.
    let ups = vec![SegUpdate::learn((3, 1, 0), vec![], vec![])];
    sg.bulk_learn(&ups, &bit_mask(64, [5, 6, 7]), 0.05, 0.01, 0.16)
        .unwrap();

    let exc = sg.excitations(&[5, 6, 7], 1);
    assert_eq!(exc.get(&(3, 1, 0)), Some(&3));
}

#[test]
fn test_decay_disconnects_unused_sources() {
    let mut sg = SynapseGraph::new(64, 2, 16, 0.20);
    sg.seed_segment((0, 0), [(1, 0.21), (2, 0.21)]);

    // Source 2 is repeatedly absent from the active set.
    for _ in 0..3 {
        let ups = vec![SegUpdate::learn((0, 0, 0), vec![], vec![])];
        sg.bulk_learn(&ups, &bit_mask(64, [1]), 0.05, 0.01, 0.16)
            .unwrap();
    }

    let exc = sg.excitations(&[1, 2], 1);
    assert_eq!(exc.get(&(0, 0, 0)), Some(&1));
    assert_eq!(sg.sources_connected_to((0, 0, 0)), vec![1]);
}

#[test]
fn test_punish_batch_leaves_inactive_untouched() {
    let mut sg = SynapseGraph::new(64, 2, 16, 0.20);
    sg.seed_segment((0, 0), [(1, 0.5), (2, 0.5)]);
    sg.seed_segment((4, 2), [(1, 0.5), (3, 0.5)]);

    let ups = vec![SegUpdate::punish((0, 0, 0)), SegUpdate::punish((4, 2, 0))];
    sg.bulk_learn(&ups, &bit_mask(64, [1]), 0.05, 0.002, 0.16)
        .unwrap();

    for path in [(0, 0, 0), (4, 2, 0)] {
        let seg = sg.in_synapses(path).unwrap();
        assert!((seg[&1] - 0.498).abs() < 1e-6);
    }
    assert_eq!(sg.in_synapses((0, 0, 0)).unwrap()[&2], 0.5);
    assert_eq!(sg.in_synapses((4, 2, 0)).unwrap()[&3], 0.5);
}

#[test]
fn test_duplicate_targets_rejected_across_ops() {
    let mut sg = SynapseGraph::new(64, 2, 16, 0.20);
    sg.seed_segment((0, 0), [(1, 0.5)]);

    let ups = vec![
        SegUpdate::reinforce((0, 0, 0)),
        SegUpdate::learn((0, 0, 0), vec![], vec![]),
    ];
    let err = sg
        .bulk_learn(&ups, &bit_mask(64, [1]), 0.05, 0.01, 0.16)
        .unwrap_err();
    assert!(matches!(err, CorticalError::DuplicateTarget { .. }));
}

#[test]
fn test_reverse_index_tracks_growth_and_death() {
    let mut sg = SynapseGraph::new(64, 2, 16, 0.20);

    let ups = vec![SegUpdate::learn((0, 0, 0), vec![9], vec![])];
    sg.bulk_learn(&ups, &bit_mask(64, [9]), 0.05, 0.01, 0.25)
        .unwrap();
    assert_eq!(sg.targets_connected_from(9).count(), 1);

    let ups = vec![SegUpdate::learn((0, 0, 0), vec![], vec![9])];
    sg.bulk_learn(&ups, &bit_mask(64, std::iter::empty()), 0.05, 0.01, 0.25)
        .unwrap();
    assert_eq!(sg.targets_connected_from(9).count(), 0);
    assert_eq!(sg.num_synapses(), 0);
}

proptest! {
    // Permanences stay inside [0, 1] and never go NaN under arbitrary
    // learn/punish/reinforce sequences.
    #[test]
    fn prop_permanences_stay_clamped(
        seed_perms in proptest::collection::vec(0.0f32..=1.0, 1..8),
        steps in proptest::collection::vec(
            (0u8..3, proptest::collection::vec(0usize..16, 0..8), 0.0f32..0.5, 0.0f32..0.5),
            1..20,
        ),
    ) {
        let mut sg = SynapseGraph::new(16, 1, 16, 0.20);
        let synapses: Vec<(usize, f32)> = seed_perms
            .iter()
            .enumerate()
            .map(|(i, &p)| (i, p))
            .collect();
        sg.seed_segment((0, 0), synapses);

        for (op, active, pinc, pdec) in steps {
            let up = match op {
                0 => SegUpdate::learn((0, 0, 0), vec![], vec![]),
                1 => SegUpdate::punish((0, 0, 0)),
                _ => SegUpdate::reinforce((0, 0, 0)),
            };
            sg.bulk_learn(&[up], &bit_mask(16, active), pinc, pdec, 0.16)
                .unwrap();

            let seg = sg.in_synapses((0, 0, 0)).unwrap();
            for (_, &p) in seg {
                prop_assert!((0.0..=1.0).contains(&p));
                prop_assert!(!p.is_nan());
            }
            prop_assert!(seg.len() <= 16);
        }
    }
}
