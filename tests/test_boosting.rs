//! Tests for duty cycles and boosting, including the layer-level
//! guarantee that a unit max_boost never moves a boost factor.

use approx::assert_relative_eq;
use cortical::boosting::Boosting;
use cortical::{GridTopology, Layer, LayerParams};
use std::collections::BTreeSet;

#[test]
fn test_duty_cycles_converge_to_active_fraction() {
    let mut b = Boosting::new(2);
    let active: BTreeSet<usize> = [0].into_iter().collect();

    // Column 0 active every step over a short window.
    for t in 1..=200u64 {
        b.update_duty_cycles(&active, t, 50);
    }
    assert_relative_eq!(b.duty_cycle(0), 1.0, epsilon = 1e-3);
    assert_relative_eq!(b.duty_cycle(1), 0.0, epsilon = 1e-3);
}

#[test]
fn test_intermittent_activity_gives_fractional_duty() {
    let mut b = Boosting::new(1);
    let active: BTreeSet<usize> = [0].into_iter().collect();
    let empty: BTreeSet<usize> = BTreeSet::new();

    for t in 1..=400u64 {
        let cols = if t % 2 == 0 { &active } else { &empty };
        b.update_duty_cycles(cols, t, 100);
    }
    assert!((b.duty_cycle(0) - 0.5).abs() < 0.1);
}

#[test]
fn test_boost_bounded_by_max() {
    let mut b = Boosting::new(4);
    let active: BTreeSet<usize> = [0].into_iter().collect();
    for t in 1..=100u64 {
        b.update_duty_cycles(&active, t, 10);
    }

    let topo = GridTopology::new(&[4]);
    b.update_boosts(&topo, 2, true, 1.5, 0.5);

    for col in 0..4 {
        assert!(b.boost(col) >= 1.0);
        assert!(b.boost(col) <= 1.5);
    }
    assert!(b.boost(1) > 1.0);
}

#[test]
fn test_unit_max_boost_never_moves_at_layer_level() {
    let mut params = LayerParams::new(&[60]);
    params.column_dimensions = vec![32];
    params.depth = 2;
    params.max_boost = 1.0;
    params.boost_active_every = 1;
    params.duty_cycle_period = 10;
    params.random_seed = 7;

    let mut layer = Layer::new(params).unwrap();

    for step in 0..30usize {
        let ff: Vec<usize> = (0..10).map(|i| (i + step) % 60).collect();
        layer.activate(&ff, &[]).unwrap();
        layer.learn().unwrap();
        layer.depolarise_distal(&[]).unwrap();

        for col in 0..32 {
            assert_eq!(layer.boost_factor(col), 1.0);
        }
    }
}

#[test]
fn test_starved_columns_boost_at_layer_level() {
    let mut params = LayerParams::new(&[40]);
    params.column_dimensions = vec![16];
    params.depth = 2;
    params.max_boost = 2.0;
    params.boost_active_every = 5;
    params.duty_cycle_period = 10;
    params.random_seed = 3;

    let mut layer = Layer::new(params).unwrap();

    // A constant input starves every column the winner shuts out.
    let ff: Vec<usize> = (0..8).collect();
    for _ in 0..20 {
        layer.activate(&ff, &[]).unwrap();
        layer.learn().unwrap();
        layer.depolarise_distal(&[]).unwrap();
    }

    let boosted = (0..16).filter(|&c| layer.boost_factor(c) > 1.0).count();
    assert!(boosted > 0);
    let capped = (0..16).all(|c| layer.boost_factor(c) <= 2.0);
    assert!(capped);
}
