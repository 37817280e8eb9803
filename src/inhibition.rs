//! Column inhibition: global and local top-N selection.
//!
//! Inhibition reduces per-column excitation to a small active set. Global
//! inhibition ranks every column against every other; local inhibition only
//! lets a column be shut out by stronger already-admitted columns within its
//! inhibition radius. Ties always break toward the lower column id so a
//! given excitation map selects the same columns on every run.

use crate::synapses::{ColumnId, SynapseGraph};
use crate::topology::GridTopology;
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Target number of active columns for an activation level.
#[inline]
pub fn num_active_columns(activation_level: f32, n_columns: usize) -> usize {
    ((activation_level * n_columns as f32).round() as usize).max(1)
}

fn by_excitation_desc(a: &(ColumnId, f32), b: &(ColumnId, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then(a.0.cmp(&b.0))
}

/// Select the top `n_on` columns by excitation.
pub fn global_inhibit(exc: &BTreeMap<ColumnId, f32>, n_on: usize) -> BTreeSet<ColumnId> {
    exc.iter()
        .map(|(&c, &e)| (c, e))
        .sorted_by(by_excitation_desc)
        .take(n_on)
        .map(|(c, _)| c)
        .collect()
}

/// Select up to `n_on` columns, letting stronger admitted neighbours within
/// the inhibition radius shut out weaker candidates.
///
/// Neighbours closer than `base_distance` are too near to compete and never
/// block each other.
pub fn local_inhibit(
    exc: &BTreeMap<ColumnId, f32>,
    topo: &GridTopology,
    inh_radius: usize,
    base_distance: usize,
    n_on: usize,
) -> BTreeSet<ColumnId> {
    let mut admitted: Vec<(ColumnId, f32, Vec<usize>)> = Vec::with_capacity(n_on);

    for (col, e) in exc.iter().map(|(&c, &e)| (c, e)).sorted_by(by_excitation_desc) {
        if admitted.len() >= n_on {
            break;
        }
        let coord = topo.coord_of(col);
        let blocked = admitted.iter().any(|(_, ae, acoord)| {
            let dist = topo.coord_distance(&coord, acoord);
            dist > base_distance && dist <= inh_radius && *ae > e
        });
        if !blocked {
            admitted.push((col, e, coord));
        }
    }

    admitted.into_iter().map(|(c, _, _)| c).collect()
}

/// Estimate the inhibition radius from the proximal receptive fields.
///
/// Takes each column's connected proximal sources, measures their average
/// per-dimension extent in input space, scales that span onto the column
/// grid, and halves it (a span covers both sides of the centre). Columns
/// without connected synapses contribute nothing; the radius never drops
/// below 1.
pub fn inhibition_radius(
    proximal: &SynapseGraph,
    col_topo: &GridTopology,
    in_topo: &GridTopology,
) -> usize {
    let mut total_span = 0.0_f64;
    let mut n_spans = 0usize;

    for col in 0..col_topo.size() {
        let mut sources: Vec<usize> = Vec::new();
        for si in 0..proximal.cell_segments((col, 0)).len() {
            sources.extend(proximal.sources_connected_to((col, 0, si)));
        }
        if sources.is_empty() {
            continue;
        }

        let n_dims = in_topo.dimensions().len();
        let mut lo = vec![usize::MAX; n_dims];
        let mut hi = vec![0usize; n_dims];
        for &src in &sources {
            let coord = in_topo.coord_of(src);
            for d in 0..n_dims {
                lo[d] = lo[d].min(coord[d]);
                hi[d] = hi[d].max(coord[d]);
            }
        }

        let span: f64 = (0..n_dims)
            .map(|d| (hi[d] - lo[d] + 1) as f64)
            .sum::<f64>()
            / n_dims as f64;
        total_span += span;
        n_spans += 1;
    }

    if n_spans == 0 {
        return 1;
    }

    let avg_span = total_span / n_spans as f64;
    let scale = col_topo.max_dimension() as f64 / in_topo.max_dimension() as f64;
    ((avg_span * scale / 2.0).round() as usize).max(1)
}
