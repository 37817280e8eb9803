//! The depolarisation engine: predicting the next step.
//!
//! Builds the aligned distal source vector from the step's own output
//! (lateral range), the motor bits and the top-down feedback bits, queries
//! the distal graph, and reduces segment excitations to per-cell
//! predictions. The matching records it saves drive the next step's
//! learning; the outgoing snapshot is preserved for punishment.

use crate::state::DistalState;
use crate::synapses::{Bit, CellId, SegPath};
use crate::Layer;
use std::collections::{BTreeMap, BTreeSet};

impl Layer {
    /// Compute the next [`DistalState`] from the current active set and the
    /// external distal inputs.
    ///
    /// Sub-range alignment of the distal source vector:
    ///
    /// ```text
    /// [0, lateral)                     this layer's cells (active / winner)
    /// [lateral, lateral+motor)         distal_ff_bits
    /// [lateral+motor, ..+topdown)      apical feedback (when enabled)
    /// ```
    pub(crate) fn depolarise_pass(
        &self,
        distal_ff_bits: &[Bit],
        apical_fb_bits: &[Bit],
        apical_fb_wc_bits: &[Bit],
    ) -> DistalState {
        let lateral = self.lateral_width;
        let motor = self.motor_width;

        let mut distal_bits: BTreeSet<Bit> = BTreeSet::new();
        let mut distal_lc_bits: BTreeSet<Bit> = BTreeSet::new();

        if self.params.lateral_synapses {
            distal_bits.extend(self.state.out_ff_bits.iter().copied());
            let depth = self.params.depth;
            distal_lc_bits.extend(
                self.state
                    .col_winners
                    .iter()
                    .map(|(&col, &ci)| col * depth + ci),
            );
        }
        for &bit in distal_ff_bits {
            distal_bits.insert(lateral + bit);
            distal_lc_bits.insert(lateral + bit);
        }
        if self.params.use_feedback {
            for &bit in apical_fb_bits {
                distal_bits.insert(lateral + motor + bit);
            }
            for &bit in apical_fb_wc_bits {
                distal_lc_bits.insert(lateral + motor + bit);
            }
        }

        let active_vec: Vec<Bit> = distal_bits.iter().copied().collect();
        let seg_exc = self
            .distal_sg
            .excitations(&active_vec, self.params.distal.stimulus_threshold);

        let mut distal_exc: BTreeMap<CellId, f32> = BTreeMap::new();
        let mut matching_segs: BTreeMap<SegPath, f32> = BTreeMap::new();
        let mut well_best: BTreeMap<CellId, (SegPath, u32)> = BTreeMap::new();
        for (&path, &e) in &seg_exc {
            let cell = (path.0, path.1);
            matching_segs.insert(path, e as f32);
            distal_exc
                .entry(cell)
                .and_modify(|v| *v = v.max(e as f32))
                .or_insert(e as f32);
            if e >= self.params.distal.new_synapse_count as u32 {
                well_best
                    .entry(cell)
                    .and_modify(|cur| {
                        if e > cur.1 || (e == cur.1 && path < cur.0) {
                            *cur = (path, e);
                        }
                    })
                    .or_insert((path, e));
            }
        }

        let pred_cells: BTreeSet<CellId> = distal_exc.keys().copied().collect();

        DistalState {
            timestep: self.state.timestep,
            distal_bits,
            distal_lc_bits,
            distal_exc,
            pred_cells,
            matching_segs,
            well_matching_segs: well_best
                .into_iter()
                .map(|(cell, (path, _))| (cell, path))
                .collect(),
        }
    }
}
