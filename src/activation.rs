//! The activation engine: one feed-forward step.
//!
//! Turns a feed-forward bit set into the step's active columns, active
//! cells, winner cells and bursting classification. The pass runs in the
//! order the data flows:
//!
//! 1. proximal segment excitation, reduced per column
//! 2. engagement gate and temporal-pooling decay
//! 3. boosted column excitation and inhibition
//! 4. within-column cell scoring against the previous prediction
//! 5. winner election, burst classification, output bits

use crate::inhibition::{global_inhibit, local_inhibit, num_active_columns};
use crate::state::ActiveState;
use crate::synapses::{Bit, CellId, ColumnId, SegPath};
use crate::util::{bit_mask, split_rng};
use crate::Layer;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl Layer {
    /// Compute the next [`ActiveState`] from one feed-forward presentation.
    pub(crate) fn activation_pass(
        &mut self,
        ff_bits: BTreeSet<Bit>,
        stable_ff_bits: BTreeSet<Bit>,
    ) -> ActiveState {
        let depth = self.params.depth;
        let n_cols = self.col_topo.size();

        // Proximal excitation, reduced to columns. Per column we keep the
        // strongest segment and, separately, any segment matching well
        // enough for learning to reuse it outright.
        let ff_vec: Vec<Bit> = ff_bits.iter().copied().collect();
        let seg_exc = self
            .proximal_sg
            .excitations(&ff_vec, self.params.proximal.stimulus_threshold);

        let mut col_exc: BTreeMap<ColumnId, f32> = BTreeMap::new();
        let mut best_ff: BTreeMap<ColumnId, (SegPath, u32)> = BTreeMap::new();
        let mut well_ff: BTreeMap<ColumnId, (SegPath, u32)> = BTreeMap::new();
        for (&path, &e) in &seg_exc {
            let col = path.0;
            col_exc
                .entry(col)
                .and_modify(|v| *v = v.max(e as f32))
                .or_insert(e as f32);
            merge_best(&mut best_ff, col, path, e);
            if e >= self.params.proximal.new_synapse_count as u32 {
                merge_best(&mut well_ff, col, path, e);
            }
        }

        // Engagement gate. First-level layers are always (newly) engaged.
        let first_level = self.params.first_level();
        let engaged = first_level
            || stable_ff_bits.len() as f32
                > self.params.stable_inbit_frac_threshold * ff_bits.len() as f32;
        let newly_engaged = first_level || (engaged && !self.state.engaged);
        if engaged != self.state.engaged && !first_level {
            debug!(
                timestep = self.state.timestep + 1,
                engaged, "engagement changed"
            );
        }

        // Temporal-pooling excitation: restart on engagement, else decay.
        let mut tp_exc: BTreeMap<CellId, f32> = if newly_engaged {
            BTreeMap::new()
        } else {
            self.state
                .tp_exc
                .iter()
                .filter_map(|(&cell, &v)| {
                    let nv = v - self.params.temporal_pooling_fall;
                    (nv > 0.0).then_some((cell, nv))
                })
                .collect()
        };

        // Column excitation: an unengaged layer only considers columns whose
        // input it could plausibly pool over. Boost multiplies before
        // inhibition.
        if !engaged {
            col_exc.retain(|col, _| well_ff.contains_key(col));
        }
        for (&col, e) in col_exc.iter_mut() {
            *e *= self.boosting.boost(col);
        }

        // Absolute cell excitation over all depth cells of excited columns.
        let w = self.params.distal_vs_proximal_weight;
        let mut cell_exc: BTreeMap<CellId, f32> = BTreeMap::new();
        for (&col, &e) in &col_exc {
            for ci in 0..depth {
                let cell = (col, ci);
                let mut v = e + tp_exc.get(&cell).copied().unwrap_or(0.0);
                if w != 0.0 {
                    if let Some(&d) = self.distal_state.distal_exc.get(&cell) {
                        v += w * d;
                    }
                }
                cell_exc.insert(cell, v);
            }
        }
        if self.params.spontaneous_activation {
            for (&cell, &d) in &self.distal_state.distal_exc {
                cell_exc
                    .entry(cell)
                    .or_insert_with(|| w * d + tp_exc.get(&cell).copied().unwrap_or(0.0));
            }
        }

        // Column selection. Under continued pooling the admitted share grows
        // from the previous active fraction, capped by the level maximum.
        let level = if newly_engaged || !engaged {
            self.params.activation_level
        } else {
            let prev_frac = self.state.active_cols.len() as f32 / n_cols as f32;
            (prev_frac + 0.5 * self.params.activation_level).min(self.params.activation_level_max)
        };
        let n_on = num_active_columns(level, n_cols);

        let mut col_abs: BTreeMap<ColumnId, f32> = BTreeMap::new();
        for (&(col, _), &v) in &cell_exc {
            col_abs
                .entry(col)
                .and_modify(|m| *m = m.max(v))
                .or_insert(v);
        }
        let active_cols = if self.params.global_inhibition {
            global_inhibit(&col_abs, n_on)
        } else {
            local_inhibit(
                &col_abs,
                &self.col_topo,
                self.inh_radius,
                self.params.inhibition_base_distance,
                n_on,
            )
        };

        // Within-column selection.
        let stim = self.params.distal.stimulus_threshold as f32;
        let bonus = (self.params.distal.learn_threshold / 2) as f32;
        let distal_mask = bit_mask(
            self.distal_sg.source_width(),
            self.distal_state.distal_bits.iter().copied(),
        );

        let mut active_cells: BTreeSet<CellId> = BTreeSet::new();
        let mut stable_active_cells: BTreeSet<CellId> = BTreeSet::new();
        let mut col_winners: BTreeMap<ColumnId, usize> = BTreeMap::new();
        let mut bursting_cols: BTreeSet<ColumnId> = BTreeSet::new();

        for &col in &active_cols {
            let prev_winner = self.state.col_winners.get(&col).copied();

            let scores: Vec<f32> = (0..depth)
                .map(|ci| {
                    let cell = (col, ci);
                    let base = if self.distal_state.pred_cells.contains(&cell) {
                        self.distal_state
                            .distal_exc
                            .get(&cell)
                            .copied()
                            .unwrap_or(stim)
                    } else if prev_winner == Some(ci) {
                        bonus
                    } else {
                        let n_segs = self.distal_sg.cell_segments(cell).len();
                        if n_segs == 0 {
                            0.0
                        } else if (0..n_segs).any(|si| {
                            self.distal_sg.seg_excitation((col, ci, si), &distal_mask, 0.0)
                                >= self.params.distal.learn_threshold
                        }) {
                            // Partial context: enough synapses would match if
                            // they were connected.
                            bonus
                        } else {
                            -(bonus * n_segs as f32)
                        }
                    };
                    base + tp_exc.get(&cell).copied().unwrap_or(0.0)
                })
                .collect();

            let max_s = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let best: Vec<usize> = (0..depth).filter(|&ci| scores[ci] == max_s).collect();
            let second = scores
                .iter()
                .copied()
                .filter(|&s| s < max_s)
                .fold(f32::NEG_INFINITY, f32::max);

            let winner = if let Some(pw) = prev_winner.filter(|pw| best.contains(pw)) {
                pw
            } else if best.len() == 1 {
                best[0]
            } else {
                let mut sub = split_rng(&mut self.rng);
                best[sub.gen_range(0..best.len())]
            };

            let col_active: Vec<usize> = if max_s < stim {
                (0..depth).collect()
            } else if max_s - second >= self.params.dominance_margin {
                best.clone()
            } else {
                (0..depth).filter(|&ci| scores[ci] >= stim).collect()
            };

            let continuing_tp = !newly_engaged && prev_winner == Some(winner);
            let is_bursting = if continuing_tp {
                col_active.len() == depth
            } else {
                !self.distal_state.pred_cells.contains(&(col, winner))
                    && !tp_exc.contains_key(&(col, winner))
            };

            col_winners.insert(col, winner);
            if is_bursting {
                bursting_cols.insert(col);
            }
            for ci in col_active {
                active_cells.insert((col, ci));
                if !is_bursting {
                    stable_active_cells.insert((col, ci));
                }
            }
        }

        // Learning cells: winners, minus cells that already won the same
        // column last step (repeat reinforcement of a pooling cell).
        let learning_cells: BTreeSet<CellId> = col_winners
            .iter()
            .filter(|&(&col, &ci)| {
                newly_engaged || self.state.col_winners.get(&col) != Some(&ci)
            })
            .map(|(&col, &ci)| (col, ci))
            .collect();

        // Next temporal-pooling excitation (higher-level layers only):
        // newly active cells are reseeded at the maximum, max-merged with
        // the decayed carry.
        if !first_level {
            for &cell in &active_cells {
                let newly_active = newly_engaged || !self.state.active_cells.contains(&cell);
                if newly_active {
                    let e = tp_exc.entry(cell).or_insert(0.0);
                    *e = e.max(self.params.temporal_pooling_max_exc);
                }
            }
        }

        let out_ff_bits: BTreeSet<Bit> = active_cells
            .iter()
            .map(|&(col, ci)| col * depth + ci)
            .collect();
        let out_stable_ff_bits: BTreeSet<Bit> = stable_active_cells
            .iter()
            .map(|&(col, ci)| col * depth + ci)
            .collect();

        ActiveState {
            timestep: self.state.timestep + 1,
            engaged,
            newly_engaged,
            in_ff_bits: ff_bits,
            in_stable_ff_bits: stable_ff_bits,
            active_cols,
            bursting_cols,
            active_cells,
            stable_active_cells,
            col_winners,
            learning_cells,
            tp_exc,
            matching_ff_segs: best_ff.into_iter().map(|(c, (p, _))| (c, p)).collect(),
            well_matching_ff_segs: well_ff.into_iter().map(|(c, (p, _))| (c, p)).collect(),
            out_ff_bits,
            out_stable_ff_bits,
        }
    }
}

/// Keep the strongest segment per column; ties break toward the lower path.
fn merge_best(
    map: &mut BTreeMap<ColumnId, (SegPath, u32)>,
    col: ColumnId,
    path: SegPath,
    e: u32,
) {
    map.entry(col)
        .and_modify(|cur| {
            if e > cur.1 || (e == cur.1 && path < cur.0) {
                *cur = (path, e);
            }
        })
        .or_insert((path, e));
}
