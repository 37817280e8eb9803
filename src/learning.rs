//! The learning engine: segment-update planning and application.
//!
//! Runs after activation, against the prediction captured by the previous
//! depolarise. For every learning cell it either reinforces a well-matching
//! segment, reuses the best partially-matching segment, or grows a new one
//! (culling the weakest slot at the segment cap). Mis-predicting segments
//! are punished. Engaged layers additionally learn proximally on every
//! active column, with a reinforce pass for stable input bits.
//!
//! Updates apply in a fixed order: distal learn, distal punish, proximal
//! learn, proximal stable-reinforce. Duty cycles, boost factors and the
//! inhibition radius update on their own schedules afterwards.

use crate::error::Result;
use crate::inhibition;
use crate::params::{DistalParams, ProximalParams};
use crate::synapses::{Bit, CellId, SegPath, SegUpdate, SynapseGraph};
use crate::util::{bit_mask, sample_distinct, split_rng};
use crate::Layer;
use bitvec::vec::BitVec;
use rand::rngs::StdRng;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// The slice of segment parameters the planning procedure needs; proximal
/// and distal learning share the procedure with different values.
struct SegCfg {
    max_segments: usize,
    max_synapses: usize,
    new_synapse_count: usize,
    learn_threshold: u32,
}

impl From<&ProximalParams> for SegCfg {
    fn from(p: &ProximalParams) -> Self {
        Self {
            max_segments: p.max_segments,
            max_synapses: p.max_synapse_count,
            new_synapse_count: p.new_synapse_count,
            learn_threshold: p.learn_threshold,
        }
    }
}

impl From<&DistalParams> for SegCfg {
    fn from(p: &DistalParams) -> Self {
        Self {
            max_segments: p.max_segments,
            max_synapses: p.max_synapse_count,
            new_synapse_count: p.new_synapse_count,
            learn_threshold: p.learn_threshold,
        }
    }
}

impl Layer {
    /// Plan and apply the step's learning, then run the housekeeping
    /// schedules.
    pub(crate) fn learning_pass(&mut self) -> Result<()> {
        // Distal learning against the previous step's active sources.
        let distal_learnable: Vec<Bit> =
            self.distal_state.distal_lc_bits.iter().copied().collect();
        let distal_mask = bit_mask(
            self.distal_sg.source_width(),
            self.distal_state.distal_bits.iter().copied(),
        );
        let cfg = SegCfg::from(&self.params.distal);

        let mut distal_ups: Vec<SegUpdate> = Vec::new();
        for &cell in &self.state.learning_cells {
            let well = self.distal_state.well_matching_segs.get(&cell).copied();
            if let Some(up) = plan_cell_learning(
                &self.distal_sg,
                cell,
                well,
                &distal_mask,
                &distal_learnable,
                &cfg,
                &mut self.rng,
            ) {
                distal_ups.push(up);
            }
        }

        // Punishment: cells predicted two steps back that neither stayed
        // predicted nor became active.
        let mut punish_ups: Vec<SegUpdate> = Vec::new();
        if self.params.distal.punish {
            let punished: BTreeSet<CellId> = self
                .prior_distal_state
                .pred_cells
                .iter()
                .filter(|c| {
                    !self.distal_state.pred_cells.contains(c)
                        && !self.state.active_cells.contains(c)
                })
                .copied()
                .collect();
            for (&path, _) in &self.prior_distal_state.matching_segs {
                if punished.contains(&(path.0, path.1)) {
                    punish_ups.push(SegUpdate::punish(path));
                }
            }
        }

        // Proximal learning only applies while the layer is engaged.
        let mut prox_ups: Vec<SegUpdate> = Vec::new();
        let mut reinforce_ups: Vec<SegUpdate> = Vec::new();
        if self.state.engaged {
            let n_in = self.in_topo.size();
            let ff_mask = bit_mask(n_in, self.state.in_ff_bits.iter().copied());
            let ff_learnable: Vec<Bit> = if self.params.first_level() {
                self.state.in_ff_bits.iter().copied().collect()
            } else {
                self.state.in_stable_ff_bits.iter().copied().collect()
            };
            let cfg = SegCfg::from(&self.params.proximal);

            for &col in &self.state.active_cols {
                let well = self.state.well_matching_ff_segs.get(&col).copied();
                if let Some(up) = plan_cell_learning(
                    &self.proximal_sg,
                    (col, 0),
                    well,
                    &ff_mask,
                    &ff_learnable,
                    &cfg,
                    &mut self.rng,
                ) {
                    prox_ups.push(up);
                }
            }

            if self.params.proximal.perm_stable_inc > self.params.proximal.perm_inc {
                reinforce_ups = prox_ups
                    .iter()
                    .map(|up| SegUpdate::reinforce(up.target))
                    .collect();
            }
        }

        // Apply in the fixed order.
        let d = &self.params.distal;
        self.distal_sg
            .bulk_learn(&distal_ups, &distal_mask, d.perm_inc, d.perm_dec, d.perm_init)?;

        let prior_mask = bit_mask(
            self.distal_sg.source_width(),
            self.prior_distal_state.distal_bits.iter().copied(),
        );
        let (punish_dec, punish_init) = (d.perm_punish, d.perm_init);
        self.distal_sg
            .bulk_learn(&punish_ups, &prior_mask, 0.0, punish_dec, punish_init)?;

        let px = &self.params.proximal;
        let (pinc, pdec, pinit, stable_inc) =
            (px.perm_inc, px.perm_dec, px.perm_init, px.perm_stable_inc);
        let ff_mask = bit_mask(self.in_topo.size(), self.state.in_ff_bits.iter().copied());
        self.proximal_sg
            .bulk_learn(&prox_ups, &ff_mask, pinc, pdec, pinit)?;

        let stable_mask = bit_mask(
            self.in_topo.size(),
            self.state.in_stable_ff_bits.iter().copied(),
        );
        self.proximal_sg.bulk_learn(
            &reinforce_ups,
            &stable_mask,
            stable_inc - pinc,
            pdec,
            pinit,
        )?;

        // Housekeeping schedules.
        let t = self.state.timestep;
        self.boosting
            .update_duty_cycles(&self.state.active_cols, t, self.params.duty_cycle_period);
        if t % self.params.boost_active_every == 0 {
            self.boosting.update_boosts(
                &self.col_topo,
                self.inh_radius,
                self.params.global_inhibition,
                self.params.max_boost,
                self.params.boost_active_duty_ratio,
            );
            debug!(timestep = t, "boost factors recomputed");
        }
        if t % self.params.inh_radius_every == 0 {
            self.inh_radius = inhibition::inhibition_radius(
                &self.proximal_sg,
                &self.col_topo,
                &self.in_topo,
            );
            debug!(
                timestep = t,
                radius = self.inh_radius,
                "inhibition radius recomputed"
            );
        }

        Ok(())
    }
}

/// Plan one cell's segment update.
///
/// Preference order: the well-matching segment recorded by the previous
/// depolarise, then the best segment matching the active sources with every
/// synapse counted, then a fresh segment (culling the weakest slot when the
/// cell is at its segment cap). Returns `None` when a fresh segment cannot
/// reach the learn threshold with the sources available.
fn plan_cell_learning(
    sg: &SynapseGraph,
    cell: CellId,
    well_matching: Option<SegPath>,
    active_mask: &BitVec,
    learnable: &[Bit],
    cfg: &SegCfg,
    rng: &mut StdRng,
) -> Option<SegUpdate> {
    if let Some(path) = well_matching {
        return Some(SegUpdate::learn(path, Vec::new(), Vec::new()));
    }

    let n_segs = sg.cell_segments(cell).len();
    let mut matched: Option<(usize, u32)> = None;
    for si in 0..n_segs {
        let e = sg.seg_excitation((cell.0, cell.1, si), active_mask, 0.0);
        if e >= cfg.learn_threshold && matched.map_or(true, |(_, me)| e > me) {
            matched = Some((si, e));
        }
    }

    let (si, grow_n, new_seg) = match matched {
        Some((si, e)) => (si, cfg.new_synapse_count.saturating_sub(e as usize), false),
        None => (new_segment_id(sg, cell, cfg), cfg.new_synapse_count, true),
    };
    let target = (cell.0, cell.1, si);

    let mut sub = split_rng(rng);
    let mut grow = sample_distinct(learnable, grow_n, &mut sub);
    if let Some(seg) = sg.in_synapses(target) {
        grow.retain(|b| !seg.contains_key(b));
    }

    if new_seg && (grow.len() as u32) < cfg.learn_threshold {
        return None;
    }

    let mut die: Vec<Bit> = Vec::new();
    if new_seg {
        grow.truncate(cfg.max_synapses);
        if let Some(seg) = sg.in_synapses(target) {
            // Replacing a culled slot: everything it held dies.
            die = seg.keys().copied().collect();
            die.sort_unstable();
        }
    } else if let Some(seg) = sg.in_synapses(target) {
        let overflow = (seg.len() + grow.len()).saturating_sub(cfg.max_synapses);
        if overflow > 0 {
            let mut by_perm: Vec<(Bit, f32)> = seg.iter().map(|(&b, &p)| (b, p)).collect();
            by_perm.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
            die = by_perm.into_iter().take(overflow).map(|(b, _)| b).collect();
            die.sort_unstable();

            let keep = seg.len() - die.len();
            if grow.len() > cfg.max_synapses - keep {
                grow.truncate(cfg.max_synapses - keep);
            }
        }
    }

    Some(SegUpdate::learn(target, grow, die))
}

/// Segment index for a fresh segment: the append slot below the cap, else
/// the slot with the fewest connected synapses (ties: fewest total, then
/// lowest index).
fn new_segment_id(sg: &SynapseGraph, cell: CellId, cfg: &SegCfg) -> usize {
    let segs = sg.cell_segments(cell);
    if segs.len() < cfg.max_segments {
        return segs.len();
    }

    let pcon = sg.perm_connected();
    (0..segs.len())
        .min_by_key(|&si| {
            let seg = &segs[si];
            let connected = seg.values().filter(|&&p| p >= pcon).count();
            (connected, seg.len(), si)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn cfg() -> SegCfg {
        SegCfg {
            max_segments: 2,
            max_synapses: 8,
            new_synapse_count: 4,
            learn_threshold: 2,
        }
    }

    #[test]
    fn test_well_matching_reused_without_growth() {
        let sg = SynapseGraph::new(32, 2, 8, 0.2);
        let mut rng = StdRng::seed_from_u64(1);

        let up = plan_cell_learning(
            &sg,
            (0, 0),
            Some((0, 0, 1)),
            &bit_mask(32, std::iter::empty()),
            &[1, 2, 3],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(up.target, (0, 0, 1));
        assert!(up.grow_sources.is_empty());
        assert!(up.die_sources.is_empty());
    }

    #[test]
    fn test_best_match_reuse_tops_up_synapses() {
        let mut sg = SynapseGraph::new(32, 2, 8, 0.2);
        // Two of four target synapses match; permanence is irrelevant here.
        sg.seed_segment((0, 0), [(1, 0.01), (2, 0.01), (9, 0.5)]);
        let mut rng = StdRng::seed_from_u64(1);

        let up = plan_cell_learning(
            &sg,
            (0, 0),
            None,
            &bit_mask(32, [1, 2]),
            &[20, 21, 22, 23],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(up.target, (0, 0, 0));
        // grow_n = new_synapse_count - activity = 2
        assert!(up.grow_sources.len() <= 2);
        assert!(up.grow_sources.iter().all(|b| (20..=23).contains(b)));
    }

    #[test]
    fn test_new_segment_below_threshold_is_skipped() {
        let sg = SynapseGraph::new(32, 2, 8, 0.2);
        let mut rng = StdRng::seed_from_u64(1);

        let up = plan_cell_learning(
            &sg,
            (0, 0),
            None,
            &bit_mask(32, std::iter::empty()),
            &[5], // one learnable source < learn_threshold 2
            &cfg(),
            &mut rng,
        );
        assert!(up.is_none());
    }

    #[test]
    fn test_new_segment_appends_below_cap() {
        let mut sg = SynapseGraph::new(32, 2, 8, 0.2);
        sg.seed_segment((0, 0), [(1, 0.5)]);
        let mut rng = StdRng::seed_from_u64(1);

        let up = plan_cell_learning(
            &sg,
            (0, 0),
            None,
            &bit_mask(32, std::iter::empty()),
            &[10, 11, 12, 13, 14, 15],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(up.target.2, 1);
        assert!(up.die_sources.is_empty());
    }

    #[test]
    fn test_cull_picks_fewest_connected() {
        let mut sg = SynapseGraph::new(32, 2, 8, 0.2);
        sg.seed_segment((0, 0), [(1, 0.5), (2, 0.5)]);
        sg.seed_segment((0, 0), [(3, 0.05), (4, 0.05), (5, 0.05)]);

        assert_eq!(new_segment_id(&sg, (0, 0), &cfg()), 1);
    }

    #[test]
    fn test_cull_emits_die_for_old_synapses() {
        let mut sg = SynapseGraph::new(32, 2, 8, 0.2);
        sg.seed_segment((0, 0), [(1, 0.5), (2, 0.5)]);
        sg.seed_segment((0, 0), [(3, 0.05), (4, 0.05)]);
        let mut rng = StdRng::seed_from_u64(1);

        let up = plan_cell_learning(
            &sg,
            (0, 0),
            None,
            &bit_mask(32, std::iter::empty()),
            &[10, 11, 12, 13, 14, 15],
            &cfg(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(up.target.2, 1);
        assert_eq!(up.die_sources, vec![3, 4]);
    }

    #[test]
    fn test_overflow_die_trims_lowest_permanence() {
        let mut sg = SynapseGraph::new(64, 2, 4, 0.2);
        sg.seed_segment((0, 0), [(1, 0.9), (2, 0.1), (3, 0.8)]);
        let mut rng = StdRng::seed_from_u64(1);

        let tight = SegCfg {
            max_segments: 2,
            max_synapses: 4,
            new_synapse_count: 5,
            learn_threshold: 2,
        };

        // Segment matches (activity 2) so it is reused; growth would push it
        // past the cap and the weakest synapses must make room.
        let up = plan_cell_learning(
            &sg,
            (0, 0),
            None,
            &bit_mask(64, [1, 3]),
            &[30, 31, 32, 33, 34, 35, 36, 37],
            &tight,
            &mut rng,
        )
        .unwrap();

        let total = 3 - up.die_sources.len() + up.grow_sources.len();
        assert!(total <= 4);
        if !up.die_sources.is_empty() {
            assert_eq!(up.die_sources[0], 2);
        }
    }
}
