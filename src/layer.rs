//! The cortical layer facade.
//!
//! A [`Layer`] owns the two synapse graphs, the active-state snapshot and the
//! two distal-state snapshots, the boosting state and the random stream. The
//! host drives it with three named transitions per timestep:
//!
//! ```text
//! activate(ff_bits, stable_ff_bits) -> learn() -> depolarise(distal, apical, apical_wc)
//! ```
//!
//! Each transition consumes the state the previous one captured: `learn`
//! observes the activation of the current step and the prediction made at
//! the end of the previous step; `depolarise` rolls the distal state forward
//! and keeps the outgoing snapshot for punishment.
//!
//! # Examples
//!
//! ```
//! use cortical::{Layer, LayerParams};
//!
//! let mut params = LayerParams::new(&[50]);
//! params.column_dimensions = vec![16];
//! params.depth = 4;
//!
//! let mut layer = Layer::new(params).unwrap();
//! let ff: Vec<usize> = (0..10).collect();
//!
//! layer.activate(&ff, &[]).unwrap();
//! layer.learn().unwrap();
//! layer.depolarise_distal(&[]).unwrap();
//!
//! assert_eq!(layer.timestep(), 1);
//! assert!(layer.view().predictive_cells.is_some());
//! ```

use crate::boosting::Boosting;
use crate::error::{CorticalError, Result};
use crate::inhibition;
use crate::params::LayerParams;
use crate::state::{ActiveState, DistalState, LayerView};
use crate::synapses::{Bit, CellId, SynapseGraph};
use crate::topology::GridTopology;
use crate::util::{shuffle_indices, split_rng};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::trace;

/// Which part of the layer's carried context to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Break {
    /// Clear the distal state: no predictions and no distal learning until
    /// the next depolarise.
    Tm,
    /// Clear the temporal-pooling excitation.
    Tp,
    /// Clear the prior winners so the next step elects winners afresh.
    Winners,
}

/// One cortical layer: activation, learning and depolarisation over a
/// columnar cell grid.
#[derive(Debug)]
pub struct Layer {
    pub(crate) params: LayerParams,
    pub(crate) col_topo: GridTopology,
    pub(crate) in_topo: GridTopology,
    pub(crate) proximal_sg: SynapseGraph,
    pub(crate) distal_sg: SynapseGraph,
    pub(crate) state: ActiveState,
    pub(crate) distal_state: DistalState,
    pub(crate) prior_distal_state: DistalState,
    pub(crate) boosting: Boosting,
    pub(crate) inh_radius: usize,
    pub(crate) rng: StdRng,
    pub(crate) lateral_width: usize,
    pub(crate) motor_width: usize,
    pub(crate) topdown_width: usize,
}

impl Layer {
    /// Build a layer from a validated parameter set and seed its proximal
    /// receptive fields.
    pub fn new(params: LayerParams) -> Result<Self> {
        params.validate()?;

        let col_topo = GridTopology::new(&params.column_dimensions);
        let in_topo = GridTopology::new(&params.input_dimensions);
        let n_cols = col_topo.size();
        let n_in = in_topo.size();
        let depth = params.depth;

        let lateral_width = if params.lateral_synapses {
            n_cols * depth
        } else {
            0
        };
        let motor_width: usize = params.distal_motor_dimensions.iter().product();
        let topdown_width: usize = params.distal_topdown_dimensions.iter().product();
        let distal_width = lateral_width + motor_width + topdown_width;

        let proximal_sg = SynapseGraph::new(
            n_in,
            params.proximal.max_segments,
            params.proximal.max_synapse_count,
            params.proximal.perm_connected,
        );
        let distal_sg = SynapseGraph::new(
            distal_width,
            params.distal.max_segments,
            params.distal.max_synapse_count,
            params.distal.perm_connected,
        );

        let mut layer = Self {
            boosting: Boosting::new(n_cols),
            state: ActiveState::default(),
            distal_state: DistalState::default(),
            prior_distal_state: DistalState::default(),
            rng: StdRng::seed_from_u64(params.random_seed),
            inh_radius: 1,
            proximal_sg,
            distal_sg,
            col_topo,
            in_topo,
            lateral_width,
            motor_width,
            topdown_width,
            params,
        };

        layer.seed_proximal_fields();
        layer.inh_radius =
            inhibition::inhibition_radius(&layer.proximal_sg, &layer.col_topo, &layer.in_topo);
        Ok(layer)
    }

    /// Seed segment 0 of every column with synapses sampled from its
    /// potential pool in input space.
    fn seed_proximal_fields(&mut self) {
        let p = &self.params.proximal;
        let n_cols = self.col_topo.size();
        let n_in = self.in_topo.size();
        let radius = (p.ff_potential_radius * self.in_topo.max_dimension() as f32).ceil() as usize;

        for col in 0..n_cols {
            // Column centre projected into input space.
            let centre = (col * n_in / n_cols).min(n_in - 1);
            let mut pool = self.in_topo.neighbours(centre, radius, 0);
            pool.push(centre);
            pool.sort_unstable();

            let n_seed = ((pool.len() as f32 * p.ff_init_frac).round() as usize)
                .min(p.max_synapse_count)
                .min(pool.len());

            let mut sub = split_rng(&mut self.rng);
            shuffle_indices(&mut pool, &mut sub);

            let lo = p.ff_perm_init_lo;
            let hi = p.ff_perm_init_hi;
            let synapses: Vec<(Bit, f32)> = pool
                .into_iter()
                .take(n_seed)
                .map(|bit| (bit, lo + sub.gen::<f32>() * (hi - lo)))
                .collect();
            self.proximal_sg.seed_segment((col, 0), synapses);
        }
    }

    /// Present one feed-forward input and select the step's active set.
    ///
    /// `stable_ff_bits` is the predicted-stable subset of `ff_bits` and must
    /// be a subset of it. Advances the timestep by exactly one.
    pub fn activate(&mut self, ff_bits: &[Bit], stable_ff_bits: &[Bit]) -> Result<()> {
        let n_in = self.in_topo.size();
        let ff: BTreeSet<Bit> = ff_bits.iter().copied().collect();
        let stable: BTreeSet<Bit> = stable_ff_bits.iter().copied().collect();

        for &bit in &ff {
            if bit >= n_in {
                return Err(CorticalError::BitOutOfRange { bit, width: n_in });
            }
        }
        for &bit in &stable {
            if !ff.contains(&bit) {
                return Err(CorticalError::StableBitNotSubset { bit });
            }
        }

        self.state = self.activation_pass(ff, stable);
        trace!(
            timestep = self.state.timestep,
            active_columns = self.state.active_cols.len(),
            bursting = self.state.bursting_cols.len(),
            engaged = self.state.engaged,
            "activated"
        );
        Ok(())
    }

    /// Apply the step's learning: distal reinforcement and growth, distal
    /// punishment, proximal learning, and the stable-input reinforce pass,
    /// followed by duty-cycle, boost and inhibition-radius housekeeping.
    pub fn learn(&mut self) -> Result<()> {
        if self.state.timestep == 0 {
            return Err(CorticalError::NotActivated { op: "learn" });
        }
        self.learning_pass()
    }

    /// Depolarise cells for the next step from the current active set plus
    /// motor and top-down feedback bits.
    ///
    /// The distal source vector aligns three sub-ranges: lateral (this
    /// layer's own cells), motor (`distal_ff_bits`) and top-down
    /// (`apical_fb_bits`, winner-fed via `apical_fb_wc_bits`).
    pub fn depolarise(
        &mut self,
        distal_ff_bits: &[Bit],
        apical_fb_bits: &[Bit],
        apical_fb_wc_bits: &[Bit],
    ) -> Result<()> {
        if self.state.timestep == 0 {
            return Err(CorticalError::NotActivated { op: "depolarise" });
        }
        for &bit in distal_ff_bits {
            if bit >= self.motor_width {
                return Err(CorticalError::BitOutOfRange {
                    bit,
                    width: self.motor_width,
                });
            }
        }
        if self.params.use_feedback {
            for &bit in apical_fb_bits.iter().chain(apical_fb_wc_bits) {
                if bit >= self.topdown_width {
                    return Err(CorticalError::BitOutOfRange {
                        bit,
                        width: self.topdown_width,
                    });
                }
            }
        }

        let next = self.depolarise_pass(distal_ff_bits, apical_fb_bits, apical_fb_wc_bits);
        self.prior_distal_state = std::mem::replace(&mut self.distal_state, next);
        trace!(
            timestep = self.state.timestep,
            predicted = self.distal_state.pred_cells.len(),
            "depolarised"
        );
        Ok(())
    }

    /// Single-input depolarise: lateral context only, apical inputs empty.
    pub fn depolarise_distal(&mut self, distal_ff_bits: &[Bit]) -> Result<()> {
        self.depolarise(distal_ff_bits, &[], &[])
    }

    /// Clear part of the layer's carried context.
    pub fn interrupt(&mut self, mode: Break) {
        match mode {
            Break::Tm => {
                self.distal_state = DistalState::default();
                self.prior_distal_state = DistalState::default();
            }
            Break::Tp => {
                self.state.tp_exc.clear();
            }
            Break::Winners => {
                self.state.col_winners.clear();
            }
        }
    }

    /// Read-only projection of the current step.
    pub fn view(&self) -> LayerView {
        let depolarised_this_step =
            self.state.timestep > 0 && self.distal_state.timestep == self.state.timestep;

        let (predictive, prior_predictive) = if depolarised_this_step {
            (
                Some(self.distal_state.pred_cells.iter().copied().collect()),
                self.prior_distal_state.pred_cells.iter().copied().collect(),
            )
        } else {
            (None, self.distal_state.pred_cells.iter().copied().collect())
        };

        LayerView {
            timestep: self.state.timestep,
            active_columns: self.state.active_cols.iter().copied().collect(),
            bursting_columns: self.state.bursting_cols.iter().copied().collect(),
            active_cells: self.state.active_cells.iter().copied().collect(),
            winner_cells: self
                .state
                .col_winners
                .iter()
                .map(|(&col, &ci)| (col, ci))
                .collect(),
            predictive_cells: predictive,
            prior_predictive_cells: prior_predictive,
            in_ff_bits: self.state.in_ff_bits.iter().copied().collect(),
            in_stable_ff_bits: self.state.in_stable_ff_bits.iter().copied().collect(),
            out_ff_bits: self.state.out_ff_bits.iter().copied().collect(),
            out_stable_ff_bits: self.state.out_stable_ff_bits.iter().copied().collect(),
        }
    }

    /// Fraction of this step's active columns that burst (0.0 = fully
    /// predicted, 1.0 = fully surprised).
    pub fn anomaly_score(&self) -> f32 {
        if self.state.active_cols.is_empty() {
            0.0
        } else {
            self.state.bursting_cols.len() as f32 / self.state.active_cols.len() as f32
        }
    }

    /// Current timestep (0 before the first activate).
    #[inline]
    pub fn timestep(&self) -> u64 {
        self.state.timestep
    }

    /// Whether the layer was engaged on the current step.
    #[inline]
    pub fn engaged(&self) -> bool {
        self.state.engaged
    }

    /// Whether engagement switched on this step.
    #[inline]
    pub fn newly_engaged(&self) -> bool {
        self.state.newly_engaged
    }

    /// Current temporal-pooling excitation, sorted by cell.
    pub fn temporal_pooling(&self) -> Vec<(CellId, f32)> {
        self.state.tp_exc.iter().map(|(&c, &v)| (c, v)).collect()
    }

    /// Number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.col_topo.size()
    }

    /// Cells per column.
    #[inline]
    pub fn depth(&self) -> usize {
        self.params.depth
    }

    /// Total cell count.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.num_columns() * self.depth()
    }

    /// The layer's parameter set.
    #[inline]
    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    /// The proximal synapse graph (read-only).
    #[inline]
    pub fn proximal_graph(&self) -> &SynapseGraph {
        &self.proximal_sg
    }

    /// The distal synapse graph (read-only).
    #[inline]
    pub fn distal_graph(&self) -> &SynapseGraph {
        &self.distal_sg
    }

    /// Current inhibition radius.
    #[inline]
    pub fn inhibition_radius(&self) -> usize {
        self.inh_radius
    }

    /// Boost factor of one column.
    #[inline]
    pub fn boost_factor(&self, col: usize) -> f32 {
        self.boosting.boost(col)
    }

    /// Active duty cycle of one column.
    #[inline]
    pub fn duty_cycle(&self, col: usize) -> f32 {
        self.boosting.duty_cycle(col)
    }

    /// Output bit id of a cell.
    #[inline]
    pub fn cell_bit(&self, cell: CellId) -> Bit {
        cell.0 * self.params.depth + cell.1
    }

    /// Cell behind an output bit id (inverse of [`Layer::cell_bit`]).
    #[inline]
    pub fn source_of_bit(&self, bit: Bit) -> CellId {
        (bit / self.params.depth, bit % self.params.depth)
    }

    /// Estimate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        let mut bytes = std::mem::size_of::<Self>();
        bytes += self.proximal_sg.memory_usage();
        bytes += self.distal_sg.memory_usage();
        bytes += self.num_columns() * 2 * std::mem::size_of::<f32>();
        bytes += self.state.active_cells.len() * std::mem::size_of::<CellId>();
        bytes += self.distal_state.distal_bits.len() * std::mem::size_of::<Bit>();
        bytes
    }
}
