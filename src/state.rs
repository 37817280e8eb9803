//! Layer state snapshots.
//!
//! Each timestep replaces whole snapshots: `activate` produces a fresh
//! [`ActiveState`], `depolarise` rolls the [`DistalState`] forward keeping the
//! previous one for punishment. [`LayerView`] is the read-only projection a
//! host observes between steps.

use crate::synapses::{Bit, CellId, ColumnId, SegPath};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Everything `activate` decides for one timestep.
#[derive(Debug, Clone, Default)]
pub struct ActiveState {
    /// Timestep this snapshot belongs to (0 before the first activate).
    pub timestep: u64,
    /// Engagement gate result.
    pub engaged: bool,
    /// True when engagement switched on this step (always, for first-level).
    pub newly_engaged: bool,
    /// Feed-forward bits presented this step.
    pub in_ff_bits: BTreeSet<Bit>,
    /// The predicted-stable subset of the feed-forward bits.
    pub in_stable_ff_bits: BTreeSet<Bit>,
    /// Columns selected by inhibition.
    pub active_cols: BTreeSet<ColumnId>,
    /// Active columns that burst (no cell had sufficient context).
    pub bursting_cols: BTreeSet<ColumnId>,
    /// All active cells.
    pub active_cells: BTreeSet<CellId>,
    /// Active cells outside bursting columns.
    pub stable_active_cells: BTreeSet<CellId>,
    /// Winner cell per active column.
    pub col_winners: BTreeMap<ColumnId, usize>,
    /// Winners elected for learning this step.
    pub learning_cells: BTreeSet<CellId>,
    /// Temporal-pooling excitation carried to the next step.
    pub tp_exc: BTreeMap<CellId, f32>,
    /// Best matching proximal segment per column, from this step's overlap.
    pub matching_ff_segs: BTreeMap<ColumnId, SegPath>,
    /// Proximal segments matching well enough to be reused by learning.
    pub well_matching_ff_segs: BTreeMap<ColumnId, SegPath>,
    /// Active cells as output bits.
    pub out_ff_bits: BTreeSet<Bit>,
    /// Stable-active cells as output bits.
    pub out_stable_ff_bits: BTreeSet<Bit>,
}

/// Everything `depolarise` decides for the following timestep.
#[derive(Debug, Clone, Default)]
pub struct DistalState {
    /// Timestep of the `activate` this prediction was computed after
    /// (0 before the first depolarise).
    pub timestep: u64,
    /// Active bits of the aligned distal source vector.
    pub distal_bits: BTreeSet<Bit>,
    /// Learnable bits of the aligned distal source vector (winner-fed).
    pub distal_lc_bits: BTreeSet<Bit>,
    /// Best segment excitation per depolarised cell.
    pub distal_exc: BTreeMap<CellId, f32>,
    /// Cells predicted to become active next step.
    pub pred_cells: BTreeSet<CellId>,
    /// Every distal segment at or above the stimulus threshold.
    pub matching_segs: BTreeMap<SegPath, f32>,
    /// Per cell, the best segment matching well enough for learning reuse.
    pub well_matching_segs: BTreeMap<CellId, SegPath>,
}

/// Read-only projection of a layer for observation and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerView {
    /// Current timestep.
    pub timestep: u64,
    /// Columns selected by inhibition this step.
    pub active_columns: Vec<ColumnId>,
    /// Active columns that burst.
    pub bursting_columns: Vec<ColumnId>,
    /// All active cells.
    pub active_cells: Vec<CellId>,
    /// Winner cell per active column.
    pub winner_cells: Vec<CellId>,
    /// Cells predicted for the next step; `None` until the first
    /// `depolarise` of the current step.
    pub predictive_cells: Option<Vec<CellId>>,
    /// The prediction that applied to the current step.
    pub prior_predictive_cells: Vec<CellId>,
    /// Feed-forward bits presented this step.
    pub in_ff_bits: Vec<Bit>,
    /// Stable subset of the feed-forward bits.
    pub in_stable_ff_bits: Vec<Bit>,
    /// Active cells as output bits.
    pub out_ff_bits: Vec<Bit>,
    /// Stable-active cells as output bits.
    pub out_stable_ff_bits: Vec<Bit>,
}
