//! Layer parameter set.
//!
//! All recognised keys with their defaults, grouped the way the layer
//! consumes them: structural shape, the proximal and distal synapse
//! parameter maps, inhibition/boosting controls, and context blending.
//!
//! Parameter sets round-trip through JSON so hosts can store layer
//! configurations alongside their own. Any subset of keys deserializes
//! against the defaults:
//!
//! ```
//! use cortical::LayerParams;
//!
//! let params = LayerParams::from_json(r#"{
//!     "input_dimensions": [512],
//!     "column_dimensions": [256],
//!     "depth": 8
//! }"#).unwrap();
//!
//! assert_eq!(params.depth, 8);
//! assert_eq!(params.proximal.max_segments, 1);
//! ```

use crate::error::{CorticalError, Result};
use serde::{Deserialize, Serialize};

/// Proximal (feed-forward) segment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximalParams {
    /// Maximum proximal segments per column. 1 marks a first-level layer.
    pub max_segments: usize,
    /// Maximum synapses on one segment.
    pub max_synapse_count: usize,
    /// Target synapse count when growing onto a segment.
    pub new_synapse_count: usize,
    /// Minimum connected-synapse overlap for a segment to excite its column.
    pub stimulus_threshold: u32,
    /// Minimum full-synapse overlap for a segment to be reused in learning.
    pub learn_threshold: u32,
    /// Permanence increment on reinforcement.
    pub perm_inc: f32,
    /// Permanence increment for stable (predicted) input bits.
    pub perm_stable_inc: f32,
    /// Permanence decrement on decay.
    pub perm_dec: f32,
    /// Permanence at or above which a synapse is connected.
    pub perm_connected: f32,
    /// Permanence of a freshly grown synapse.
    pub perm_init: f32,
    /// Receptive-field radius as a fraction of the longest input dimension.
    pub ff_potential_radius: f32,
    /// Fraction of the potential pool seeded as synapses at construction.
    pub ff_init_frac: f32,
    /// Upper bound of the seeded permanence range.
    pub ff_perm_init_hi: f32,
    /// Lower bound of the seeded permanence range.
    pub ff_perm_init_lo: f32,
}

impl Default for ProximalParams {
    fn default() -> Self {
        Self {
            max_segments: 1,
            max_synapse_count: 300,
            new_synapse_count: 12,
            stimulus_threshold: 2,
            learn_threshold: 7,
            perm_inc: 0.04,
            perm_stable_inc: 0.15,
            perm_dec: 0.01,
            perm_connected: 0.20,
            perm_init: 0.16,
            ff_potential_radius: 1.0,
            ff_init_frac: 0.25,
            ff_perm_init_hi: 0.25,
            ff_perm_init_lo: 0.10,
        }
    }
}

/// Distal (lateral context) segment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistalParams {
    /// Maximum distal segments per cell.
    pub max_segments: usize,
    /// Maximum synapses on one segment.
    pub max_synapse_count: usize,
    /// Target synapse count when growing onto a segment.
    pub new_synapse_count: usize,
    /// Minimum connected-synapse overlap for a segment to depolarise its cell.
    pub stimulus_threshold: u32,
    /// Minimum full-synapse overlap for a segment to be reused in learning.
    pub learn_threshold: u32,
    /// Permanence increment on reinforcement.
    pub perm_inc: f32,
    /// Permanence increment for stable input bits.
    pub perm_stable_inc: f32,
    /// Permanence decrement on decay.
    pub perm_dec: f32,
    /// Permanence decrement applied to mis-predicting segments.
    pub perm_punish: f32,
    /// Permanence at or above which a synapse is connected.
    pub perm_connected: f32,
    /// Permanence of a freshly grown synapse.
    pub perm_init: f32,
    /// Whether mis-predicting segments are punished.
    pub punish: bool,
}

impl Default for DistalParams {
    fn default() -> Self {
        Self {
            max_segments: 5,
            max_synapse_count: 22,
            new_synapse_count: 12,
            stimulus_threshold: 9,
            learn_threshold: 7,
            perm_inc: 0.05,
            perm_stable_inc: 0.05,
            perm_dec: 0.01,
            perm_punish: 0.002,
            perm_connected: 0.20,
            perm_init: 0.16,
            punish: true,
        }
    }
}

/// Complete parameter set for one cortical layer.
///
/// `input_dimensions` is the only required key; everything else carries the
/// documented default. Validation happens in [`crate::Layer::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParams {
    /// Feed-forward input grid dimensions (required, all positive).
    pub input_dimensions: Vec<usize>,
    /// Column grid dimensions.
    pub column_dimensions: Vec<usize>,
    /// Cells per column.
    pub depth: usize,
    /// Extra distal input grid fed by motor/efference bits.
    pub distal_motor_dimensions: Vec<usize>,
    /// Extra distal input grid fed by top-down feedback bits.
    pub distal_topdown_dimensions: Vec<usize>,
    /// Whether cells grow lateral distal synapses onto this layer's own cells.
    pub lateral_synapses: bool,
    /// Whether the top-down feedback range carries bits.
    pub use_feedback: bool,
    /// Proximal segment parameter map.
    pub proximal: ProximalParams,
    /// Distal segment parameter map.
    pub distal: DistalParams,
    /// Target fraction of active columns.
    pub activation_level: f32,
    /// Cap on the activation level under continued temporal pooling.
    pub activation_level_max: f32,
    /// Global (true) or local (false) inhibition.
    pub global_inhibition: bool,
    /// Neighbours closer than this are ignored by local inhibition.
    pub inhibition_base_distance: usize,
    /// Upper bound of the boost factor range [1, max_boost].
    pub max_boost: f32,
    /// Exponential-moving-average window for duty cycles.
    pub duty_cycle_period: u64,
    /// A column boosts when its duty cycle falls below this fraction of the
    /// neighbourhood maximum.
    pub boost_active_duty_ratio: f32,
    /// Steps between boost recomputations.
    pub boost_active_every: u64,
    /// Steps between inhibition-radius recomputations.
    pub inh_radius_every: u64,
    /// Weight of distal excitation merged into the proximal cell excitation.
    pub distal_vs_proximal_weight: f32,
    /// Whether cells with distal excitation but no proximal drive compete.
    pub spontaneous_activation: bool,
    /// Score gap at which the best cells alone shut out the rest of a column.
    pub dominance_margin: f32,
    /// Engagement gate: stable fraction of the feed-forward bits.
    pub stable_inbit_frac_threshold: f32,
    /// Temporal-pooling excitation given to newly active cells.
    pub temporal_pooling_max_exc: f32,
    /// Temporal-pooling excitation decay per step.
    pub temporal_pooling_fall: f32,
    /// Seed for the layer's random stream.
    pub random_seed: u64,
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            input_dimensions: Vec::new(),
            column_dimensions: vec![1000],
            depth: 5,
            distal_motor_dimensions: vec![0],
            distal_topdown_dimensions: vec![0],
            lateral_synapses: true,
            use_feedback: false,
            proximal: ProximalParams::default(),
            distal: DistalParams::default(),
            activation_level: 0.02,
            activation_level_max: 0.10,
            global_inhibition: true,
            inhibition_base_distance: 1,
            max_boost: 1.5,
            duty_cycle_period: 1000,
            boost_active_duty_ratio: 0.001,
            boost_active_every: 1000,
            inh_radius_every: 1000,
            distal_vs_proximal_weight: 0.0,
            spontaneous_activation: false,
            dominance_margin: 4.0,
            stable_inbit_frac_threshold: 0.5,
            temporal_pooling_max_exc: 50.0,
            temporal_pooling_fall: 5.0,
            random_seed: 42,
        }
    }
}

impl LayerParams {
    /// Parameter set with the given input dimensions and defaults elsewhere.
    pub fn new(input_dimensions: &[usize]) -> Self {
        Self {
            input_dimensions: input_dimensions.to_vec(),
            ..Self::default()
        }
    }

    /// Deserialize a parameter set from JSON. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CorticalError::Config(e.to_string()))
    }

    /// Serialize the parameter set to pretty JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Number of columns (product of column dimensions).
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.column_dimensions.iter().product()
    }

    /// Number of feed-forward input bits.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.input_dimensions.iter().product()
    }

    /// A first-level layer carries exactly one proximal segment per column
    /// and is always engaged.
    #[inline]
    pub fn first_level(&self) -> bool {
        self.proximal.max_segments == 1
    }

    /// Validate the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.input_dimensions.is_empty() {
            return Err(CorticalError::Config("input_dimensions must be set".into()));
        }
        if self.input_dimensions.iter().any(|&d| d == 0) {
            return Err(CorticalError::Config(
                "input_dimensions must all be positive".into(),
            ));
        }
        if self.column_dimensions.is_empty() || self.column_dimensions.iter().any(|&d| d == 0) {
            return Err(CorticalError::Config(
                "column_dimensions must all be positive".into(),
            ));
        }
        if self.depth == 0 {
            return Err(CorticalError::Config("depth must be positive".into()));
        }
        if !(0.0 < self.activation_level && self.activation_level <= 1.0) {
            return Err(CorticalError::Config(
                "activation_level must be in (0, 1]".into(),
            ));
        }
        if self.activation_level_max < self.activation_level {
            return Err(CorticalError::Config(
                "activation_level_max must be >= activation_level".into(),
            ));
        }
        if self.max_boost < 1.0 {
            return Err(CorticalError::Config("max_boost must be >= 1.0".into()));
        }
        if self.duty_cycle_period == 0 || self.boost_active_every == 0 || self.inh_radius_every == 0
        {
            return Err(CorticalError::Config(
                "duty-cycle and recomputation periods must be positive".into(),
            ));
        }

        validate_permanences(
            "proximal",
            &[
                self.proximal.perm_inc,
                self.proximal.perm_stable_inc,
                self.proximal.perm_dec,
                self.proximal.perm_connected,
                self.proximal.perm_init,
                self.proximal.ff_perm_init_hi,
                self.proximal.ff_perm_init_lo,
            ],
        )?;
        validate_permanences(
            "distal",
            &[
                self.distal.perm_inc,
                self.distal.perm_stable_inc,
                self.distal.perm_dec,
                self.distal.perm_punish,
                self.distal.perm_connected,
                self.distal.perm_init,
            ],
        )?;

        if self.proximal.ff_perm_init_lo > self.proximal.ff_perm_init_hi {
            return Err(CorticalError::Config(
                "ff_perm_init_lo must be <= ff_perm_init_hi".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.proximal.ff_potential_radius) {
            return Err(CorticalError::Config(
                "ff_potential_radius must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.proximal.ff_init_frac) {
            return Err(CorticalError::Config(
                "ff_init_frac must be in [0, 1]".into(),
            ));
        }
        if self.proximal.max_segments == 0 || self.distal.max_segments == 0 {
            return Err(CorticalError::Config("max_segments must be positive".into()));
        }
        if self.proximal.max_synapse_count == 0 || self.distal.max_synapse_count == 0 {
            return Err(CorticalError::Config(
                "max_synapse_count must be positive".into(),
            ));
        }

        Ok(())
    }
}

fn validate_permanences(which: &str, perms: &[f32]) -> Result<()> {
    for &p in perms {
        if !(0.0..=1.0).contains(&p) || p.is_nan() {
            return Err(CorticalError::Config(format!(
                "{} permanence parameter {} outside [0, 1]",
                which, p
            )));
        }
    }
    Ok(())
}
