//! Cortical - a Hierarchical Temporal Memory layer engine.
//!
//! Cortical implements the activation, learning and depolarisation core of a
//! single HTM cortical layer: columnar cells connected to a feed-forward bit
//! field by proximal segments and to recent cell activity by distal
//! segments, with permanence-based synaptic plasticity throughout.
//!
//! # Key Characteristics
//!
//! - Sparse distributed representations: inputs and outputs are small sets
//!   of active bits out of a large space
//! - Deterministic stepping: a seeded, splittable random stream makes every
//!   run reproducible
//! - Pure state transitions: `activate`, `learn` and `depolarise` each
//!   replace whole state snapshots
//!
//! # Architecture
//!
//! - **GridTopology**: n-dimensional grids for columns and inputs
//! - **SynapseGraph**: sparse segment storage with excitation queries and a
//!   bulk learning primitive, instantiated proximally and distally
//! - **Inhibition / Boosting**: column competition and duty-cycle boosting
//! - **Layer**: the per-timestep state machine tying it all together
//!
//! # Examples
//!
//! ## Driving a layer through a sequence
//!
//! ```
//! use cortical::{Layer, LayerParams};
//!
//! let mut params = LayerParams::new(&[100]);
//! params.column_dimensions = vec![64];
//! params.depth = 4;
//!
//! let mut layer = Layer::new(params).unwrap();
//!
//! let a: Vec<usize> = (0..10).collect();
//! let b: Vec<usize> = (10..20).collect();
//!
//! for _ in 0..5 {
//!     for pattern in [&a, &b] {
//!         layer.activate(pattern, &[]).unwrap();
//!         layer.learn().unwrap();
//!         layer.depolarise_distal(&[]).unwrap();
//!     }
//! }
//!
//! let view = layer.view();
//! assert_eq!(view.timestep, 10);
//! assert!(!view.active_columns.is_empty());
//! ```
//!
//! ## Configuration from JSON
//!
//! ```
//! use cortical::{Layer, LayerParams};
//!
//! let params = LayerParams::from_json(r#"{
//!     "input_dimensions": [200],
//!     "column_dimensions": [128],
//!     "depth": 8,
//!     "distal": { "max_segments": 4 }
//! }"#).unwrap();
//!
//! let layer = Layer::new(params).unwrap();
//! assert_eq!(layer.num_columns(), 128);
//! ```

// Core data structures
pub mod error;
pub mod params;
pub mod state;
pub mod synapses;
pub mod topology;
pub mod util;

// Column competition
pub mod boosting;
pub mod inhibition;

// The layer state machine
pub mod layer;

mod activation;
mod depolarisation;
mod learning;

// Re-exports for convenient access
pub use error::{CorticalError, Result};
pub use layer::{Break, Layer};
pub use params::{DistalParams, LayerParams, ProximalParams};
pub use state::{ActiveState, DistalState, LayerView};
pub use synapses::{Bit, CellId, ColumnId, SegPath, SegUpdate, SegUpdateOp, Segment, SynapseGraph};
pub use topology::GridTopology;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework name
pub const NAME: &str = "Cortical";

/// Get version string
pub fn version() -> String {
    format!("{} v{}", NAME, VERSION)
}
