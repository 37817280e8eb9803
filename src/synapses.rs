//! Sparse synapse graph with permanence-based plasticity.
//!
//! A `SynapseGraph` stores, for every target segment, a sparse map from
//! source bit to permanence in [0, 1]. A synapse is *connected* when its
//! permanence reaches the graph's connected threshold; a reverse index from
//! source bit to connected segments makes excitation queries proportional to
//! the active source count rather than the graph size.
//!
//! Two instances of the same abstraction serve the layer:
//!
//! - the **proximal** graph targets column bodies (cell index fixed at 0)
//! - the **distal** graph targets any cell in the layer
//!
//! # Core operations
//!
//! - `excitations(active, threshold)` - connected-overlap counts per segment
//! - `bulk_learn(updates, active, ...)` - apply a batch of [`SegUpdate`]s
//! - `seg_excitation(target, mask, pcon)` - one segment's overlap at an
//!   arbitrary permanence floor (the learning engine matches at 0.0)

use crate::error::{CorticalError, Result};
use crate::util::clamp01;
use bitvec::slice::BitSlice;
use std::collections::{HashMap, HashSet};

/// Source bit index.
pub type Bit = usize;

/// Column identifier.
pub type ColumnId = usize;

/// Cell identifier: (column id, cell index within the column).
pub type CellId = (usize, usize);

/// Segment path: (column id, cell index, segment index). Proximal segments
/// use cell index 0.
pub type SegPath = (usize, usize, usize);

/// One dendritic segment: source bit to permanence.
pub type Segment = HashMap<Bit, f32>;

/// What a [`SegUpdate`] does to its target segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegUpdateOp {
    /// Reinforce active synapses, decay the rest, then grow and cull.
    Learn,
    /// Decrement synapses whose source was active; nothing else changes.
    Punish,
    /// Reinforce active synapses and decay the rest; no growth or death.
    Reinforce,
}

/// A single planned change to one segment.
///
/// Produced by the learning engine, consumed by [`SynapseGraph::bulk_learn`].
/// `grow_sources` must not exist on the target yet; `die_sources` must.
#[derive(Debug, Clone)]
pub struct SegUpdate {
    /// The segment this update applies to.
    pub target: SegPath,
    /// The update rule.
    pub op: SegUpdateOp,
    /// Sources to grow fresh synapses from.
    pub grow_sources: Vec<Bit>,
    /// Sources whose synapses are removed.
    pub die_sources: Vec<Bit>,
}

impl SegUpdate {
    /// A full learning update with growth and culling.
    pub fn learn(target: SegPath, grow_sources: Vec<Bit>, die_sources: Vec<Bit>) -> Self {
        Self {
            target,
            op: SegUpdateOp::Learn,
            grow_sources,
            die_sources,
        }
    }

    /// A punishment update.
    pub fn punish(target: SegPath) -> Self {
        Self {
            target,
            op: SegUpdateOp::Punish,
            grow_sources: Vec::new(),
            die_sources: Vec::new(),
        }
    }

    /// A reinforce-only update (stable-input bonus pass).
    pub fn reinforce(target: SegPath) -> Self {
        Self {
            target,
            op: SegUpdateOp::Reinforce,
            grow_sources: Vec::new(),
            die_sources: Vec::new(),
        }
    }
}

/// Sparse per-segment synapse store with a connected-synapse reverse index.
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseGraph {
    source_width: usize,
    max_segments: usize,
    max_synapses: usize,
    pcon: f32,
    cells: HashMap<CellId, Vec<Segment>>,
    connected: HashMap<Bit, HashSet<SegPath>>,
    n_synapses: usize,
}

impl SynapseGraph {
    /// Create an empty graph.
    ///
    /// * `source_width` - number of source bits feeding the graph
    /// * `max_segments` - segments allowed per target cell
    /// * `max_synapses` - synapses allowed per segment
    /// * `pcon` - connected-permanence threshold
    pub fn new(source_width: usize, max_segments: usize, max_synapses: usize, pcon: f32) -> Self {
        assert!(max_segments > 0, "max_segments must be > 0");
        assert!(max_synapses > 0, "max_synapses must be > 0");
        assert!((0.0..=1.0).contains(&pcon), "pcon must be in [0, 1]");

        Self {
            source_width,
            max_segments,
            max_synapses,
            pcon,
            cells: HashMap::new(),
            connected: HashMap::new(),
            n_synapses: 0,
        }
    }

    /// Number of source bits feeding this graph.
    #[inline]
    pub fn source_width(&self) -> usize {
        self.source_width
    }

    /// Connected-permanence threshold.
    #[inline]
    pub fn perm_connected(&self) -> f32 {
        self.pcon
    }

    /// Segments allowed per cell.
    #[inline]
    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Synapses allowed per segment.
    #[inline]
    pub fn max_synapses(&self) -> usize {
        self.max_synapses
    }

    /// The source-to-permanence map of one segment, if it exists.
    pub fn in_synapses(&self, target: SegPath) -> Option<&Segment> {
        let (col, ci, si) = target;
        self.cells.get(&(col, ci)).and_then(|segs| segs.get(si))
    }

    /// All segments of one cell, in stable index order.
    pub fn cell_segments(&self, cell: CellId) -> &[Segment] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sources connected to a segment, sorted ascending.
    pub fn sources_connected_to(&self, target: SegPath) -> Vec<Bit> {
        let mut out: Vec<Bit> = self
            .in_synapses(target)
            .map(|seg| {
                seg.iter()
                    .filter(|(_, &p)| p >= self.pcon)
                    .map(|(&b, _)| b)
                    .collect()
            })
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Segments with a connected synapse from `source` (the reverse index).
    pub fn targets_connected_from(&self, source: Bit) -> impl Iterator<Item = SegPath> + '_ {
        self.connected.get(&source).into_iter().flatten().copied()
    }

    /// Connected-overlap counts per segment for a set of active sources.
    ///
    /// Segments whose count falls below `stimulus_threshold` are omitted.
    pub fn excitations(
        &self,
        active_sources: &[Bit],
        stimulus_threshold: u32,
    ) -> HashMap<SegPath, u32> {
        let mut exc: HashMap<SegPath, u32> = HashMap::new();
        for &src in active_sources {
            debug_assert!(src < self.source_width);
            if let Some(targets) = self.connected.get(&src) {
                for &t in targets {
                    *exc.entry(t).or_insert(0) += 1;
                }
            }
        }
        exc.retain(|_, c| *c >= stimulus_threshold);
        exc
    }

    /// Overlap of one segment against a dense active-source mask, counting
    /// synapses at or above `pcon` (pass 0.0 to count every synapse).
    pub fn seg_excitation(&self, target: SegPath, active: &BitSlice, pcon: f32) -> u32 {
        self.in_synapses(target)
            .map(|seg| {
                seg.iter()
                    .filter(|(&src, &p)| p >= pcon && active[src])
                    .count() as u32
            })
            .unwrap_or(0)
    }

    /// Apply a batch of segment updates sequentially.
    ///
    /// * `Learn` - active synapses gain `pinc`, the rest lose `pdec`; then
    ///   `die_sources` are removed and `grow_sources` inserted at `pinit`.
    /// * `Punish` - synapses whose source is active lose `pdec`.
    /// * `Reinforce` - like `Learn` without growth or death.
    ///
    /// All permanence arithmetic clamps to [0, 1]. Two updates targeting the
    /// same segment in one batch are a precondition violation.
    pub fn bulk_learn(
        &mut self,
        updates: &[SegUpdate],
        active: &BitSlice,
        pinc: f32,
        pdec: f32,
        pinit: f32,
    ) -> Result<()> {
        let mut seen: HashSet<SegPath> = HashSet::with_capacity(updates.len());
        for up in updates {
            if !seen.insert(up.target) {
                return Err(CorticalError::DuplicateTarget { target: up.target });
            }
        }

        for up in updates {
            self.apply_update(up, active, pinc, pdec, pinit)?;
        }
        Ok(())
    }

    /// Install a pre-built segment (construction-time proximal seeding).
    ///
    /// Returns the new segment's index.
    pub fn seed_segment<I>(&mut self, cell: CellId, synapses: I) -> usize
    where
        I: IntoIterator<Item = (Bit, f32)>,
    {
        let segs = self.cells.entry(cell).or_default();
        debug_assert!(segs.len() < self.max_segments);
        let si = segs.len();
        segs.push(Segment::new());

        let path = (cell.0, cell.1, si);
        let seg = &mut self.cells.get_mut(&cell).expect("just inserted")[si];
        for (bit, perm) in synapses {
            debug_assert!(bit < self.source_width);
            let perm = clamp01(perm);
            if seg.insert(bit, perm).is_none() {
                self.n_synapses += 1;
            }
            if perm >= self.pcon {
                self.connected.entry(bit).or_default().insert(path);
            }
        }
        debug_assert!(seg.len() <= self.max_synapses);
        si
    }

    /// Count of non-empty segments in the graph.
    pub fn num_segments(&self) -> usize {
        self.cells
            .values()
            .map(|segs| segs.iter().filter(|s| !s.is_empty()).count())
            .sum()
    }

    /// Total synapse count across all segments.
    #[inline]
    pub fn num_synapses(&self) -> usize {
        self.n_synapses
    }

    /// Estimate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        let mut bytes = std::mem::size_of::<Self>();
        bytes += self.cells.len() * std::mem::size_of::<(CellId, Vec<Segment>)>();
        bytes += self.n_synapses * std::mem::size_of::<(Bit, f32)>();
        bytes += self.connected.len() * std::mem::size_of::<(Bit, HashSet<SegPath>)>();
        bytes += self
            .connected
            .values()
            .map(|t| t.len() * std::mem::size_of::<SegPath>())
            .sum::<usize>();
        bytes
    }

    fn apply_update(
        &mut self,
        up: &SegUpdate,
        active: &BitSlice,
        pinc: f32,
        pdec: f32,
        pinit: f32,
    ) -> Result<()> {
        let (col, ci, si) = up.target;
        let pcon = self.pcon;

        let cells = &mut self.cells;
        let connected = &mut self.connected;

        let segs = cells.entry((col, ci)).or_default();

        // A learn update may address the append slot to grow a new segment.
        if si == segs.len() && up.op == SegUpdateOp::Learn {
            debug_assert!(segs.len() < self.max_segments);
            segs.push(Segment::new());
        }
        let Some(seg) = segs.get_mut(si) else {
            debug_assert!(false, "update targets absent segment {:?}", up.target);
            return Ok(());
        };

        for &bit in &up.die_sources {
            if !seg.contains_key(&bit) {
                return Err(CorticalError::DieSourceMissing {
                    target: up.target,
                    bit,
                });
            }
        }
        for &bit in &up.grow_sources {
            if seg.contains_key(&bit) {
                return Err(CorticalError::GrowSourcePresent {
                    target: up.target,
                    bit,
                });
            }
        }

        match up.op {
            SegUpdateOp::Learn | SegUpdateOp::Reinforce => {
                for (&src, p) in seg.iter_mut() {
                    let before = *p;
                    *p = if active[src] {
                        clamp01(*p + pinc)
                    } else {
                        clamp01(*p - pdec)
                    };
                    sync_connected(connected, up.target, src, before, *p, pcon);
                }
            }
            SegUpdateOp::Punish => {
                for (&src, p) in seg.iter_mut() {
                    if active[src] {
                        let before = *p;
                        *p = clamp01(*p - pdec);
                        sync_connected(connected, up.target, src, before, *p, pcon);
                    }
                }
            }
        }

        if up.op == SegUpdateOp::Learn {
            for &bit in &up.die_sources {
                let before = seg.remove(&bit).expect("validated above");
                self.n_synapses -= 1;
                if before >= pcon {
                    if let Some(t) = connected.get_mut(&bit) {
                        t.remove(&up.target);
                    }
                }
            }
            let perm = clamp01(pinit);
            for &bit in &up.grow_sources {
                debug_assert!(bit < self.source_width);
                seg.insert(bit, perm);
                self.n_synapses += 1;
                if perm >= pcon {
                    connected.entry(bit).or_default().insert(up.target);
                }
            }
            debug_assert!(
                seg.len() <= self.max_synapses,
                "segment {:?} exceeds synapse cap",
                up.target
            );
        }

        Ok(())
    }
}

fn sync_connected(
    connected: &mut HashMap<Bit, HashSet<SegPath>>,
    target: SegPath,
    src: Bit,
    before: f32,
    after: f32,
    pcon: f32,
) {
    let was = before >= pcon;
    let now = after >= pcon;
    if was == now {
        return;
    }
    if now {
        connected.entry(src).or_default().insert(target);
    } else if let Some(t) = connected.get_mut(&src) {
        t.remove(&target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::bit_mask;

    fn graph() -> SynapseGraph {
        SynapseGraph::new(64, 4, 8, 0.20)
    }

    #[test]
    fn test_seed_and_query() {
        let mut sg = graph();
        let si = sg.seed_segment((3, 1), [(10, 0.25), (11, 0.10), (12, 0.30)]);
        assert_eq!(si, 0);

        let seg = sg.in_synapses((3, 1, 0)).unwrap();
        assert_eq!(seg.len(), 3);
        assert_eq!(sg.sources_connected_to((3, 1, 0)), vec![10, 12]);
        assert_eq!(sg.num_segments(), 1);
        assert_eq!(sg.num_synapses(), 3);

        let targets: Vec<_> = sg.targets_connected_from(10).collect();
        assert_eq!(targets, vec![(3, 1, 0)]);
        assert_eq!(sg.targets_connected_from(11).count(), 0);
    }

    #[test]
    fn test_excitations_threshold() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.25), (2, 0.25), (3, 0.25)]);
        sg.seed_segment((5, 2), [(1, 0.25), (9, 0.05)]);

        let exc = sg.excitations(&[1, 2, 3], 2);
        assert_eq!(exc.get(&(0, 0, 0)), Some(&3));
        // Only one connected overlap on the second segment.
        assert!(!exc.contains_key(&(5, 2, 0)));

        let exc = sg.excitations(&[1, 2, 3], 1);
        assert_eq!(exc.get(&(5, 2, 0)), Some(&1));
    }

    #[test]
    fn test_seg_excitation_counts_disconnected_at_zero_floor() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.25), (2, 0.05), (3, 0.05)]);

        let mask = bit_mask(64, [1, 2, 3]);
        assert_eq!(sg.seg_excitation((0, 0, 0), &mask, 0.20), 1);
        assert_eq!(sg.seg_excitation((0, 0, 0), &mask, 0.0), 3);
    }

    #[test]
    fn test_learn_increments_and_decrements() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.50), (2, 0.50)]);

        let ups = vec![SegUpdate::learn((0, 0, 0), vec![], vec![])];
        sg.bulk_learn(&ups, &bit_mask(64, [1]), 0.10, 0.04, 0.16)
            .unwrap();

        let seg = sg.in_synapses((0, 0, 0)).unwrap();
        assert!((seg[&1] - 0.60).abs() < 1e-6);
        assert!((seg[&2] - 0.46).abs() < 1e-6);
    }

    #[test]
    fn test_learn_grow_and_die() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.50), (2, 0.01)]);

        let ups = vec![SegUpdate::learn((0, 0, 0), vec![7], vec![2])];
        sg.bulk_learn(&ups, &bit_mask(64, [1, 7]), 0.10, 0.04, 0.16)
            .unwrap();

        let seg = sg.in_synapses((0, 0, 0)).unwrap();
        assert!(!seg.contains_key(&2));
        assert!((seg[&7] - 0.16).abs() < 1e-6);
        assert_eq!(sg.num_synapses(), 2);
    }

    #[test]
    fn test_learn_appends_new_segment() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.50)]);

        let ups = vec![SegUpdate::learn((0, 0, 1), vec![4, 5], vec![])];
        sg.bulk_learn(&ups, &bit_mask(64, [4, 5]), 0.10, 0.04, 0.16)
            .unwrap();

        assert_eq!(sg.cell_segments((0, 0)).len(), 2);
        assert_eq!(sg.in_synapses((0, 0, 1)).unwrap().len(), 2);
    }

    #[test]
    fn test_punish_touches_only_active() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.50), (2, 0.50)]);

        let ups = vec![SegUpdate::punish((0, 0, 0))];
        sg.bulk_learn(&ups, &bit_mask(64, [1]), 0.10, 0.002, 0.16)
            .unwrap();

        let seg = sg.in_synapses((0, 0, 0)).unwrap();
        assert!((seg[&1] - 0.498).abs() < 1e-6);
        assert!((seg[&2] - 0.50).abs() < 1e-6);
    }

    #[test]
    fn test_permanence_clamps() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.95), (2, 0.02)]);

        let ups = vec![SegUpdate::learn((0, 0, 0), vec![], vec![])];
        sg.bulk_learn(&ups, &bit_mask(64, [1]), 0.20, 0.10, 0.16)
            .unwrap();

        let seg = sg.in_synapses((0, 0, 0)).unwrap();
        assert_eq!(seg[&1], 1.0);
        assert_eq!(seg[&2], 0.0);
    }

    #[test]
    fn test_connected_index_follows_threshold_crossings() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.19)]);
        assert_eq!(sg.targets_connected_from(1).count(), 0);

        // One reinforcement crosses the 0.20 threshold.
        let ups = vec![SegUpdate::reinforce((0, 0, 0))];
        sg.bulk_learn(&ups, &bit_mask(64, [1]), 0.02, 0.01, 0.16)
            .unwrap();
        assert_eq!(sg.targets_connected_from(1).count(), 1);

        // Punishment drops it back below.
        let ups = vec![SegUpdate::punish((0, 0, 0))];
        sg.bulk_learn(&ups, &bit_mask(64, [1]), 0.02, 0.05, 0.16)
            .unwrap();
        assert_eq!(sg.targets_connected_from(1).count(), 0);
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.50)]);

        let ups = vec![
            SegUpdate::learn((0, 0, 0), vec![], vec![]),
            SegUpdate::punish((0, 0, 0)),
        ];
        let err = sg
            .bulk_learn(&ups, &bit_mask(64, [1]), 0.1, 0.01, 0.16)
            .unwrap_err();
        assert!(matches!(err, CorticalError::DuplicateTarget { .. }));
    }

    #[test]
    fn test_grow_existing_source_rejected() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.50)]);

        let ups = vec![SegUpdate::learn((0, 0, 0), vec![1], vec![])];
        let err = sg
            .bulk_learn(&ups, &bit_mask(64, [1]), 0.1, 0.01, 0.16)
            .unwrap_err();
        assert!(matches!(err, CorticalError::GrowSourcePresent { .. }));
    }

    #[test]
    fn test_die_missing_source_rejected() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.50)]);

        let ups = vec![SegUpdate::learn((0, 0, 0), vec![], vec![9])];
        let err = sg
            .bulk_learn(&ups, &bit_mask(64, [1]), 0.1, 0.01, 0.16)
            .unwrap_err();
        assert!(matches!(err, CorticalError::DieSourceMissing { .. }));
    }

    #[test]
    fn test_memory_usage() {
        let mut sg = graph();
        sg.seed_segment((0, 0), [(1, 0.5), (2, 0.5)]);
        assert!(sg.memory_usage() > 0);
    }
}
