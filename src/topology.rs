//! Regular n-dimensional grid topology.
//!
//! Columns and feed-forward inputs both live on regular grids. The topology
//! maps between flat indices and coordinate tuples (row-major, last dimension
//! fastest) and enumerates neighbours within an annular Chebyshev radius,
//! which is all the inhibition and boosting machinery needs.

use itertools::Itertools;

/// A regular n-dimensional grid.
///
/// # Examples
///
/// ```
/// use cortical::GridTopology;
///
/// let topo = GridTopology::new(&[4, 8]);
/// assert_eq!(topo.size(), 32);
/// assert_eq!(topo.coord_of(9), vec![1, 1]);
/// assert_eq!(topo.index_of(&[1, 1]), 9);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridTopology {
    dims: Vec<usize>,
    size: usize,
}

impl GridTopology {
    /// Create a grid with the given dimensions.
    ///
    /// # Panics
    ///
    /// Panics if `dims` is empty or any dimension is zero. Dimension vectors
    /// reach this point pre-validated by the layer configuration.
    pub fn new(dims: &[usize]) -> Self {
        assert!(!dims.is_empty(), "topology needs at least one dimension");
        assert!(dims.iter().all(|&d| d > 0), "topology dimensions must be positive");

        Self {
            dims: dims.to_vec(),
            size: dims.iter().product(),
        }
    }

    /// Grid dimensions.
    #[inline]
    pub fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of grid points (product of dimensions).
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Longest dimension.
    #[inline]
    pub fn max_dimension(&self) -> usize {
        self.dims.iter().copied().max().unwrap_or(0)
    }

    /// Coordinate tuple of a flat index (row-major, last dimension fastest).
    pub fn coord_of(&self, index: usize) -> Vec<usize> {
        debug_assert!(index < self.size, "index {} out of grid size {}", index, self.size);

        let mut rem = index;
        let mut coord = vec![0; self.dims.len()];
        for (i, &d) in self.dims.iter().enumerate().rev() {
            coord[i] = rem % d;
            rem /= d;
        }
        coord
    }

    /// Flat index of a coordinate tuple.
    pub fn index_of(&self, coord: &[usize]) -> usize {
        debug_assert_eq!(coord.len(), self.dims.len());

        coord
            .iter()
            .zip(&self.dims)
            .fold(0, |acc, (&c, &d)| {
                debug_assert!(c < d, "coordinate {} out of dimension {}", c, d);
                acc * d + c
            })
    }

    /// Chebyshev distance between two coordinate tuples.
    pub fn coord_distance(&self, a: &[usize], b: &[usize]) -> usize {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| x.abs_diff(y))
            .max()
            .unwrap_or(0)
    }

    /// Indices of grid points in the annulus around `centre` with Chebyshev
    /// distance in `(inner_r, outer_r]`.
    ///
    /// `inner_r = 0` excludes only the centre itself. The centre is never a
    /// neighbour of itself (its distance is 0).
    pub fn neighbours(&self, centre: usize, outer_r: usize, inner_r: usize) -> Vec<usize> {
        let centre_coord = self.coord_of(centre);

        let ranges: Vec<Vec<usize>> = centre_coord
            .iter()
            .zip(&self.dims)
            .map(|(&c, &d)| (c.saturating_sub(outer_r)..=(c + outer_r).min(d - 1)).collect())
            .collect();

        ranges
            .into_iter()
            .multi_cartesian_product()
            .filter(|coord| {
                let dist = self.coord_distance(&centre_coord, coord);
                dist > inner_r && dist <= outer_r
            })
            .map(|coord| self.index_of(&coord))
            .collect()
    }
}
