//! An N-dimensional index space described by its dimension sizes.
//!
//! Both the input space and the column space of the Spatial Pooler are
//! (possibly multi-dimensional) grids addressed by flat indices. `Topology`
//! converts between flat indices and coordinates and enumerates the
//! neighborhood of indices within a radius of a center, with optional
//! wrap-around at the edges (the space then behaves like a torus).

use serde::{Deserialize, Serialize};

/// The shape of an N-dimensional space with precomputed strides for flat
/// index arithmetic. Strides are row-major: the last dimension is contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    dims: Vec<usize>,
    strides: Vec<usize>,
}

impl Topology {
    /// Creates a topology from a slice of dimension sizes.
    pub fn new(dimensions: &[usize]) -> Self {
        let dims = dimensions.to_vec();
        let mut strides = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * dims[i + 1];
        }
        Self { dims, strides }
    }

    /// The dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of indices in the space.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    /// True if the space holds no indices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts a flat index into per-dimension coordinates.
    pub fn coordinates(&self, index: usize) -> Vec<usize> {
        let mut remainder = index;
        self.strides
            .iter()
            .map(|&stride| {
                let coord = remainder / stride;
                remainder %= stride;
                coord
            })
            .collect()
    }

    /// Converts per-dimension coordinates into a flat index. The coordinate
    /// count must match the dimension count.
    pub fn flatten(&self, coords: &[usize]) -> usize {
        debug_assert_eq!(coords.len(), self.dims.len());
        coords.iter().zip(&self.strides).map(|(&c, &s)| c * s).sum()
    }

    /// Collects every flat index within `radius` of `center`, measured per
    /// dimension. With `wrap` the range wraps around each dimension (capped
    /// so no index appears twice); without it the range is clipped at the
    /// boundaries. The center itself is included.
    pub fn neighborhood(&self, center: usize, radius: usize, wrap: bool) -> Vec<usize> {
        let center_coords = self.coordinates(center);
        let radius = radius as isize;

        // Per-dimension half-open offset ranges.
        let ranges: Vec<(isize, isize)> = center_coords
            .iter()
            .zip(&self.dims)
            .map(|(&c, &dim)| {
                let c = c as isize;
                let dim = dim as isize;
                if wrap {
                    let span = (2 * radius + 1).min(dim);
                    (c - radius, c - radius + span)
                } else {
                    ((c - radius).max(0), (c + radius + 1).min(dim))
                }
            })
            .collect();

        let total: usize = ranges.iter().map(|&(lo, hi)| (hi - lo) as usize).product();
        let mut out = Vec::with_capacity(total);
        let mut cursor: Vec<isize> = ranges.iter().map(|&(lo, _)| lo).collect();

        'scan: loop {
            let index = cursor
                .iter()
                .zip(&self.dims)
                .zip(&self.strides)
                .map(|((&v, &dim), &stride)| v.rem_euclid(dim as isize) as usize * stride)
                .sum();
            out.push(index);

            // Odometer-style advance over the per-dimension ranges.
            for axis in (0..cursor.len()).rev() {
                cursor[axis] += 1;
                if cursor[axis] < ranges[axis].1 {
                    continue 'scan;
                }
                cursor[axis] = ranges[axis].0;
            }
            break;
        }

        out
    }
}
