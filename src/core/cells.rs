//! Graph primitives of the connectivity model.
//!
//! A `Column` groups a fixed number of cells behind one proximal dendrite
//! (its feed-forward receptive field). A `Cell` owns zero or more distal
//! dendrite segments. A `Segment`, proximal or distal and distinguished by
//! a tagged variant rather than a class hierarchy, owns a `Pool` of synapses.
//! A `Synapse` is a directed edge from a source (an input bit for proximal
//! segments, a presynaptic cell for distal ones) to its owning segment,
//! weighted by a permanence in [0, 1].
//!
//! Everything here is passive data; the arena that ties the pieces together
//! lives in [`super::connections`].

use serde::{Deserialize, Serialize};

/// Flat index of a column.
pub type ColumnIdx = usize;
/// Flat index of a cell: `column * cells_per_column + offset`.
pub type CellIdx = usize;
/// Arena index of a segment.
pub type SegmentIdx = usize;

/// Lower permanence bound.
pub const MIN_PERMANENCE: f32 = 0.0;
/// Upper permanence bound.
pub const MAX_PERMANENCE: f32 = 1.0;

/// A synapse connecting a source index to its owning segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    /// Input-bit index (proximal) or presynaptic cell index (distal).
    pub source: usize,

    /// Connection strength in [0, 1].
    pub permanence: f32,
}

impl Synapse {
    /// A synapse counts toward overlap/activity only while connected.
    #[inline]
    pub fn is_connected(&self, threshold: f32) -> bool {
        self.permanence >= threshold
    }
}

/// The ordered collection of synapses belonging to one segment. The pool is
/// the only writer of permanence values and keeps every write inside [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    synapses: Vec<Synapse>,
}

impl Pool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            synapses: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.synapses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synapses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Synapse> {
        self.synapses.iter()
    }

    /// Appends a synapse, clamping its permanence. The caller must not add a
    /// second synapse to the same source.
    pub fn push(&mut self, source: usize, permanence: f32) {
        debug_assert!(
            !self.contains_source(source),
            "duplicate synapse to source {source}"
        );
        self.synapses.push(Synapse {
            source,
            permanence: permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE),
        });
    }

    pub fn contains_source(&self, source: usize) -> bool {
        self.synapses.iter().any(|syn| syn.source == source)
    }

    pub fn source(&self, slot: usize) -> usize {
        self.synapses[slot].source
    }

    pub fn permanence(&self, slot: usize) -> f32 {
        self.synapses[slot].permanence
    }

    /// Overwrites a permanence, clamped to [0, 1].
    pub fn set_permanence(&mut self, slot: usize, value: f32) {
        self.synapses[slot].permanence = value.clamp(MIN_PERMANENCE, MAX_PERMANENCE);
    }

    /// Adds `delta` to a permanence, clamped to [0, 1].
    pub fn nudge(&mut self, slot: usize, delta: f32) {
        let value = self.synapses[slot].permanence + delta;
        self.set_permanence(slot, value);
    }

    /// Adds `delta` to every permanence in the pool, clamped.
    pub fn bump_all(&mut self, delta: f32) {
        for slot in 0..self.synapses.len() {
            self.nudge(slot, delta);
        }
    }

    /// Forgets synapses that have decayed to noise: any permanence at or
    /// below `threshold` is reset to the minimum.
    pub fn trim(&mut self, threshold: f32) {
        for syn in &mut self.synapses {
            if syn.permanence <= threshold {
                syn.permanence = MIN_PERMANENCE;
            }
        }
    }

    /// Number of synapses at or above the connected threshold.
    pub fn connected_count(&self, threshold: f32) -> usize {
        self.synapses
            .iter()
            .filter(|syn| syn.is_connected(threshold))
            .count()
    }

    /// Clears the pool, keeping its allocation. Used when a segment slot is
    /// recycled under the per-cell cap.
    pub fn clear(&mut self) {
        self.synapses.clear();
    }
}

/// Which structure a segment serves: a column's feed-forward receptive field
/// or a cell's lateral (sequence) context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    /// The single proximal dendrite of a column; sources are input bits.
    Proximal(ColumnIdx),
    /// A distal dendrite of a cell; sources are presynaptic cells.
    Distal(CellIdx),
}

/// A dendrite segment: its role tag plus its synapse pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentData {
    pub kind: SegmentKind,
    pub pool: Pool,
}

impl SegmentData {
    /// The cell a distal segment grows on, if distal.
    pub fn owning_cell(&self) -> Option<CellIdx> {
        match self.kind {
            SegmentKind::Distal(cell) => Some(cell),
            SegmentKind::Proximal(_) => None,
        }
    }
}

/// Per-cell record: the distal segments grown on this cell so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    pub segments: Vec<SegmentIdx>,
}

/// Per-column record: the proximal segment plus the auxiliary state the
/// Spatial Pooler maintains every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnData {
    /// Arena index of this column's proximal segment.
    pub proximal: SegmentIdx,

    /// Overlap multiplier for chronically under-active columns, ≥ 1.
    pub boost: f32,

    /// EMA of how often this column won inhibition, in [0, 1].
    pub active_duty_cycle: f32,

    /// EMA of how often this column had non-zero overlap, in [0, 1].
    pub overlap_duty_cycle: f32,

    /// Connected-synapse overlap count for the current step.
    pub overlap: u32,
}

impl ColumnData {
    pub fn new(proximal: SegmentIdx) -> Self {
        Self {
            proximal,
            boost: 1.0,
            active_duty_cycle: 0.0,
            overlap_duty_cycle: 0.0,
            overlap: 0,
        }
    }
}
