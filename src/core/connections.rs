//! The connectivity arena shared by the Spatial Pooler and Temporal Memory.
//!
//! `Connections` owns every column, cell, segment, and synapse in flat
//! vectors addressed by integer indices, plus the reverse (receptor) index
//! that maps a presynaptic cell to the distal synapses listening to it.
//! The reverse index is what makes a time step proportional to the number
//! of *active* cells rather than the number of synapses.
//!
//! The arena is pure structure: it stores and retrieves, but never decides.
//! Activation and learning policy, including which permanence threshold
//! counts as "connected", belong to the algorithms that call in.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::cells::{CellData, CellIdx, ColumnData, ColumnIdx, Pool, SegmentData, SegmentIdx, SegmentKind};
use crate::CorticalError;

/// Per-segment activity counts for one set of active cells, indexed by
/// arena segment index.
#[derive(Debug, Clone)]
pub struct DistalActivity {
    /// Active synapses at or above the connected threshold.
    pub connected: Vec<u32>,
    /// Active synapses with any positive permanence.
    pub potential: Vec<u32>,
}

/// The full connectivity graph of one HTM region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connections {
    num_columns: usize,
    cells_per_column: usize,
    columns: Vec<ColumnData>,
    cells: Vec<CellData>,
    segments: Vec<SegmentData>,
    /// Presynaptic cell -> (segment, slot) of every distal synapse on it.
    receptors: FnvHashMap<CellIdx, Vec<(SegmentIdx, usize)>>,
    /// Arena slots vacated by evicted segments, reused before growing.
    free_segments: Vec<SegmentIdx>,
}

impl Connections {
    /// Creates the graph for `num_columns` columns of `cells_per_column`
    /// cells each. Every column gets its (initially empty) proximal segment;
    /// distal segments are grown on demand by Temporal Memory.
    pub fn new(num_columns: usize, cells_per_column: usize) -> Self {
        let segments = (0..num_columns)
            .map(|column| SegmentData {
                kind: SegmentKind::Proximal(column),
                pool: Pool::default(),
            })
            .collect();
        let columns = (0..num_columns).map(ColumnData::new).collect();
        let cells = vec![CellData::default(); num_columns * cells_per_column];

        Self {
            num_columns,
            cells_per_column,
            columns,
            cells,
            segments,
            receptors: FnvHashMap::default(),
            free_segments: Vec::new(),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn cells_per_column(&self) -> usize {
        self.cells_per_column
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Total segment slots in the arena, including vacated ones.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// The flat cell indices belonging to a column.
    pub fn cells_for_column(&self, column: ColumnIdx) -> std::ops::Range<CellIdx> {
        let start = column * self.cells_per_column;
        start..start + self.cells_per_column
    }

    /// The column a cell belongs to.
    pub fn column_of(&self, cell: CellIdx) -> ColumnIdx {
        cell / self.cells_per_column
    }

    pub fn column(&self, column: ColumnIdx) -> &ColumnData {
        &self.columns[column]
    }

    pub fn column_mut(&mut self, column: ColumnIdx) -> &mut ColumnData {
        &mut self.columns[column]
    }

    /// A column's proximal synapse pool.
    pub fn proximal_pool(&self, column: ColumnIdx) -> &Pool {
        &self.segments[self.columns[column].proximal].pool
    }

    pub fn proximal_pool_mut(&mut self, column: ColumnIdx) -> &mut Pool {
        &mut self.segments[self.columns[column].proximal].pool
    }

    /// Distal segments grown on a cell, in growth order.
    pub fn segments_for_cell(&self, cell: CellIdx) -> &[SegmentIdx] {
        &self.cells[cell].segments
    }

    pub fn segment(&self, segment: SegmentIdx) -> &SegmentData {
        &self.segments[segment]
    }

    pub fn segment_mut(&mut self, segment: SegmentIdx) -> &mut SegmentData {
        &mut self.segments[segment]
    }

    /// Grows a distal segment on `cell`, reusing a vacated arena slot when
    /// one exists. With a per-cell cap, a cell already at the cap first
    /// evicts its segment with the fewest synapses (lowest index on ties)
    /// and the new segment takes that slot.
    pub fn create_distal_segment(
        &mut self,
        cell: CellIdx,
        max_segments_per_cell: Option<usize>,
    ) -> SegmentIdx {
        if let Some(cap) = max_segments_per_cell {
            if self.cells[cell].segments.len() >= cap {
                let victim = self.cells[cell]
                    .segments
                    .iter()
                    .copied()
                    .min_by_key(|&seg| (self.segments[seg].pool.len(), seg));
                if let Some(victim) = victim {
                    self.destroy_segment(victim);
                }
            }
        }

        let data = SegmentData {
            kind: SegmentKind::Distal(cell),
            pool: Pool::default(),
        };
        let segment = match self.free_segments.pop() {
            Some(slot) => {
                self.segments[slot] = data;
                slot
            }
            None => {
                self.segments.push(data);
                self.segments.len() - 1
            }
        };
        self.cells[cell].segments.push(segment);
        segment
    }

    /// Adds a synapse from `source` to `segment`, registering it in the
    /// reverse index. Returns `false` without changes when the segment
    /// already has a synapse to that source.
    pub fn create_distal_synapse(
        &mut self,
        segment: SegmentIdx,
        source: CellIdx,
        permanence: f32,
    ) -> bool {
        let pool = &mut self.segments[segment].pool;
        if pool.contains_source(source) {
            return false;
        }
        let slot = pool.len();
        pool.push(source, permanence);
        self.receptors.entry(source).or_default().push((segment, slot));
        true
    }

    /// Removes a segment: unregisters its synapses from the reverse index,
    /// detaches it from its cell, and marks the arena slot for reuse.
    fn destroy_segment(&mut self, segment: SegmentIdx) {
        let sources: Vec<usize> = self.segments[segment]
            .pool
            .iter()
            .map(|syn| syn.source)
            .collect();
        for source in sources {
            if let Some(entries) = self.receptors.get_mut(&source) {
                entries.retain(|&(seg, _)| seg != segment);
                if entries.is_empty() {
                    self.receptors.remove(&source);
                }
            }
        }
        if let Some(cell) = self.segments[segment].owning_cell() {
            self.cells[cell].segments.retain(|&seg| seg != segment);
        }
        self.segments[segment].pool.clear();
        self.free_segments.push(segment);
    }

    /// Counts, for every segment, how many of the given cells it synapses
    /// onto: once over connected synapses (permanence at or above
    /// `connected_threshold`) and once over all positive-permanence ones.
    /// Runs over the reverse index, so cost scales with `active_cells`.
    pub fn distal_activity(
        &self,
        active_cells: &[CellIdx],
        connected_threshold: f32,
    ) -> DistalActivity {
        let mut connected = vec![0u32; self.segments.len()];
        let mut potential = vec![0u32; self.segments.len()];
        for &cell in active_cells {
            if let Some(entries) = self.receptors.get(&cell) {
                for &(segment, slot) in entries {
                    let permanence = self.segments[segment].pool.permanence(slot);
                    if permanence > 0.0 {
                        potential[segment] += 1;
                    }
                    if permanence >= connected_threshold {
                        connected[segment] += 1;
                    }
                }
            }
        }
        DistalActivity {
            connected,
            potential,
        }
    }

    /// Writes the whole graph to a bincode snapshot file.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|err| CorticalError::Serialization(err.to_string()))
    }

    /// Reads a graph back from a bincode snapshot file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let file = File::open(path)?;
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|err| CorticalError::Serialization(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_and_column_index_math() {
        let conn = Connections::new(8, 4);
        assert_eq!(conn.num_cells(), 32);
        assert_eq!(conn.cells_for_column(3), 12..16);
        assert_eq!(conn.column_of(12), 3);
        assert_eq!(conn.column_of(15), 3);
        assert_eq!(conn.column_of(16), 4);
    }

    #[test]
    fn proximal_segments_preallocated_per_column() {
        let conn = Connections::new(5, 2);
        assert_eq!(conn.num_segments(), 5);
        for column in 0..5 {
            assert_eq!(conn.segment(column).kind, SegmentKind::Proximal(column));
            assert!(conn.proximal_pool(column).is_empty());
        }
    }

    #[test]
    fn distal_synapse_deduplicates_by_source() {
        let mut conn = Connections::new(2, 4);
        let seg = conn.create_distal_segment(0, None);
        assert!(conn.create_distal_synapse(seg, 5, 0.3));
        assert!(!conn.create_distal_synapse(seg, 5, 0.9));
        assert_eq!(conn.segment(seg).pool.len(), 1);
        assert_eq!(conn.segment(seg).pool.permanence(0), 0.3);
    }

    #[test]
    fn activity_counts_connected_and_potential() {
        let mut conn = Connections::new(2, 4);
        let seg = conn.create_distal_segment(0, None);
        conn.create_distal_synapse(seg, 4, 0.6);
        conn.create_distal_synapse(seg, 5, 0.3);
        conn.create_distal_synapse(seg, 6, 0.6);

        let activity = conn.distal_activity(&[4, 5], 0.5);
        assert_eq!(activity.connected[seg], 1);
        assert_eq!(activity.potential[seg], 2);

        // Inactive sources contribute nothing.
        let activity = conn.distal_activity(&[7], 0.5);
        assert_eq!(activity.connected[seg], 0);
        assert_eq!(activity.potential[seg], 0);
    }

    #[test]
    fn segment_cap_evicts_fewest_synapses_and_reuses_slot() {
        let mut conn = Connections::new(2, 4);
        let seg_a = conn.create_distal_segment(0, Some(2));
        let seg_b = conn.create_distal_segment(0, Some(2));
        conn.create_distal_synapse(seg_a, 4, 0.6);
        conn.create_distal_synapse(seg_a, 5, 0.6);
        conn.create_distal_synapse(seg_b, 6, 0.6);

        // seg_b has fewer synapses, so a third segment takes its slot.
        let seg_c = conn.create_distal_segment(0, Some(2));
        assert_eq!(seg_c, seg_b);
        assert_eq!(conn.segments_for_cell(0), &[seg_a, seg_c]);
        assert!(conn.segment(seg_c).pool.is_empty());

        // The evicted segment's synapses are gone from the reverse index.
        let activity = conn.distal_activity(&[6], 0.5);
        assert_eq!(activity.connected[seg_c], 0);

        // The surviving segment still sees its sources.
        let activity = conn.distal_activity(&[4, 5], 0.5);
        assert_eq!(activity.connected[seg_a], 2);
    }

    #[test]
    fn snapshot_round_trips_through_bincode() {
        let mut conn = Connections::new(4, 4);
        conn.proximal_pool_mut(1).push(9, 0.42);
        let seg = conn.create_distal_segment(6, None);
        conn.create_distal_synapse(seg, 2, 0.55);
        conn.column_mut(1).boost = 1.5;

        let bytes = bincode::serialize(&conn).unwrap();
        let restored: Connections = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored.num_columns(), 4);
        assert_eq!(restored.proximal_pool(1).permanence(0), 0.42);
        assert_eq!(restored.segments_for_cell(6), &[seg]);
        assert_eq!(restored.column(1).boost, 1.5);

        let activity = restored.distal_activity(&[2], 0.5);
        assert_eq!(activity.connected[seg], 1);
    }
}
