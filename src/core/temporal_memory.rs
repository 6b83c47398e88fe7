//! Temporal Memory learns sequences over the column activations produced
//! by the Spatial Pooler.
//!
//! Every column holds `cells_per_column` cells, so the same column can
//! appear in many temporal contexts. When a column activates and one of
//! its cells was predicted by the previous step, only that cell fires.
//! When no cell was predicted the whole column bursts and one winner cell
//! is chosen to learn the new context: the owner of the best partial
//! match if one exists, otherwise the column's least-used cell, which
//! grows a fresh distal segment toward the previous winner cells.
//!
//! Prediction is read off the distal graph at the end of each step: a
//! cell is predictive when one of its segments has at least
//! `activation_threshold` connected synapses onto currently active cells.
//!
//! The step boundary is explicit. All fields describe the state after the
//! latest `compute`; the next `compute` reads them as the previous step.

use fxhash::FxHashSet;
use log::debug;
use rand::{rngs::StdRng, seq::IteratorRandom, SeedableRng};
use std::cmp::Reverse;

use super::cells::{CellIdx, ColumnIdx, SegmentIdx, SegmentKind};
use super::config::TemporalMemoryParams;
use super::connections::Connections;
use crate::{CorticalError, Result};

/// Sequence learner over a [`Connections`] graph. Owns the per-step cell
/// and segment state; the distal segments themselves live in the graph.
pub struct TemporalMemory {
    params: TemporalMemoryParams,
    rng: StdRng,

    /// Cells that fired this step, ascending and deduplicated.
    active_cells: Vec<CellIdx>,

    /// One learning cell per active column, ascending.
    winner_cells: Vec<CellIdx>,

    /// Cells predicted to fire next step, ascending and deduplicated.
    predictive_cells: Vec<CellIdx>,

    /// Segments whose connected synapses crossed `activation_threshold`
    /// against this step's active cells, ascending.
    active_segments: Vec<SegmentIdx>,

    /// Segments whose potential synapses crossed `min_threshold`, ascending.
    matching_segments: Vec<SegmentIdx>,

    /// Per-segment potential-synapse activity backing `matching_segments`.
    potential_counts: Vec<u32>,

    /// Active columns that burst this step, ascending.
    bursting_columns: Vec<ColumnIdx>,
}

impl TemporalMemory {
    /// Validates the parameters against the graph's geometry.
    pub fn new(params: TemporalMemoryParams, conn: &Connections) -> Result<Self> {
        params.validate()?;
        if conn.cells_per_column() != params.cells_per_column {
            return Err(CorticalError::InvalidParameter {
                name: "cells_per_column",
                message: format!(
                    "{} does not match the graph's {} cells per column",
                    params.cells_per_column,
                    conn.cells_per_column()
                ),
            });
        }

        let rng = StdRng::seed_from_u64(params.seed);
        debug!(
            "temporal memory ready: {} columns x {} cells, activation threshold {}",
            conn.num_columns(),
            params.cells_per_column,
            params.activation_threshold
        );
        Ok(Self {
            params,
            rng,
            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            predictive_cells: Vec::new(),
            active_segments: Vec::new(),
            matching_segments: Vec::new(),
            potential_counts: Vec::new(),
            bursting_columns: Vec::new(),
        })
    }

    /// One time step over the active columns of the Spatial Pooler, which
    /// must be ascending. Activates predicted cells, bursts unpredicted
    /// columns, learns (when enabled), and recomputes the predictive state
    /// for the next step.
    pub fn compute(
        &mut self,
        conn: &mut Connections,
        active_columns: &[ColumnIdx],
        learn: bool,
    ) -> Result<()> {
        if let Some(&column) = active_columns.iter().find(|&&c| c >= conn.num_columns()) {
            return Err(CorticalError::InvalidParameter {
                name: "active_columns",
                message: format!(
                    "column {} out of range for {} columns",
                    column,
                    conn.num_columns()
                ),
            });
        }

        // Reinforcement keys on the previous winner cells, the same set
        // synapse growth connects to.
        let prev_winners: FxHashSet<CellIdx> = self.winner_cells.iter().copied().collect();

        let mut active_cells = Vec::new();
        let mut winner_cells = Vec::new();
        let mut bursting_columns = Vec::new();

        for &column in active_columns {
            let predicted = self.predicted_cells_in(conn, column);
            if predicted.is_empty() {
                bursting_columns.push(column);
                let winner = self.burst_column(conn, column, &prev_winners, learn, &mut active_cells);
                winner_cells.push(winner);
            } else {
                self.activate_predicted(conn, &predicted, &prev_winners, learn);
                active_cells.extend_from_slice(&predicted);
                winner_cells.extend_from_slice(&predicted);
            }
        }

        active_cells.sort_unstable();
        active_cells.dedup();
        winner_cells.sort_unstable();
        winner_cells.dedup();

        self.active_cells = active_cells;
        self.winner_cells = winner_cells;
        self.bursting_columns = bursting_columns;
        self.refresh_predictions(conn);
        Ok(())
    }

    /// Forgets all per-step state, ending the current sequence. The learned
    /// synapses stay.
    pub fn reset(&mut self) {
        self.active_cells.clear();
        self.winner_cells.clear();
        self.predictive_cells.clear();
        self.active_segments.clear();
        self.matching_segments.clear();
        self.potential_counts.clear();
        self.bursting_columns.clear();
    }

    pub fn active_cells(&self) -> &[CellIdx] {
        &self.active_cells
    }

    pub fn winner_cells(&self) -> &[CellIdx] {
        &self.winner_cells
    }

    pub fn predictive_cells(&self) -> &[CellIdx] {
        &self.predictive_cells
    }

    /// Columns containing at least one predictive cell, ascending.
    pub fn predictive_columns(&self, conn: &Connections) -> Vec<ColumnIdx> {
        let mut columns: Vec<ColumnIdx> = self
            .predictive_cells
            .iter()
            .map(|&cell| conn.column_of(cell))
            .collect();
        columns.dedup();
        columns
    }

    /// Active columns that had no predicted cell this step.
    pub fn bursting_columns(&self) -> &[ColumnIdx] {
        &self.bursting_columns
    }

    /// The cells of `column` that the previous step marked predictive.
    fn predicted_cells_in(&self, conn: &Connections, column: ColumnIdx) -> Vec<CellIdx> {
        let range = conn.cells_for_column(column);
        let lo = self.predictive_cells.partition_point(|&c| c < range.start);
        let hi = self.predictive_cells.partition_point(|&c| c < range.end);
        self.predictive_cells[lo..hi].to_vec()
    }

    /// Correctly predicted cells fire alone. Their active segments are
    /// reinforced toward what actually happened and topped up with
    /// synapses to the previous winner cells.
    fn activate_predicted(
        &mut self,
        conn: &mut Connections,
        predicted: &[CellIdx],
        prev_winners: &FxHashSet<CellIdx>,
        learn: bool,
    ) {
        if !learn {
            return;
        }
        for &cell in predicted {
            let segments: Vec<SegmentIdx> = conn
                .segments_for_cell(cell)
                .iter()
                .copied()
                .filter(|seg| self.active_segments.binary_search(seg).is_ok())
                .collect();
            for segment in segments {
                self.adapt_segment(conn, segment, prev_winners);
                let missing = self
                    .params
                    .max_new_synapse_count
                    .saturating_sub(self.potential_counts[segment] as usize);
                self.grow_synapses(conn, segment, missing);
            }
        }
    }

    /// Bursts a column: every cell fires, and one winner learns the new
    /// context. Returns the winner cell.
    fn burst_column(
        &mut self,
        conn: &mut Connections,
        column: ColumnIdx,
        prev_winners: &FxHashSet<CellIdx>,
        learn: bool,
        active_cells: &mut Vec<CellIdx>,
    ) -> CellIdx {
        let range = conn.cells_for_column(column);
        active_cells.extend(range.clone());

        // Best partial match from the previous step, if the column has one.
        // Ties on match strength prefer the less-used cell, then the lower
        // cell and segment index.
        let best = range
            .clone()
            .flat_map(|cell| {
                conn.segments_for_cell(cell)
                    .iter()
                    .copied()
                    .map(move |seg| (cell, seg))
            })
            .filter(|(_, seg)| self.matching_segments.binary_search(seg).is_ok())
            .max_by_key(|&(cell, seg)| {
                (
                    self.potential_counts[seg],
                    Reverse(conn.segments_for_cell(cell).len()),
                    Reverse(cell),
                    Reverse(seg),
                )
            });

        if let Some((winner, segment)) = best {
            if learn {
                self.adapt_segment(conn, segment, prev_winners);
                let missing = self
                    .params
                    .max_new_synapse_count
                    .saturating_sub(self.potential_counts[segment] as usize);
                self.grow_synapses(conn, segment, missing);
            }
            winner
        } else {
            let winner = range
                .clone()
                .min_by_key(|&cell| (conn.segments_for_cell(cell).len(), cell))
                .unwrap_or(range.start);
            if learn && !self.winner_cells.is_empty() {
                let segment =
                    conn.create_distal_segment(winner, self.params.max_segments_per_cell);
                self.grow_synapses(conn, segment, self.params.max_new_synapse_count);
            }
            winner
        }
    }

    /// Hebbian reinforcement: synapses onto the previous step's winner
    /// cells gain permanence, all others lose it.
    fn adapt_segment(
        &self,
        conn: &mut Connections,
        segment: SegmentIdx,
        prev_winners: &FxHashSet<CellIdx>,
    ) {
        let pool = &mut conn.segment_mut(segment).pool;
        for slot in 0..pool.len() {
            let delta = if prev_winners.contains(&pool.source(slot)) {
                self.params.permanence_increment
            } else {
                -self.params.permanence_decrement
            };
            pool.nudge(slot, delta);
        }
    }

    /// Grows up to `limit` synapses onto the segment, sampling without
    /// replacement from the previous winner cells it does not already
    /// synapse onto.
    fn grow_synapses(&mut self, conn: &mut Connections, segment: SegmentIdx, limit: usize) {
        if limit == 0 {
            return;
        }
        let candidates: Vec<CellIdx> = self
            .winner_cells
            .iter()
            .copied()
            .filter(|&cell| !conn.segment(segment).pool.contains_source(cell))
            .collect();
        let mut picked = candidates.into_iter().choose_multiple(&mut self.rng, limit);
        picked.sort_unstable();
        for cell in picked {
            conn.create_distal_synapse(segment, cell, self.params.initial_permanence);
        }
    }

    /// Reads next-step predictions off the graph: one pass over the
    /// reverse index for activity, then thresholding into active and
    /// matching segment sets.
    fn refresh_predictions(&mut self, conn: &Connections) {
        let activity = conn.distal_activity(&self.active_cells, self.params.connected_permanence);

        self.active_segments.clear();
        self.matching_segments.clear();
        let mut predictive = Vec::new();
        for segment in 0..conn.num_segments() {
            if activity.connected[segment] >= self.params.activation_threshold {
                self.active_segments.push(segment);
                if let SegmentKind::Distal(cell) = conn.segment(segment).kind {
                    predictive.push(cell);
                }
            }
            if activity.potential[segment] >= self.params.min_threshold {
                self.matching_segments.push(segment);
            }
        }
        predictive.sort_unstable();
        predictive.dedup();
        self.predictive_cells = predictive;
        self.potential_counts = activity.potential;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> TemporalMemoryParams {
        TemporalMemoryParams {
            cells_per_column: 4,
            activation_threshold: 1,
            min_threshold: 1,
            initial_permanence: 0.6,
            connected_permanence: 0.5,
            permanence_increment: 0.1,
            permanence_decrement: 0.05,
            max_new_synapse_count: 4,
            max_segments_per_cell: None,
            seed: 7,
        }
    }

    fn make(num_columns: usize, params: TemporalMemoryParams) -> (TemporalMemory, Connections) {
        let conn = Connections::new(num_columns, params.cells_per_column);
        let tm = TemporalMemory::new(params, &conn).unwrap();
        (tm, conn)
    }

    #[test]
    fn unpredicted_columns_burst() {
        let (mut tm, mut conn) = make(4, fast_params());
        tm.compute(&mut conn, &[0, 2], true).unwrap();

        assert_eq!(tm.bursting_columns(), &[0, 2]);
        let mut expected: Vec<usize> = (0..4).chain(8..12).collect();
        expected.sort_unstable();
        assert_eq!(tm.active_cells(), expected.as_slice());
        // One winner per bursting column.
        assert_eq!(tm.winner_cells().len(), 2);
    }

    #[test]
    fn learns_a_two_step_sequence() {
        let (mut tm, mut conn) = make(4, fast_params());

        // Cycle A(0) -> B(1) until the transition is learned.
        for _ in 0..4 {
            tm.compute(&mut conn, &[0], true).unwrap();
            tm.compute(&mut conn, &[1], true).unwrap();
        }

        tm.compute(&mut conn, &[0], true).unwrap();
        let predicted = tm.predictive_columns(&conn);
        assert_eq!(predicted, vec![1]);

        tm.compute(&mut conn, &[1], true).unwrap();
        assert!(tm.bursting_columns().is_empty());
        // The predicted column fires a single cell, not a burst.
        assert_eq!(tm.active_cells().len(), 1);
        assert_eq!(conn.column_of(tm.active_cells()[0]), 1);
    }

    #[test]
    fn reset_ends_the_sequence() {
        let (mut tm, mut conn) = make(4, fast_params());
        for _ in 0..4 {
            tm.compute(&mut conn, &[0], true).unwrap();
            tm.compute(&mut conn, &[1], true).unwrap();
        }

        let learned = conn.clone();
        tm.reset();
        tm.reset();
        assert!(tm.predictive_cells().is_empty());
        // Reset drops transient state only; the learned graph is untouched.
        assert_eq!(conn, learned);

        // Without context, B has no reason to expect anything: it bursts.
        tm.compute(&mut conn, &[1], true).unwrap();
        assert_eq!(tm.bursting_columns(), &[1]);
    }

    #[test]
    fn burst_tie_prefers_less_used_cell() {
        let (mut tm, mut conn) = make(4, fast_params());

        // Cell 4 owns two segments, cell 5 one. The matching segments tie
        // on strength: one synapse each onto column 0, below the
        // connected threshold so neither predicts.
        let seg_a = conn.create_distal_segment(4, None);
        conn.create_distal_segment(4, None);
        let seg_b = conn.create_distal_segment(5, None);
        conn.create_distal_synapse(seg_a, 0, 0.3);
        conn.create_distal_synapse(seg_b, 1, 0.3);

        tm.compute(&mut conn, &[0], true).unwrap();
        tm.compute(&mut conn, &[1], true).unwrap();

        assert_eq!(tm.bursting_columns(), &[1]);
        assert_eq!(tm.winner_cells(), &[5]);
    }

    #[test]
    fn rejects_out_of_range_column() {
        let (mut tm, mut conn) = make(4, fast_params());
        let err = tm.compute(&mut conn, &[4], true).unwrap_err();
        assert!(matches!(
            err,
            CorticalError::InvalidParameter {
                name: "active_columns",
                ..
            }
        ));
    }

    #[test]
    fn learning_disabled_grows_nothing() {
        let (mut tm, mut conn) = make(4, fast_params());
        for _ in 0..4 {
            tm.compute(&mut conn, &[0], false).unwrap();
            tm.compute(&mut conn, &[1], false).unwrap();
        }
        // Only the preallocated proximal segments exist.
        assert_eq!(conn.num_segments(), 4);
    }

    #[test]
    fn segment_cap_limits_growth_per_cell() {
        let params = TemporalMemoryParams {
            max_segments_per_cell: Some(2),
            ..fast_params()
        };
        let (mut tm, mut conn) = make(6, params);

        // Many different contexts for column 5 force repeated growth.
        for context in 0..5 {
            tm.reset();
            tm.compute(&mut conn, &[context], true).unwrap();
            tm.compute(&mut conn, &[5], true).unwrap();
        }
        for cell in conn.cells_for_column(5) {
            assert!(conn.segments_for_cell(cell).len() <= 2);
        }
    }

    #[test]
    fn repeated_sequence_stabilizes_on_same_cells() {
        let (mut tm, mut conn) = make(8, fast_params());
        for _ in 0..6 {
            tm.compute(&mut conn, &[0, 3], true).unwrap();
            tm.compute(&mut conn, &[1, 6], true).unwrap();
        }

        tm.compute(&mut conn, &[0, 3], true).unwrap();
        tm.compute(&mut conn, &[1, 6], true).unwrap();
        let first = tm.active_cells().to_vec();

        tm.compute(&mut conn, &[0, 3], true).unwrap();
        tm.compute(&mut conn, &[1, 6], true).unwrap();
        assert_eq!(tm.active_cells(), first.as_slice());
    }
}
