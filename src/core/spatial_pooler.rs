//! The Spatial Pooler turns a binary input vector into a sparse set of
//! active columns.
//!
//! Each column owns a proximal synapse pool into a random subset of the
//! input space (its potential field). A step computes every column's
//! overlap (the number of connected synapses on active input bits),
//! multiplies it by the column's boost factor, and lets columns compete
//! through inhibition so that roughly a fixed number win. With learning
//! enabled, winners strengthen synapses to active inputs and weaken the
//! rest, while duty-cycle bookkeeping boosts columns that never win and
//! bumps columns whose input has drifted away.
//!
//! All randomness is derived per column from the configured seed, so
//! construction and learning are reproducible regardless of call order.

use log::{debug, trace};
use rand::{rngs::StdRng, seq::IteratorRandom, Rng, SeedableRng};

use super::config::SpatialPoolerParams;
use super::connections::Connections;
use super::topology::Topology;
use crate::{CorticalError, Result};

/// An independent RNG stream for one column, derived from the model seed.
fn column_rng(seed: u64, column: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add((column as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)))
}

/// Learns a sparse columnar encoding of the input space. Owns the
/// algorithm state (duty-cycle floors, inhibition radius, iteration
/// counters); the synapses themselves live in [`Connections`].
pub struct SpatialPooler {
    params: SpatialPoolerParams,
    input_topology: Topology,
    column_topology: Topology,
    num_inputs: usize,
    num_columns: usize,

    /// Steps computed so far, learning or not.
    iteration: u32,

    /// Neighborhood half-width used by local inhibition and local
    /// duty-cycle floors. Re-estimated every `duty_cycle_period`.
    inhibition_radius: usize,

    /// Per-column duty-cycle floors, refreshed every `duty_cycle_period`.
    min_overlap_duty_cycles: Vec<f32>,
    min_active_duty_cycles: Vec<f32>,

    /// Dense image of the latest winner set.
    active_columns: Vec<bool>,
}

impl SpatialPooler {
    /// Validates the parameters and initializes every column's potential
    /// pool in `conn`, which must have been created with the matching
    /// column count.
    pub fn new(params: SpatialPoolerParams, conn: &mut Connections) -> Result<Self> {
        params.validate()?;

        let input_topology = Topology::new(&params.input_dimensions);
        let column_topology = Topology::new(&params.column_dimensions);
        let num_inputs = input_topology.len();
        let num_columns = column_topology.len();

        if conn.num_columns() != num_columns {
            return Err(CorticalError::InvalidParameter {
                name: "column_dimensions",
                message: format!(
                    "product {} does not match the graph's {} columns",
                    num_columns,
                    conn.num_columns()
                ),
            });
        }

        let mut pooler = Self {
            params,
            input_topology,
            column_topology,
            num_inputs,
            num_columns,
            iteration: 0,
            inhibition_radius: 1,
            min_overlap_duty_cycles: vec![0.0; num_columns],
            min_active_duty_cycles: vec![0.0; num_columns],
            active_columns: vec![false; num_columns],
        };
        pooler.init_potential_pools(conn)?;
        pooler.update_inhibition_radius(conn);

        debug!(
            "spatial pooler ready: {} columns over {} inputs, {} winners, initial inhibition radius {}",
            pooler.num_columns,
            pooler.num_inputs,
            pooler.params.num_active_columns,
            pooler.inhibition_radius
        );
        Ok(pooler)
    }

    /// One time step. Computes overlaps, runs inhibition, and (with
    /// `learn`) adapts winner synapses and duty-cycle state. Returns the
    /// winning columns in ascending order.
    pub fn compute(
        &mut self,
        conn: &mut Connections,
        input: &[bool],
        learn: bool,
    ) -> Result<Vec<usize>> {
        if input.len() != self.num_inputs {
            return Err(CorticalError::InputSizeMismatch {
                expected: self.num_inputs,
                actual: input.len(),
            });
        }

        self.iteration += 1;
        self.compute_overlaps(conn, input);

        let boosted: Vec<f32> = (0..self.num_columns)
            .map(|column| {
                let data = conn.column(column);
                data.overlap as f32 * data.boost
            })
            .collect();

        let winners = if self.params.global_inhibition
            || self.inhibition_radius >= self.max_column_dimension()
        {
            self.inhibit_global(conn, &boosted)
        } else {
            self.inhibit_local(conn, &boosted)
        };

        self.active_columns.fill(false);
        for &column in &winners {
            self.active_columns[column] = true;
        }

        if learn {
            self.adapt_synapses(conn, input, &winners);
            self.update_duty_cycles(conn, &winners);
            self.update_boost_factors(conn);
            if self.iteration % self.params.duty_cycle_period == 0 {
                self.update_min_duty_cycles(conn);
                self.bump_up_weak_columns(conn);
                self.update_inhibition_radius(conn);
                trace!(
                    "periodic update at step {}: inhibition radius {}",
                    self.iteration,
                    self.inhibition_radius
                );
            }
        }

        Ok(winners)
    }

    /// As [`Self::compute`], additionally writing the winner set into the
    /// caller's dense buffer, which must span the whole column space.
    pub fn compute_into(
        &mut self,
        conn: &mut Connections,
        input: &[bool],
        learn: bool,
        output: &mut [bool],
    ) -> Result<Vec<usize>> {
        if output.len() != self.num_columns {
            return Err(CorticalError::InputSizeMismatch {
                expected: self.num_columns,
                actual: output.len(),
            });
        }
        let winners = self.compute(conn, input, learn)?;
        output.copy_from_slice(&self.active_columns);
        Ok(winners)
    }

    /// Dense view of the latest winner set.
    pub fn active_columns(&self) -> &[bool] {
        &self.active_columns
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn inhibition_radius(&self) -> usize {
        self.inhibition_radius
    }

    /// Grows each column's potential pool: a random `potential_pct`
    /// subsample of the input neighborhood around the column's center,
    /// with permanences scattered around the connected threshold.
    fn init_potential_pools(&mut self, conn: &mut Connections) -> Result<()> {
        for column in 0..self.num_columns {
            let mut rng = column_rng(self.params.seed, column);
            let center = self.input_center(column);
            let field = self.input_topology.neighborhood(
                center,
                self.params.potential_radius,
                self.params.wrap_around,
            );

            let sample_size =
                ((field.len() as f32 * self.params.potential_pct).ceil() as usize).max(1);
            if (self.params.stimulus_threshold.ceil() as usize) > sample_size {
                return Err(CorticalError::InvalidParameter {
                    name: "stimulus_threshold",
                    message: format!(
                        "exceeds the {} potential synapses of column {}",
                        sample_size, column
                    ),
                });
            }

            let mut sources = field.into_iter().choose_multiple(&mut rng, sample_size);
            sources.sort_unstable();

            let pool = conn.proximal_pool_mut(column);
            for source in sources {
                pool.push(source, initial_permanence(&self.params, &mut rng));
            }
            pool.trim(self.params.trim_threshold);
            self.raise_to_stimulus(conn, column);
        }
        Ok(())
    }

    /// Maps a column to the input index at the center of its field.
    fn input_center(&self, column: usize) -> usize {
        let coords = self.column_topology.coordinates(column);
        let centered: Vec<usize> = coords
            .iter()
            .zip(self.column_topology.dims())
            .zip(self.input_topology.dims())
            .map(|((&coord, &col_dim), &in_dim)| {
                let ratio = in_dim as f64 / col_dim as f64;
                (((coord as f64 + 0.5) * ratio) as usize).min(in_dim - 1)
            })
            .collect();
        self.input_topology.flatten(&centered)
    }

    /// Lifts a column's permanences until it can reach the stimulus
    /// threshold. Pool sizes are checked at init, so this terminates.
    fn raise_to_stimulus(&self, conn: &mut Connections, column: usize) {
        let threshold = self.params.stimulus_threshold.ceil() as usize;
        if threshold == 0 {
            return;
        }
        let pool = conn.proximal_pool_mut(column);
        while pool.connected_count(self.params.syn_perm_connected) < threshold {
            pool.bump_all(self.params.syn_perm_below_stimulus_inc);
        }
    }

    /// Connected-synapse overlap with the input, stored per column.
    fn compute_overlaps(&self, conn: &mut Connections, input: &[bool]) {
        for column in 0..self.num_columns {
            let overlap = conn
                .proximal_pool(column)
                .iter()
                .filter(|syn| {
                    input[syn.source] && syn.is_connected(self.params.syn_perm_connected)
                })
                .count() as u32;
            conn.column_mut(column).overlap = overlap;
        }
    }

    /// Top-k winners over the whole column space. Ties break toward the
    /// lower column index.
    fn inhibit_global(&self, conn: &Connections, boosted: &[f32]) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.num_columns)
            .filter(|&column| self.eligible(conn, boosted, column))
            .collect();
        candidates.sort_by(|&a, &b| boosted[b].total_cmp(&boosted[a]).then(a.cmp(&b)));
        candidates.truncate(self.winners_in(self.num_columns));
        candidates.sort_unstable();
        candidates
    }

    /// A column wins locally when fewer neighbors beat its boosted overlap
    /// than the area's winner budget. Equal overlaps break toward the
    /// lower column index.
    fn inhibit_local(&self, conn: &Connections, boosted: &[f32]) -> Vec<usize> {
        let mut winners = Vec::new();
        for column in 0..self.num_columns {
            if !self.eligible(conn, boosted, column) {
                continue;
            }
            let overlap = boosted[column];
            let hood = self.column_topology.neighborhood(
                column,
                self.inhibition_radius,
                self.params.wrap_around,
            );
            let stronger = hood
                .iter()
                .filter(|&&neighbor| {
                    neighbor != column
                        && (boosted[neighbor] > overlap
                            || (boosted[neighbor] == overlap && neighbor < column))
                })
                .count();
            if stronger < self.winners_in(hood.len()) {
                winners.push(column);
            }
        }
        winners
    }

    /// Winner budget for an inhibition area of `area` columns: the fixed
    /// count when configured, the density target otherwise.
    fn winners_in(&self, area: usize) -> usize {
        if self.params.num_active_columns > 0 {
            self.params.num_active_columns
        } else {
            ((area as f32 * self.params.local_area_density).round() as usize).max(1)
        }
    }

    fn eligible(&self, conn: &Connections, boosted: &[f32], column: usize) -> bool {
        boosted[column] > 0.0
            && conn.column(column).overlap as f32 >= self.params.stimulus_threshold
    }

    /// Hebbian update of winner columns: reward synapses on active input
    /// bits, penalize the rest, trim the noise floor, and keep the column
    /// able to reach the stimulus threshold.
    fn adapt_synapses(&self, conn: &mut Connections, input: &[bool], winners: &[usize]) {
        for &column in winners {
            let pool = conn.proximal_pool_mut(column);
            for slot in 0..pool.len() {
                let delta = if input[pool.source(slot)] {
                    self.params.syn_perm_active_inc
                } else {
                    -self.params.syn_perm_inactive_dec
                };
                pool.nudge(slot, delta);
            }
            pool.trim(self.params.trim_threshold);
            self.raise_to_stimulus(conn, column);
        }
    }

    /// Moving-average update of both duty cycles. The effective period
    /// ramps up with the iteration count so early steps are not drowned
    /// by a long window of implicit zeros.
    fn update_duty_cycles(&mut self, conn: &mut Connections, winners: &[usize]) {
        let period = self.params.duty_cycle_period.min(self.iteration) as f32;
        for column in 0..self.num_columns {
            let data = conn.column_mut(column);
            let overlapped = if data.overlap > 0 { 1.0 } else { 0.0 };
            data.overlap_duty_cycle =
                (data.overlap_duty_cycle * (period - 1.0) + overlapped) / period;
            data.active_duty_cycle = (data.active_duty_cycle * (period - 1.0)) / period;
        }
        for &column in winners {
            conn.column_mut(column).active_duty_cycle += 1.0 / period;
        }
    }

    /// Boost ramps linearly from `max_boost` at zero activity down to 1 at
    /// the column's minimum duty cycle, and stays 1 above it.
    fn update_boost_factors(&mut self, conn: &mut Connections) {
        for column in 0..self.num_columns {
            let min_duty = self.min_active_duty_cycles[column];
            let data = conn.column_mut(column);
            data.boost = if min_duty <= 0.0 || data.active_duty_cycle > min_duty {
                1.0
            } else {
                let ramp =
                    ((1.0 - self.params.max_boost) / min_duty) * data.active_duty_cycle
                        + self.params.max_boost;
                ramp.clamp(1.0, self.params.max_boost)
            };
        }
    }

    /// Refreshes each column's duty-cycle floors as a fraction of the best
    /// duty cycle in scope (the whole region under global inhibition, the
    /// inhibition neighborhood otherwise).
    fn update_min_duty_cycles(&mut self, conn: &Connections) {
        let global = self.params.global_inhibition
            || self.inhibition_radius >= self.max_column_dimension();
        if global {
            let mut max_overlap: f32 = 0.0;
            let mut max_active: f32 = 0.0;
            for column in 0..self.num_columns {
                let data = conn.column(column);
                max_overlap = max_overlap.max(data.overlap_duty_cycle);
                max_active = max_active.max(data.active_duty_cycle);
            }
            let min_overlap = max_overlap * self.params.min_pct_overlap_duty_cycles;
            let min_active = max_active * self.params.min_pct_active_duty_cycles;
            self.min_overlap_duty_cycles.fill(min_overlap);
            self.min_active_duty_cycles.fill(min_active);
        } else {
            for column in 0..self.num_columns {
                let hood = self.column_topology.neighborhood(
                    column,
                    self.inhibition_radius,
                    self.params.wrap_around,
                );
                let mut max_overlap: f32 = 0.0;
                let mut max_active: f32 = 0.0;
                for &neighbor in &hood {
                    let data = conn.column(neighbor);
                    max_overlap = max_overlap.max(data.overlap_duty_cycle);
                    max_active = max_active.max(data.active_duty_cycle);
                }
                self.min_overlap_duty_cycles[column] =
                    max_overlap * self.params.min_pct_overlap_duty_cycles;
                self.min_active_duty_cycles[column] =
                    max_active * self.params.min_pct_active_duty_cycles;
            }
        }
    }

    /// Columns whose overlap duty cycle fell below their floor get every
    /// pooled permanence nudged upward, reviving their receptive field.
    fn bump_up_weak_columns(&self, conn: &mut Connections) {
        for column in 0..self.num_columns {
            if conn.column(column).overlap_duty_cycle < self.min_overlap_duty_cycles[column] {
                conn.proximal_pool_mut(column)
                    .bump_all(self.params.syn_perm_below_stimulus_inc);
            }
        }
    }

    /// Estimates the inhibition radius from the average connected receptive
    /// field span, converted from input units to column units.
    fn update_inhibition_radius(&mut self, conn: &Connections) {
        if self.params.global_inhibition {
            self.inhibition_radius = self.max_column_dimension();
            return;
        }

        let ndim = self.input_topology.dims().len();
        let mut total_span = 0.0f64;
        for column in 0..self.num_columns {
            let mut mins = vec![usize::MAX; ndim];
            let mut maxs = vec![0usize; ndim];
            let mut connected = false;
            for syn in conn.proximal_pool(column).iter() {
                if !syn.is_connected(self.params.syn_perm_connected) {
                    continue;
                }
                connected = true;
                for (axis, &coord) in self.input_topology.coordinates(syn.source).iter().enumerate()
                {
                    mins[axis] = mins[axis].min(coord);
                    maxs[axis] = maxs[axis].max(coord);
                }
            }
            if connected {
                let span: f64 = mins
                    .iter()
                    .zip(&maxs)
                    .map(|(&lo, &hi)| (hi - lo + 1) as f64)
                    .sum::<f64>()
                    / ndim as f64;
                total_span += span;
            }
        }

        let avg_span = total_span / self.num_columns as f64;
        let columns_per_input: f64 = self
            .column_topology
            .dims()
            .iter()
            .zip(self.input_topology.dims())
            .map(|(&col_dim, &in_dim)| col_dim as f64 / in_dim as f64)
            .sum::<f64>()
            / ndim as f64;
        let diameter = avg_span * columns_per_input;
        self.inhibition_radius = (((diameter - 1.0) / 2.0).round().max(1.0)) as usize;
    }

    fn max_column_dimension(&self) -> usize {
        self.column_topology.dims().iter().max().copied().unwrap_or(1)
    }
}

/// Initial permanence for one pooled synapse: `init_connected_pct` of them
/// start above the connected threshold, the rest below it.
fn initial_permanence(params: &SpatialPoolerParams, rng: &mut StdRng) -> f32 {
    let connected = params.syn_perm_connected;
    if rng.random::<f32>() <= params.init_connected_pct {
        connected + (1.0 - connected) * rng.random::<f32>()
    } else {
        connected * rng.random::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(params: SpatialPoolerParams) -> (SpatialPooler, Connections) {
        let num_columns = params.column_dimensions.iter().product();
        let mut conn = Connections::new(num_columns, 1);
        let pooler = SpatialPooler::new(params, &mut conn).unwrap();
        (pooler, conn)
    }

    fn striped_input(len: usize, stride: usize) -> Vec<bool> {
        (0..len).map(|i| i % stride == 0).collect()
    }

    #[test]
    fn rejects_input_length_mismatch() {
        let (mut pooler, mut conn) = make(SpatialPoolerParams {
            input_dimensions: vec![64],
            column_dimensions: vec![128],
            num_active_columns: 8,
            ..Default::default()
        });
        let err = pooler.compute(&mut conn, &[true; 63], true).unwrap_err();
        assert!(matches!(
            err,
            CorticalError::InputSizeMismatch {
                expected: 64,
                actual: 63
            }
        ));
    }

    #[test]
    fn global_inhibition_selects_exactly_k_sorted_winners() {
        let (mut pooler, mut conn) = make(SpatialPoolerParams {
            input_dimensions: vec![256],
            column_dimensions: vec![512],
            num_active_columns: 10,
            potential_radius: 256,
            ..Default::default()
        });
        let input = striped_input(256, 3);
        for _ in 0..5 {
            let winners = pooler.compute(&mut conn, &input, true).unwrap();
            assert_eq!(winners.len(), 10);
            assert!(winners.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn density_setting_controls_winner_count() {
        let (mut pooler, mut conn) = make(SpatialPoolerParams {
            input_dimensions: vec![256],
            column_dimensions: vec![500],
            num_active_columns: 0,
            local_area_density: 0.02,
            potential_radius: 256,
            ..Default::default()
        });
        let winners = pooler
            .compute(&mut conn, &striped_input(256, 3), true)
            .unwrap();
        assert_eq!(winners.len(), 10);
    }

    #[test]
    fn same_seed_same_trajectory() {
        let params = SpatialPoolerParams {
            input_dimensions: vec![128],
            column_dimensions: vec![256],
            num_active_columns: 8,
            ..Default::default()
        };
        let (mut a, mut conn_a) = make(params.clone());
        let (mut b, mut conn_b) = make(params);
        let input = striped_input(128, 4);
        for _ in 0..20 {
            let wa = a.compute(&mut conn_a, &input, true).unwrap();
            let wb = b.compute(&mut conn_b, &input, true).unwrap();
            assert_eq!(wa, wb);
        }
    }

    #[test]
    fn permanences_and_boosts_stay_bounded() {
        let (mut pooler, mut conn) = make(SpatialPoolerParams {
            input_dimensions: vec![64],
            column_dimensions: vec![128],
            num_active_columns: 6,
            duty_cycle_period: 20,
            ..Default::default()
        });
        let inputs = [striped_input(64, 2), striped_input(64, 5)];
        for step in 0..120 {
            pooler.compute(&mut conn, &inputs[step % 2], true).unwrap();
        }
        for column in 0..128 {
            let data = conn.column(column);
            assert!(data.boost >= 1.0 && data.boost <= 10.0);
            assert!((0.0..=1.0).contains(&data.active_duty_cycle));
            assert!((0.0..=1.0).contains(&data.overlap_duty_cycle));
            for syn in conn.proximal_pool(column).iter() {
                assert!((0.0..=1.0).contains(&syn.permanence));
            }
        }
    }

    #[test]
    fn local_inhibition_stays_sparse() {
        let (mut pooler, mut conn) = make(SpatialPoolerParams {
            input_dimensions: vec![128],
            column_dimensions: vec![128],
            num_active_columns: 4,
            global_inhibition: false,
            potential_radius: 8,
            ..Default::default()
        });
        let input = striped_input(128, 3);
        for _ in 0..10 {
            let winners = pooler.compute(&mut conn, &input, true).unwrap();
            assert!(!winners.is_empty());
            // Any interval of width radius holds at most k winners: the
            // weakest of a denser cluster would see k stronger neighbors.
            let radius = pooler.inhibition_radius();
            for &w in &winners {
                let cluster = winners
                    .iter()
                    .filter(|&&o| o >= w && o - w <= radius)
                    .count();
                assert!(cluster <= 4);
            }
        }
    }

    #[test]
    fn dense_view_matches_sparse_winners() {
        let (mut pooler, mut conn) = make(SpatialPoolerParams {
            input_dimensions: vec![64],
            column_dimensions: vec![128],
            num_active_columns: 5,
            ..Default::default()
        });
        let mut dense = vec![false; 128];
        let winners = pooler
            .compute_into(&mut conn, &striped_input(64, 2), false, &mut dense)
            .unwrap();
        for column in 0..128 {
            assert_eq!(dense[column], winners.contains(&column));
        }
        assert_eq!(dense, pooler.active_columns());

        let err = pooler
            .compute_into(&mut conn, &striped_input(64, 2), false, &mut [false; 5])
            .unwrap_err();
        assert!(matches!(err, CorticalError::InputSizeMismatch { .. }));
    }
}
