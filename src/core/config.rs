//! Algorithm parameters with construction-time validation.
//!
//! Both parameter structs carry defaults that work for a mid-sized region
//! (2048 columns over a 1024-bit input). Every constructor validates before
//! touching the graph, so a bad configuration fails fast with the offending
//! field named instead of misbehaving steps later.

use serde::{Deserialize, Serialize};

use crate::{CorticalError, Result};

/// Configuration of the Spatial Pooler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialPoolerParams {
    /// Shape of the binary input space.
    pub input_dimensions: Vec<usize>,

    /// Shape of the column space.
    pub column_dimensions: Vec<usize>,

    /// Half-width of a column's potential receptive field in input space.
    pub potential_radius: usize,

    /// Fraction of the potential field a column actually synapses onto.
    pub potential_pct: f32,

    /// Whether inhibition ranks all columns at once or per neighborhood.
    pub global_inhibition: bool,

    /// Number of winners per inhibition area. Zero defers to
    /// `local_area_density`.
    pub num_active_columns: usize,

    /// Target fraction of winners per inhibition area, used only when
    /// `num_active_columns` is zero.
    pub local_area_density: f32,

    /// Minimum connected overlap for a column to compete at all.
    pub stimulus_threshold: f32,

    /// Permanence decrement for pooled-but-inactive inputs during learning.
    pub syn_perm_inactive_dec: f32,

    /// Permanence increment for active inputs during learning.
    pub syn_perm_active_inc: f32,

    /// Permanence at or above which a proximal synapse is connected.
    pub syn_perm_connected: f32,

    /// Increment used when raising starved columns back to stimulus.
    pub syn_perm_below_stimulus_inc: f32,

    /// Permanences at or below this are reset to zero after learning.
    pub trim_threshold: f32,

    /// Fraction of initial permanences drawn above the connected threshold.
    pub init_connected_pct: f32,

    /// Floor on overlap duty cycle, as a fraction of the neighborhood max.
    pub min_pct_overlap_duty_cycles: f32,

    /// Floor on active duty cycle, as a fraction of the neighborhood max.
    pub min_pct_active_duty_cycles: f32,

    /// Averaging window of the duty-cycle EMAs, in steps. Also the cadence
    /// of the periodic maintenance pass (duty-cycle floors, weak-column
    /// bumps, inhibition-radius re-estimation).
    pub duty_cycle_period: u32,

    /// Boost factor for a column that never wins; 1.0 disables boosting.
    pub max_boost: f32,

    /// Whether input and column spaces wrap at their edges.
    pub wrap_around: bool,

    /// Seed for all randomness in initialization and learning.
    pub seed: u64,
}

impl Default for SpatialPoolerParams {
    fn default() -> Self {
        Self {
            input_dimensions: vec![1024],
            column_dimensions: vec![2048],
            potential_radius: 16,
            potential_pct: 0.5,
            global_inhibition: true,
            num_active_columns: 40,
            local_area_density: 0.0,
            stimulus_threshold: 0.0,
            syn_perm_inactive_dec: 0.008,
            syn_perm_active_inc: 0.05,
            syn_perm_connected: 0.10,
            syn_perm_below_stimulus_inc: 0.01,
            trim_threshold: 0.025,
            init_connected_pct: 0.5,
            min_pct_overlap_duty_cycles: 0.001,
            min_pct_active_duty_cycles: 0.001,
            duty_cycle_period: 1000,
            max_boost: 10.0,
            wrap_around: true,
            seed: 42,
        }
    }
}

impl SpatialPoolerParams {
    /// Checks every field, naming the first offender found.
    pub fn validate(&self) -> Result<()> {
        let num_inputs: usize = self.input_dimensions.iter().product();
        let num_columns: usize = self.column_dimensions.iter().product();

        if self.input_dimensions.is_empty() || num_inputs == 0 {
            return Err(invalid(
                "input_dimensions",
                "must be non-empty with a positive product",
            ));
        }
        if self.column_dimensions.is_empty() || num_columns == 0 {
            return Err(invalid(
                "column_dimensions",
                "must be non-empty with a positive product",
            ));
        }
        if self.potential_pct <= 0.0 || self.potential_pct > 1.0 {
            return Err(invalid("potential_pct", "must be in (0, 1]"));
        }
        if self.num_active_columns > num_columns {
            return Err(invalid(
                "num_active_columns",
                "must not exceed num_columns",
            ));
        }
        if self.num_active_columns == 0
            && !(self.local_area_density > 0.0 && self.local_area_density <= 0.5)
        {
            return Err(invalid(
                "local_area_density",
                "must be in (0, 0.5] when num_active_columns is 0",
            ));
        }
        if self.stimulus_threshold < 0.0 {
            return Err(invalid("stimulus_threshold", "must be non-negative"));
        }
        if !(0.0..1.0).contains(&self.syn_perm_connected) {
            return Err(invalid("syn_perm_connected", "must be in [0, 1)"));
        }
        for (name, value) in [
            ("syn_perm_inactive_dec", self.syn_perm_inactive_dec),
            ("syn_perm_active_inc", self.syn_perm_active_inc),
            ("syn_perm_below_stimulus_inc", self.syn_perm_below_stimulus_inc),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, "must be in [0, 1]"));
            }
        }
        if self.stimulus_threshold > 0.0 && self.syn_perm_below_stimulus_inc <= 0.0 {
            return Err(invalid(
                "syn_perm_below_stimulus_inc",
                "must be positive when stimulus_threshold is above zero",
            ));
        }
        if self.trim_threshold < 0.0 {
            return Err(invalid("trim_threshold", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.init_connected_pct) {
            return Err(invalid("init_connected_pct", "must be in [0, 1]"));
        }
        if self.max_boost < 1.0 {
            return Err(invalid("max_boost", "must be at least 1.0"));
        }
        if self.duty_cycle_period == 0 {
            return Err(invalid("duty_cycle_period", "must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration of Temporal Memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalMemoryParams {
    /// Cells per column; contexts a column can represent.
    pub cells_per_column: usize,

    /// Active connected synapses needed to put a segment in active state.
    pub activation_threshold: u32,

    /// Active potential synapses needed for a segment to count as matching.
    pub min_threshold: u32,

    /// Permanence of newly grown distal synapses.
    pub initial_permanence: f32,

    /// Permanence at or above which a distal synapse is connected.
    pub connected_permanence: f32,

    /// Permanence reward for synapses onto the previous winner cells.
    pub permanence_increment: f32,

    /// Permanence penalty for the remaining synapses during adaptation.
    pub permanence_decrement: f32,

    /// Upper bound on synapses grown onto a segment per step.
    pub max_new_synapse_count: usize,

    /// Optional cap on distal segments per cell; growing past it evicts
    /// the cell's segment with the fewest synapses.
    pub max_segments_per_cell: Option<usize>,

    /// Seed for growth-target sampling.
    pub seed: u64,
}

impl Default for TemporalMemoryParams {
    fn default() -> Self {
        Self {
            cells_per_column: 32,
            activation_threshold: 13,
            min_threshold: 10,
            initial_permanence: 0.21,
            connected_permanence: 0.5,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            max_new_synapse_count: 20,
            max_segments_per_cell: None,
            seed: 42,
        }
    }
}

impl TemporalMemoryParams {
    /// Checks every field, naming the first offender found.
    pub fn validate(&self) -> Result<()> {
        if self.cells_per_column == 0 {
            return Err(invalid("cells_per_column", "must be at least 1"));
        }
        if self.activation_threshold == 0 {
            return Err(invalid("activation_threshold", "must be at least 1"));
        }
        if self.min_threshold == 0 || self.min_threshold > self.activation_threshold {
            return Err(invalid(
                "min_threshold",
                "must be in 1..=activation_threshold",
            ));
        }
        for (name, value) in [
            ("initial_permanence", self.initial_permanence),
            ("connected_permanence", self.connected_permanence),
            ("permanence_increment", self.permanence_increment),
            ("permanence_decrement", self.permanence_decrement),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, "must be in [0, 1]"));
            }
        }
        if self.max_new_synapse_count == 0 {
            return Err(invalid("max_new_synapse_count", "must be at least 1"));
        }
        if self.max_segments_per_cell == Some(0) {
            return Err(invalid("max_segments_per_cell", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, message: &str) -> CorticalError {
    CorticalError::InvalidParameter {
        name,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SpatialPoolerParams::default().validate().is_ok());
        assert!(TemporalMemoryParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_excess_winner_count() {
        let params = SpatialPoolerParams {
            column_dimensions: vec![16],
            num_active_columns: 17,
            ..Default::default()
        };
        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            CorticalError::InvalidParameter {
                name: "num_active_columns",
                ..
            }
        ));
    }

    #[test]
    fn requires_a_density_setting() {
        let params = SpatialPoolerParams {
            num_active_columns: 0,
            local_area_density: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = SpatialPoolerParams {
            num_active_columns: 0,
            local_area_density: 0.02,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn stimulus_threshold_needs_a_raise_increment() {
        // With no raise increment the pooler could never lift a starved
        // column back to the stimulus threshold.
        let params = SpatialPoolerParams {
            stimulus_threshold: 2.0,
            syn_perm_below_stimulus_inc: 0.0,
            ..Default::default()
        };
        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            CorticalError::InvalidParameter {
                name: "syn_perm_below_stimulus_inc",
                ..
            }
        ));

        // A zero increment is fine while the threshold itself is zero.
        let params = SpatialPoolerParams {
            stimulus_threshold: 0.0,
            syn_perm_below_stimulus_inc: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_min_threshold_above_activation() {
        let params = TemporalMemoryParams {
            activation_threshold: 8,
            min_threshold: 9,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_zero_segment_cap() {
        let params = TemporalMemoryParams {
            max_segments_per_cell: Some(0),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
