//! Learns the weekday cycle end to end and shows the region predicting
//! each next day, then round-trips the learned graph through a snapshot.
//!
//! Run with `RUST_LOG=debug` to see the algorithms' setup and periodic
//! maintenance logs.

use anyhow::Result;
use log::info;

use cortical_rs::core::config::{SpatialPoolerParams, TemporalMemoryParams};
use cortical_rs::core::connections::Connections;
use cortical_rs::core::spatial_pooler::SpatialPooler;
use cortical_rs::core::temporal_memory::TemporalMemory;

const DAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];
const BITS_PER_DAY: usize = 28;
const NUM_INPUTS: usize = DAYS.len() * BITS_PER_DAY;
const NUM_COLUMNS: usize = 1024;
const CELLS_PER_COLUMN: usize = 16;

fn day_input(day: usize) -> Vec<bool> {
    let mut input = vec![false; NUM_INPUTS];
    for bit in day * BITS_PER_DAY..(day + 1) * BITS_PER_DAY {
        input[bit] = true;
    }
    input
}

fn main() -> Result<()> {
    env_logger::init();

    let sp_params = SpatialPoolerParams {
        input_dimensions: vec![NUM_INPUTS],
        column_dimensions: vec![NUM_COLUMNS],
        potential_radius: NUM_INPUTS,
        num_active_columns: 20,
        max_boost: 1.0,
        ..Default::default()
    };
    let tm_params = TemporalMemoryParams {
        cells_per_column: CELLS_PER_COLUMN,
        ..Default::default()
    };

    let mut conn = Connections::new(NUM_COLUMNS, CELLS_PER_COLUMN);
    let mut sp = SpatialPooler::new(sp_params, &mut conn)?;
    let mut tm = TemporalMemory::new(tm_params, &conn)?;

    let inputs: Vec<Vec<bool>> = (0..DAYS.len()).map(day_input).collect();
    info!("training on {} cycles of the week", 40);
    for _ in 0..40 {
        for input in &inputs {
            let winners = sp.compute(&mut conn, input, true)?;
            tm.compute(&mut conn, &winners, true)?;
        }
    }

    // Map each day's columnar code once, then read the predictions.
    let mut codes = Vec::new();
    for input in &inputs {
        codes.push(sp.compute(&mut conn, input, false)?);
    }
    for (day, name) in DAYS.iter().enumerate() {
        let winners = sp.compute(&mut conn, &inputs[day], false)?;
        tm.compute(&mut conn, &winners, false)?;
        let predicted = tm.predictive_columns(&conn);

        let best = codes
            .iter()
            .enumerate()
            .max_by_key(|(_, code)| {
                code.iter()
                    .filter(|c| predicted.binary_search(c).is_ok())
                    .count()
            })
            .map(|(d, _)| d)
            .unwrap_or(day);
        println!(
            "after {:<9} the region predicts {:<9} ({} columns predictive, {} bursting)",
            name,
            DAYS[best],
            predicted.len(),
            tm.bursting_columns().len()
        );
    }

    // The whole learned graph survives a snapshot round trip.
    let path = std::env::temp_dir().join("weekdays-graph.bin");
    conn.save(&path)?;
    let restored = Connections::load(&path)?;
    info!(
        "snapshot round trip: {} segments in, {} segments out",
        conn.num_segments(),
        restored.num_segments()
    );
    std::fs::remove_file(&path)?;

    Ok(())
}
