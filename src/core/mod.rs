//! Core HTM components: the connectivity graph and the two algorithms that
//! read and mutate it.

pub mod cells;
pub mod config;
pub mod connections;
pub mod spatial_pooler;
pub mod temporal_memory;
pub mod topology;
