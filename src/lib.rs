//! Hierarchical Temporal Memory (HTM) cortical learning core.
//!
//! The crate implements the two cooperating HTM algorithms over a shared
//! connectivity graph:
//!
//! - [`core::spatial_pooler::SpatialPooler`] turns a noisy binary input
//!   vector into a stable sparse set of active columns.
//! - [`core::temporal_memory::TemporalMemory`] learns sequences over those
//!   column activations through distal dendrite segments whose synaptic
//!   permanences adapt online.
//! - [`core::connections::Connections`] owns the whole graph (columns,
//!   cells, segments, synapses) plus the reverse indices both algorithms
//!   need for sparse lookup. It makes no algorithmic decisions itself.
//!
//! Encoders that produce input SDRs and classifiers that consume the output
//! SDRs are external to this crate: the input boundary is a dense `&[bool]`
//! of fixed length, the output boundary is a dense active-column vector plus
//! ascending, deduplicated cell/column index lists.
//!
//! Each time step is one `SpatialPooler::compute` call followed by one
//! `TemporalMemory::compute` call against the same `Connections` instance.
//! Everything is single-threaded and deterministic for a given seed.

pub mod core;

/// Error types for the library.
pub mod error {
    use thiserror::Error;

    /// Main error type for cortical operations.
    #[derive(Error, Debug)]
    pub enum CorticalError {
        /// A configuration value that prevents model construction.
        #[error("invalid parameter '{name}': {message}")]
        InvalidParameter {
            /// Name of the offending parameter.
            name: &'static str,
            /// Description of the violation.
            message: String,
        },

        /// An input or output buffer whose length does not match the
        /// configured dimensionality.
        #[error("buffer length mismatch: expected {expected}, got {actual}")]
        InputSizeMismatch {
            /// The configured length.
            expected: usize,
            /// The length actually supplied.
            actual: usize,
        },

        /// I/O failure while reading or writing a snapshot.
        #[error("i/o error: {0}")]
        Io(#[from] std::io::Error),

        /// Snapshot encoding or decoding failure.
        #[error("serialization error: {0}")]
        Serialization(String),
    }

    /// Result type alias using [`CorticalError`].
    pub type Result<T> = std::result::Result<T, CorticalError>;
}

pub use error::{CorticalError, Result};
