//! Catcorr - cross-correlation of astronomical source catalogues.
//!
//! Two catalogues of detected sources are matched by an external
//! point-matching program. The library:
//! - Serializes private working copies of both catalogues into scratch storage
//! - Runs the selected matcher backend with its tuning parameters
//! - Rebuilds the matched pairs from the original, fully-attributed entries
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use catcorr::{Catalogue, Correlator, Entry};
//!
//! let a = Catalogue::from_entries("frame-1", vec![Entry::pixel(1, 10.0, 10.0).with_mag(5.0)]);
//! let b = Catalogue::from_entries("frame-2", vec![Entry::pixel(7, 10.2, 9.9).with_mag(5.1)]);
//!
//! let (matched_a, matched_b) = Correlator::new(a, b).with_method("pattern").correlate()?;
//! assert_eq!(matched_a.identifiers(), matched_b.identifiers());
//! ```

pub mod backend;
pub mod catalogue;
pub mod config;
mod correlator;
pub mod error;
pub mod exchange;
mod registry;
pub mod scratch;
pub mod tool;
pub(crate) mod working;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Entity model
// ============================================================================

pub use catalogue::{Catalogue, CoordSystem, Entry, Identifier, Position, DEFAULT_MAGNITUDE};

// ============================================================================
// Orchestration
// ============================================================================

pub use config::{CorrelatorConfig, SessionOptions, DEFAULT_TIMEOUT};
pub use correlator::Correlator;
pub use registry::BackendRegistry;

// ============================================================================
// Backends
// ============================================================================

pub use backend::{
    MatchBackend, MatchMethod, OffsetBackend, OffsetTuning, PatternBackend, PatternTuning,
};
pub use tool::{ProcessRunner, ToolRunner, TOOL_DIR_ENV};

// ============================================================================
// Errors
// ============================================================================

pub use error::{Error, ErrorKind, Result, ToolFailure};
