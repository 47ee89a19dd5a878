//! Indicator snapshot computation.
//!
//! The engine is pure: the same window always yields the same snapshot, and
//! no I/O happens here. The preferred path computes the full indicator set
//! with the `ta` crate (plus a few indicators it lacks, computed directly
//! over the window); building without the `ta-lib` feature switches to a
//! documented fallback subset. Either way, nothing non-finite leaves the
//! engine: every field is scrubbed to its neutral default at the boundary.

pub mod engine;
pub mod extra;
pub mod fallback;

pub use engine::{IndicatorEngine, SnapshotResult, MIN_BARS};
