//! mailsweep runtime - the scan engine
//!
//! Wires discovery, existence filtering and page scanning into one run:
//! - Domain discovery over pluggable providers and domain sources
//! - Shared statistics with write-through email persistence
//! - Fixed-size worker pool over a pre-loaded queue
//! - Periodic progress snapshots
//! - Run orchestration with cooperative stop

pub mod discovery;
pub mod engine;
pub mod persist;
pub mod queue;
pub mod stats;

pub use discovery::*;
pub use engine::*;
pub use persist::*;
pub use queue::*;
pub use stats::*;
