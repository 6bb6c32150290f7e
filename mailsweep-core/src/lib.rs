//! mailsweep core - domain model for mass contact discovery
//!
//! This crate provides the network-free primitives:
//! - Permissive email extraction
//! - Candidate domain normalization, list parsing and synthetic generation
//! - Search engine registry
//! - Scan result and run statistics types

pub mod domains;
pub mod emails;
pub mod scan;
pub mod search_engines;

pub use domains::*;
pub use emails::*;
pub use scan::*;
pub use search_engines::*;
