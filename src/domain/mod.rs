//! Domain layer - Identifiers and port definitions
//!
//! This module defines the composite identifier codec and the array client
//! port that adapters implement, following hexagonal architecture principles.

pub mod ids;
pub mod ports;

pub use ids::*;
pub use ports::*;
