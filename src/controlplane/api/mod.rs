//! API Module
//!
//! REST surface for the replication, snapshot and connectivity operations.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
