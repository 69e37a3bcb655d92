//! Array access - system registry and array client adapters
//!
//! - [`registry`]: system ID to client mapping with memoized probing
//! - [`gateway`]: client for the array's REST management gateway
//! - [`memory`]: in-process array for standalone mode and tests

pub mod gateway;
pub mod memory;
pub mod registry;

pub use gateway::{GatewayClient, GatewayConnector};
pub use memory::{Fault, InMemoryArray, InMemoryConnector};
pub use registry::{
    resolve_system_id, RegistryStats, SystemEntry, SystemRegistry, SystemSummary,
};
