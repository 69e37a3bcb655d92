//! Storage Replication Operator
//!
//! Cross-array replication and consistency-group snapshot extensions for a
//! block-storage array's management plane.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         REST API (axum)                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                       Extension Service                                 │
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────────────┐ │
//! │  │ Protection Group │ │  Remote Volume   │ │  Volume Group Snapshot   │ │
//! │  │   Orchestrator   │ │   Provisioner    │ │      Orchestrator        │ │
//! │  └────────┬─────────┘ └────────┬─────────┘ └────────────┬─────────────┘ │
//! │           └────────────────────┼────────────────────────┘               │
//! │                    ┌───────────┴───────────┐                            │
//! │                    │    System Registry    │                            │
//! │                    └───────────┬───────────┘                            │
//! ├────────────────────────────────┼────────────────────────────────────────┤
//! │                        Array Client Port                                │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────┐   │
//! │  │   REST Gateway (reqwest)    │  │        In-Memory Array          │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: extension operations and the REST API
//! - [`array`]: system registry and array client adapters
//! - [`domain`]: composite IDs and the array client port
//! - [`config`]: array and service configuration
//! - [`metrics`]: Prometheus operation metrics
//! - [`error`]: error types and status codes

pub mod array;
pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use array::{
    GatewayClient, GatewayConnector, InMemoryArray, InMemoryConnector, SystemRegistry,
};

pub use config::{ArrayConfig, GatewayConfig, ServiceConfig};

pub use controlplane::{
    ApiServer, ApiServerConfig, ExtensionService, Parameters, ProtectionGroupState,
    ReplicationAction, RestRouter,
};

pub use domain::ids::CompositeId;
pub use domain::ports::{ArrayClient, ArrayClientRef, ArrayConnector, ArrayConnectorRef};

pub use error::{Error, Result, StatusCode};

pub use metrics::OperationMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
