//! Control Plane Module
//!
//! Orchestrates replication protection groups, remote replicas and
//! volume-group snapshots across arrays, and exposes them over REST.

pub mod api;
pub mod connectivity;
pub mod group_snapshot;
pub mod remote_volume;
pub mod replication;
pub mod service;

pub use api::*;
pub use connectivity::{ValidateConnectivityRequest, ValidateConnectivityResponse};
pub use group_snapshot::{
    CreateVolumeGroupSnapshotRequest, CreateVolumeGroupSnapshotResponse, Snapshot,
};
pub use remote_volume::{CreateRemoteVolumeResponse, CreateVolumeRequest, Volume};
pub use replication::{
    CreateProtectionGroupResponse, ProtectionGroupState, ProtectionGroupStatus,
    ReplicationAction, ReplicationCapabilities, ReplicationCapability,
};
pub use service::{ExtensionService, Parameters};
