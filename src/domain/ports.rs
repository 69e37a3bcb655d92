//! Domain Ports - Core trait definitions for the replication operator
//!
//! [`ArrayClient`] is the boundary to an array's management plane. The
//! orchestrators only ever talk to arrays through it; the REST gateway client
//! and the in-memory array both implement it.

use crate::config::ArrayConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error code an RCG reports when it is healthy
pub const RCG_NO_ERROR: i64 = 65;

// =============================================================================
// System Types
// =============================================================================

/// Administrative grouping of storage resources on one array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionDomain {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub system_id: String,
}

/// Peer relationship between the metadata managers of two arrays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMdm {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_id: String,
    pub peer_system_id: String,
    #[serde(default, rename = "couplingRC")]
    pub coupling_rc: Option<String>,
}

/// Storage pool inside a protection domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePool {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub protection_domain_id: String,
}

// =============================================================================
// Volume Types
// =============================================================================

/// Point in time as the array reports it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayTimestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl ArrayTimestamp {
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// Single nanosecond-resolution value, saturating at the `i64` range
    pub fn as_nanos(&self) -> i64 {
        self.seconds
            .saturating_mul(1_000_000_000)
            .saturating_add(self.nanos as i64)
    }
}

/// Provisioning type of an array volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeType {
    ThinProvisioned,
    ThickProvisioned,
    Snapshot,
}

impl std::fmt::Display for VolumeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeType::ThinProvisioned => write!(f, "ThinProvisioned"),
            VolumeType::ThickProvisioned => write!(f, "ThickProvisioned"),
            VolumeType::Snapshot => write!(f, "Snapshot"),
        }
    }
}

/// Volume or snapshot record on an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayVolume {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub size_in_kb: u64,
    #[serde(default)]
    pub storage_pool_id: String,
    /// Source volume of a snapshot
    #[serde(default)]
    pub ancestor_volume_id: Option<String>,
    /// Snapshot group the snapshot was created in
    #[serde(default)]
    pub consistency_group_id: Option<String>,
    pub volume_type: VolumeType,
    #[serde(default)]
    pub creation_time: ArrayTimestamp,
    /// Whether the array reports the volume as usable
    #[serde(default)]
    pub ready_to_use: bool,
}

impl ArrayVolume {
    pub fn size_bytes(&self) -> u64 {
        self.size_in_kb.saturating_mul(1024)
    }
}

/// Parameters for creating a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeParams {
    pub name: String,
    pub size_in_kb: u64,
    pub storage_pool_id: String,
    pub volume_type: VolumeType,
}

/// I/O counters sampled by the array for a volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStatistics {
    pub read_count: u64,
    pub write_count: u64,
    pub sample_seconds: u64,
}

/// Host-side data client registered with an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sdc {
    pub id: String,
    pub sdc_guid: String,
    #[serde(default)]
    pub name: String,
    pub mdm_connection_state: String,
}

// =============================================================================
// Snapshot Types
// =============================================================================

/// One member of a snapshot-group request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDef {
    pub volume_id: String,
    /// `None` lets the array assign the name
    pub snapshot_name: Option<String>,
}

/// Result of one atomic snapshot-of-group call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotGroupResponse {
    pub snapshot_group_id: String,
    pub volume_id_list: Vec<String>,
}

// =============================================================================
// Replication Types
// =============================================================================

/// Replication scope on the local array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConsistencyGroup {
    pub id: String,
    pub name: String,
    pub protection_domain_id: String,
    pub remote_protection_domain_id: String,
    pub destination_system_id: String,
    pub rpo_in_seconds: u64,
    pub curr_consist_mode: String,
    /// Array error code, [`RCG_NO_ERROR`] when healthy
    pub error: i64,
}

/// Parameters for creating an RCG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRcgParams {
    pub name: String,
    pub rpo_in_seconds: u64,
    pub protection_domain_id: String,
    pub remote_protection_domain_id: String,
    pub destination_system_id: String,
}

/// Source/destination volume mapping inside an RCG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationPair {
    pub id: String,
    pub name: String,
    pub local_volume_id: String,
    pub remote_volume_id: String,
    pub replication_consistency_group_id: String,
}

/// Parameters for creating a replication pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePairParams {
    pub name: String,
    pub source_volume_id: String,
    pub destination_volume_id: String,
    pub replication_consistency_group_id: String,
}

/// Actions an array can apply to an RCG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RcgAction {
    Failover,
    Reverse,
    Pause,
    Resume,
    Sync,
}

impl RcgAction {
    /// Gateway action name
    pub fn as_str(&self) -> &'static str {
        match self {
            RcgAction::Failover => "failoverReplicationConsistencyGroup",
            RcgAction::Reverse => "reverseReplicationConsistencyGroup",
            RcgAction::Pause => "pauseReplicationConsistencyGroup",
            RcgAction::Resume => "resumeReplicationConsistencyGroup",
            RcgAction::Sync => "syncNowReplicationConsistencyGroup",
        }
    }
}

// =============================================================================
// Array Client Port
// =============================================================================

/// Port for an array's management plane
#[async_trait]
pub trait ArrayClient: Send + Sync {
    /// Management endpoint this client talks to
    fn endpoint(&self) -> &str;

    /// Establish a session
    async fn authenticate(&self) -> Result<()>;

    /// Management API version reported at login
    async fn login_version(&self) -> Result<String>;

    async fn get_protection_domains(&self) -> Result<Vec<ProtectionDomain>>;

    async fn get_peer_mdms(&self) -> Result<Vec<PeerMdm>>;

    async fn get_storage_pools(&self) -> Result<Vec<StoragePool>>;

    async fn get_volume(&self, volume_id: &str) -> Result<ArrayVolume>;

    /// Resolve a volume name to its ID
    async fn find_volume_id(&self, name: &str) -> Result<String>;

    /// Create a volume and return its ID
    async fn create_volume(&self, params: CreateVolumeParams) -> Result<String>;

    async fn set_volume_name(&self, volume_id: &str, name: &str) -> Result<()>;

    async fn get_volume_statistics(&self, volume_id: &str) -> Result<VolumeStatistics>;

    async fn find_sdc_by_guid(&self, guid: &str) -> Result<Sdc>;

    /// Snapshot a set of volumes as one atomic group
    async fn snapshot_volumes(&self, defs: &[SnapshotDef]) -> Result<SnapshotGroupResponse>;

    /// Create an RCG and return its ID
    async fn create_replication_consistency_group(&self, params: CreateRcgParams)
        -> Result<String>;

    async fn get_replication_consistency_group(
        &self,
        rcg_id: &str,
    ) -> Result<ReplicationConsistencyGroup>;

    async fn delete_replication_consistency_group(&self, rcg_id: &str) -> Result<()>;

    async fn execute_rcg_action(&self, rcg_id: &str, action: RcgAction) -> Result<()>;

    /// Create a replication pair and return its ID
    async fn create_replication_pair(&self, params: CreatePairParams) -> Result<String>;
}

/// Port for building clients from configuration
pub trait ArrayConnector: Send + Sync {
    fn connect(&self, config: &ArrayConfig) -> Result<ArrayClientRef>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ArrayClientRef = Arc<dyn ArrayClient>;
pub type ArrayConnectorRef = Arc<dyn ArrayConnector>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_nanos() {
        let ts = ArrayTimestamp {
            seconds: 1_700_000_000,
            nanos: 250,
        };
        assert_eq!(ts.as_nanos(), 1_700_000_000_000_000_250);
        assert_eq!(ArrayTimestamp::from_seconds(2).as_nanos(), 2_000_000_000);
    }

    #[test]
    fn test_volume_size_bytes() {
        let vol = ArrayVolume {
            id: "v1".into(),
            name: "data".into(),
            size_in_kb: 8 * 1024 * 1024,
            storage_pool_id: "sp1".into(),
            ancestor_volume_id: None,
            consistency_group_id: None,
            volume_type: VolumeType::ThinProvisioned,
            creation_time: ArrayTimestamp::default(),
            ready_to_use: true,
        };
        assert_eq!(vol.size_bytes(), 8 * 1024 * 1024 * 1024);

        let huge = ArrayVolume {
            size_in_kb: u64::MAX / 2,
            ..vol
        };
        assert_eq!(huge.size_bytes(), u64::MAX);
    }

    #[test]
    fn test_timestamp_nanos_saturates() {
        let far = ArrayTimestamp {
            seconds: i64::MAX / 10,
            nanos: 999,
        };
        assert_eq!(far.as_nanos(), i64::MAX);

        let before_epoch = ArrayTimestamp {
            seconds: i64::MIN / 10,
            nanos: 0,
        };
        assert_eq!(before_epoch.as_nanos(), i64::MIN);
    }

    #[test]
    fn test_volume_type_display() {
        assert_eq!(format!("{}", VolumeType::ThinProvisioned), "ThinProvisioned");
        assert_eq!(format!("{}", VolumeType::Snapshot), "Snapshot");
    }
}
