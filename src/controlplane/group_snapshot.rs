//! Volume-Group-Snapshot Orchestrator
//!
//! Snapshots a set of volumes on one system with a single atomic array call,
//! then describes every member. Members the array left unnamed get a
//! deterministic `<id>-snap-<index>` name written back to the array. All
//! members must report the same creation time.

use crate::controlplane::service::{ExtensionService, Parameters};
use crate::domain::ids::CompositeId;
use crate::domain::ports::SnapshotDef;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Longest group name; member names append `-<index>` of up to three digits
pub const MAX_GROUP_NAME_LEN: usize = 27;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeGroupSnapshotRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "sourceVolumeIDs")]
    pub source_volume_ids: Vec<String>,
    #[serde(default)]
    pub parameters: Parameters,
}

/// One member of a created group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub name: String,
    pub capacity_bytes: u64,
    pub snap_id: String,
    pub source_id: String,
    pub ready_to_use: bool,
    /// Nanoseconds since the epoch
    pub creation_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeGroupSnapshotResponse {
    #[serde(rename = "snapshotGroupID")]
    pub snapshot_group_id: String,
    pub snapshots: Vec<Snapshot>,
    pub creation_time: i64,
}

/// Check the source list and group name
pub fn validate_group_request(name: &str, source_volume_ids: &[String]) -> Result<()> {
    if source_volume_ids.is_empty() {
        return Err(Error::InvalidArgument("SourceVolumeIDs cannot be empty".into()));
    }
    if name.is_empty() {
        warn!("volume group snapshot request has no name");
    }
    if name.len() > MAX_GROUP_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "Requested name {} longer than {} character max",
            name, MAX_GROUP_NAME_LEN
        )));
    }
    Ok(())
}

/// Every member must carry `expected` as its creation time
pub fn check_creation_time(expected: i64, snapshots: &[Snapshot]) -> Result<()> {
    for snap in snapshots {
        if snap.creation_time != expected {
            return Err(Error::Internal(format!(
                "Creation time of snapshot {}, {} does not match expected creation time {}",
                snap.name, snap.creation_time, expected
            )));
        }
        debug!(snapshot = %snap.name, creation_time = expected, "creation time matches");
    }
    Ok(())
}

/// Name given to an unnamed member
pub fn fallback_snapshot_name(array_volume_id: &str, index: usize) -> String {
    format!("{}-snap-{}", array_volume_id, index)
}

impl ExtensionService {
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_volume_group_snapshot(
        &self,
        request: &CreateVolumeGroupSnapshotRequest,
    ) -> Result<CreateVolumeGroupSnapshotResponse> {
        self.instrumented(
            "create_volume_group_snapshot",
            self.create_group_snapshot_inner(request),
        )
        .await
    }

    async fn create_group_snapshot_inner(
        &self,
        request: &CreateVolumeGroupSnapshotRequest,
    ) -> Result<CreateVolumeGroupSnapshotResponse> {
        validate_group_request(&request.name, &request.source_volume_ids)?;

        let system_id = self.group_system_id(&request.source_volume_ids[0])?;
        let client = self.registry().require_probe(&system_id).await?;
        info!(system = %system_id, "creating snapshot consistency group");

        let mut defs = Vec::with_capacity(request.source_volume_ids.len());
        for id in &request.source_volume_ids {
            let volume = CompositeId::decode(id.trim());
            if volume.is_qualified() && volume.system_id() != system_id {
                return Err(Error::Internal(format!(
                    "Source volumes for volume group snapshot should be on the same system but vol {} is not on system: {}",
                    id, system_id
                )));
            }
            client.get_volume(volume.local_id()).await.map_err(|e| {
                Error::internal(format!("failure checking source volume {} status", id), e)
            })?;
            defs.push(SnapshotDef {
                volume_id: volume.local_id().to_string(),
                snapshot_name: None,
            });
        }

        let group = client.snapshot_volumes(&defs).await.map_err(|e| {
            let attempted: Vec<&str> = defs.iter().map(|d| d.volume_id.as_str()).collect();
            Error::internal(
                format!("Failed to create group with snapshots of volumes {:?}", attempted),
                e,
            )
        })?;
        debug!(?group, "snapshot group created");

        let mut snapshots = Vec::with_capacity(group.volume_id_list.len());
        for (index, snap_id) in group.volume_id_list.iter().enumerate() {
            let volume = client
                .get_volume(snap_id)
                .await
                .map_err(|e| Error::internal(format!("Failed to get snapshot {}", snap_id), e))?;

            let in_group =
                volume.consistency_group_id.as_deref() == Some(group.snapshot_group_id.as_str());
            let name = if volume.name.is_empty() && in_group {
                let name = fallback_snapshot_name(&volume.id, index);
                if let Err(e) = client.set_volume_name(&volume.id, &name).await {
                    warn!(snapshot = %volume.id, name = %name, "can't set snapshot name: {}", e);
                }
                name
            } else {
                volume.name.clone()
            };

            let ancestor = volume.ancestor_volume_id.as_deref().ok_or_else(|| {
                Error::Internal(format!("snapshot {} does not report its source volume", volume.id))
            })?;
            let source_id = CompositeId::new(system_id.clone(), ancestor)?.encode();

            snapshots.push(Snapshot {
                name,
                capacity_bytes: volume.size_bytes(),
                snap_id: CompositeId::new(system_id.clone(), volume.id.clone())?.encode(),
                source_id,
                ready_to_use: volume.ready_to_use,
                creation_time: volume.creation_time.as_nanos(),
            });
        }

        let creation_time = snapshots
            .first()
            .map(|s| s.creation_time)
            .ok_or_else(|| Error::Internal("array returned an empty snapshot group".into()))?;
        check_creation_time(creation_time, &snapshots)?;

        let snapshot_group_id = CompositeId::new(system_id, group.snapshot_group_id)?.encode();
        info!(group = %snapshot_group_id, members = snapshots.len(), "volume group snapshot created");

        Ok(CreateVolumeGroupSnapshotResponse {
            snapshot_group_id,
            snapshots,
            creation_time,
        })
    }

    fn group_system_id(&self, first_volume_id: &str) -> Result<String> {
        let id = self.qualify(first_volume_id.trim());
        if id.is_qualified() {
            Ok(id.system_id().to_string())
        } else {
            Err(Error::InvalidArgument(
                "systemID is not found in vol ID and there is no default system".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{Fault, InMemoryArray, SystemRegistry};
    use crate::config::ServiceConfig;
    use crate::error::StatusCode;
    use std::sync::Arc;

    fn setup() -> (Arc<ExtensionService>, Arc<InMemoryArray>) {
        let array = Arc::new(InMemoryArray::new("sysA"));
        array.add_volume_with_id("v1", "vol1", 8 * 1024 * 1024);
        array.add_volume_with_id("v2", "vol2", 16 * 1024 * 1024);

        let registry = SystemRegistry::empty();
        registry.register("sysA", array.clone());
        registry.register("sysB", Arc::new(InMemoryArray::new("sysB")));
        (
            ExtensionService::new(Arc::new(registry), ServiceConfig::default()),
            array,
        )
    }

    fn request(name: &str, ids: &[&str]) -> CreateVolumeGroupSnapshotRequest {
        CreateVolumeGroupSnapshotRequest {
            name: name.to_string(),
            source_volume_ids: ids.iter().map(|s| s.to_string()).collect(),
            parameters: Parameters::new(),
        }
    }

    fn snapshot(name: &str, creation_time: i64) -> Snapshot {
        Snapshot {
            name: name.into(),
            capacity_bytes: 1024,
            snap_id: format!("sysA-{}", name),
            source_id: "sysA-v1".into(),
            ready_to_use: true,
            creation_time,
        }
    }

    #[test]
    fn test_name_length_boundary() {
        let ids = vec!["sysA-v1".to_string()];
        assert!(validate_group_request(&"a".repeat(27), &ids).is_ok());
        let err = validate_group_request(&"a".repeat(28), &ids).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(validate_group_request("", &ids).is_ok());
        assert!(validate_group_request("grp1", &[]).is_err());
    }

    #[test]
    fn test_check_creation_time_names_first_mismatch() {
        let snaps = vec![snapshot("s0", 100), snapshot("s1", 101), snapshot("s2", 102)];
        let err = check_creation_time(100, &snaps).unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.message().contains("s1, 101"));
        assert!(err.message().contains("100"));

        assert!(check_creation_time(5, &[snapshot("a", 5), snapshot("b", 5)]).is_ok());
    }

    #[tokio::test]
    async fn test_create_group_snapshot() {
        let (service, array) = setup();
        let resp = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1", "sysA-v2"]))
            .await
            .unwrap();

        assert!(resp.snapshot_group_id.starts_with("sysA-"));
        let hex = &resp.snapshot_group_id["sysA-".len()..];
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(resp.snapshots.len(), 2);
        assert_eq!(resp.snapshots[0].source_id, "sysA-v1");
        assert_eq!(resp.snapshots[1].source_id, "sysA-v2");
        assert!(resp.snapshots.iter().all(|s| s.ready_to_use));
        assert!(resp.snapshots.iter().all(|s| s.creation_time == resp.creation_time));
        assert_eq!(resp.snapshots[1].capacity_bytes, 16 * 1024 * 1024 * 1024);

        // Unnamed members were given a fallback name on the array too
        let first = CompositeId::decode(&resp.snapshots[0].snap_id);
        let first_id = first.local_id();
        assert_eq!(resp.snapshots[0].name, format!("{}-snap-0", first_id));
        assert_eq!(array.volume(first_id).unwrap().name, resp.snapshots[0].name);
    }

    #[tokio::test]
    async fn test_array_assigned_names_are_kept() {
        let array = Arc::new(InMemoryArray::new("sysA").with_snapshot_auto_naming());
        array.add_volume_with_id("v1", "vol1", 1024);
        let registry = SystemRegistry::empty();
        registry.register("sysA", array);
        let service = ExtensionService::new(Arc::new(registry), ServiceConfig::default());

        let resp = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1"]))
            .await
            .unwrap();
        assert!(resp.snapshots[0].name.starts_with("snapshot-"));
    }

    #[tokio::test]
    async fn test_set_name_failure_is_not_fatal() {
        let (service, array) = setup();
        array.inject(Fault::SetVolumeName);

        let resp = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1"]))
            .await
            .unwrap();
        assert!(resp.snapshots[0].name.ends_with("-snap-0"));
    }

    #[tokio::test]
    async fn test_mixed_systems_fail_before_snapshot_call() {
        let (service, array) = setup();
        let err = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1", "sysB-v2"]))
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.message().contains("same system"));
        assert_eq!(array.snapshot_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_volume() {
        let (service, array) = setup();
        let err = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1", "sysA-v9"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert_eq!(array.snapshot_calls(), 0);
    }

    #[tokio::test]
    async fn test_divergent_creation_times() {
        let (service, array) = setup();
        array.inject(Fault::DivergentSnapshotTimes);

        let err = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1", "sysA-v2"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.message().contains("does not match"));
    }

    #[tokio::test]
    async fn test_snapshot_call_failure_lists_attempted_volumes() {
        let (service, array) = setup();
        array.inject(Fault::SnapshotVolumes);

        let err = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1", "sysA-v2"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.message().contains(r#"["v1", "v2"]"#));
        assert!(!err.message().contains("grp1-0"));
        assert_eq!(array.snapshot_calls(), 1);
    }

    #[tokio::test]
    async fn test_readiness_comes_from_the_array() {
        let (service, array) = setup();
        array.inject(Fault::SnapshotsNotReady);

        let resp = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1", "sysA-v2"]))
            .await
            .unwrap();
        assert!(resp.snapshots.iter().all(|s| !s.ready_to_use));
    }

    #[tokio::test]
    async fn test_snapshot_without_source_volume_fails() {
        let (service, array) = setup();
        array.inject(Fault::DetachedSnapshots);

        let err = service
            .create_volume_group_snapshot(&request("grp1", &["sysA-v1"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.message().contains("does not report its source volume"));
    }

    #[tokio::test]
    async fn test_legacy_ids_need_default_system() {
        let (service, _) = setup();
        let err = service
            .create_volume_group_snapshot(&request("grp1", &["v1"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);

        let array = Arc::new(InMemoryArray::new("sysA"));
        array.add_volume_with_id("v1", "vol1", 1024);
        let registry = SystemRegistry::empty();
        registry.register("sysA", array);
        let config = ServiceConfig {
            default_system_id: Some("sysA".into()),
            ..Default::default()
        };
        let service = ExtensionService::new(Arc::new(registry), config);
        let resp = service
            .create_volume_group_snapshot(&request("grp1", &["v1"]))
            .await
            .unwrap();
        assert_eq!(resp.snapshots[0].source_id, "sysA-v1");
    }
}
