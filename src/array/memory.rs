//! In-Memory Array
//!
//! An [`ArrayClient`] that keeps the array's objects in process memory.
//! Backs standalone mode and the test suites; faults can be injected per
//! operation and calls are counted so tests can assert on array traffic.

use crate::config::ArrayConfig;
use crate::domain::ports::{
    ArrayClient, ArrayClientRef, ArrayConnector, ArrayTimestamp, ArrayVolume, CreatePairParams,
    CreateRcgParams, CreateVolumeParams, PeerMdm, ProtectionDomain, RcgAction,
    ReplicationConsistencyGroup, ReplicationPair, Sdc, SnapshotDef, SnapshotGroupResponse,
    StoragePool, VolumeStatistics, VolumeType, RCG_NO_ERROR,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Authenticate,
    LoginVersion,
    ProtectionDomains,
    PeerMdms,
    StoragePools,
    GetVolume,
    FindVolumeId,
    CreateVolume,
    SetVolumeName,
    VolumeStatistics,
    FindSdc,
    SnapshotVolumes,
    /// Snapshot members come back with differing creation times
    DivergentSnapshotTimes,
    /// Snapshot members come back not yet ready
    SnapshotsNotReady,
    /// Snapshot members come back without their source volume
    DetachedSnapshots,
    CreateRcg,
    GetRcg,
    DeleteRcg,
    RcgAction,
    CreatePair,
}

#[derive(Debug, Default)]
struct ArrayState {
    protection_domains: Vec<ProtectionDomain>,
    peer_mdms: Vec<PeerMdm>,
    storage_pools: Vec<StoragePool>,
    volumes: BTreeMap<String, ArrayVolume>,
    statistics: BTreeMap<String, VolumeStatistics>,
    sdcs: Vec<Sdc>,
    rcgs: BTreeMap<String, ReplicationConsistencyGroup>,
    pairs: BTreeMap<String, ReplicationPair>,
    rcg_actions: Vec<(String, RcgAction)>,
}

/// Array whose objects live in memory
pub struct InMemoryArray {
    system_id: String,
    endpoint: String,
    state: Mutex<ArrayState>,
    faults: Mutex<HashSet<Fault>>,
    auto_name_snapshots: AtomicBool,
    next_id: AtomicU64,
    authenticate_calls: AtomicU64,
    snapshot_calls: AtomicU64,
    array_calls: AtomicU64,
}

impl std::fmt::Debug for InMemoryArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryArray")
            .field("system_id", &self.system_id)
            .field("array_calls", &self.array_calls())
            .finish()
    }
}

impl InMemoryArray {
    /// Create an array with one protection domain and one storage pool
    pub fn new(system_id: impl Into<String>) -> Self {
        let system_id = system_id.into();
        let seed = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;

        let state = ArrayState {
            protection_domains: vec![ProtectionDomain {
                id: format!("pd{}", system_id),
                name: "pd1".to_string(),
                system_id: system_id.clone(),
            }],
            storage_pools: vec![StoragePool {
                id: format!("sp{}", system_id),
                name: "pool1".to_string(),
                protection_domain_id: format!("pd{}", system_id),
            }],
            ..Default::default()
        };

        Self {
            endpoint: format!("memory://{}", system_id),
            system_id,
            state: Mutex::new(state),
            faults: Mutex::new(HashSet::new()),
            auto_name_snapshots: AtomicBool::new(false),
            next_id: AtomicU64::new(seed & 0x0000_ffff_ffff_0000),
            authenticate_calls: AtomicU64::new(0),
            snapshot_calls: AtomicU64::new(0),
            array_calls: AtomicU64::new(0),
        }
    }

    /// Add a peer-MDM relationship to another system
    pub fn with_peer(self, peer_system_id: impl Into<String>) -> Self {
        let peer_system_id = peer_system_id.into();
        {
            let mut state = self.state.lock();
            let id = format!("mdm{}", state.peer_mdms.len() + 1);
            state.peer_mdms.push(PeerMdm {
                id,
                name: format!("peer-{}", peer_system_id),
                system_id: self.system_id.clone(),
                peer_system_id,
                coupling_rc: Some("SUCCESS".to_string()),
            });
        }
        self
    }

    /// Remove every protection domain
    pub fn without_protection_domains(self) -> Self {
        self.state.lock().protection_domains.clear();
        self
    }

    /// Let the array name snapshots itself
    pub fn with_snapshot_auto_naming(self) -> Self {
        self.auto_name_snapshots.store(true, Ordering::Relaxed);
        self
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Add a thin volume and return its ID
    pub fn add_volume(&self, name: &str, size_in_kb: u64) -> String {
        let id = self.generate_id();
        self.insert_volume(id.clone(), name, size_in_kb);
        id
    }

    /// Add a thin volume under a chosen ID
    pub fn add_volume_with_id(&self, id: &str, name: &str, size_in_kb: u64) {
        self.insert_volume(id.to_string(), name, size_in_kb);
    }

    fn insert_volume(&self, id: String, name: &str, size_in_kb: u64) {
        let pool_id = format!("sp{}", self.system_id);
        let volume = ArrayVolume {
            id: id.clone(),
            name: name.to_string(),
            size_in_kb,
            storage_pool_id: pool_id,
            ancestor_volume_id: None,
            consistency_group_id: None,
            volume_type: VolumeType::ThinProvisioned,
            creation_time: now(),
            ready_to_use: true,
        };
        self.state.lock().volumes.insert(id, volume);
    }

    pub fn add_sdc(&self, guid: &str, connection_state: &str) {
        let mut state = self.state.lock();
        let id = format!("sdc{}", state.sdcs.len() + 1);
        state.sdcs.push(Sdc {
            id,
            sdc_guid: guid.to_string(),
            name: String::new(),
            mdm_connection_state: connection_state.to_string(),
        });
    }

    pub fn set_volume_statistics(&self, volume_id: &str, statistics: VolumeStatistics) {
        self.state
            .lock()
            .statistics
            .insert(volume_id.to_string(), statistics);
    }

    /// Overwrite the state an RCG reports
    pub fn set_rcg_state(&self, rcg_id: &str, consist_mode: &str, error: i64) {
        if let Some(rcg) = self.state.lock().rcgs.get_mut(rcg_id) {
            rcg.curr_consist_mode = consist_mode.to_string();
            rcg.error = error;
        }
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().insert(fault);
    }

    pub fn clear(&self, fault: Fault) {
        self.faults.lock().remove(&fault);
    }

    fn check(&self, fault: Fault, operation: &str) -> Result<()> {
        self.array_calls.fetch_add(1, Ordering::Relaxed);
        if self.faults.lock().contains(&fault) {
            return Err(Error::ArrayApi {
                operation: operation.to_string(),
                http_status: 500,
                error_code: 0,
                message: format!("induced {:?} error", fault),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn authenticate_calls(&self) -> u64 {
        self.authenticate_calls.load(Ordering::Relaxed)
    }

    pub fn snapshot_calls(&self) -> u64 {
        self.snapshot_calls.load(Ordering::Relaxed)
    }

    /// Every call made through the client port
    pub fn array_calls(&self) -> u64 {
        self.array_calls.load(Ordering::Relaxed)
    }

    pub fn volume(&self, volume_id: &str) -> Option<ArrayVolume> {
        self.state.lock().volumes.get(volume_id).cloned()
    }

    pub fn volume_by_name(&self, name: &str) -> Option<ArrayVolume> {
        self.state
            .lock()
            .volumes
            .values()
            .find(|v| v.name == name)
            .cloned()
    }

    pub fn rcg(&self, rcg_id: &str) -> Option<ReplicationConsistencyGroup> {
        self.state.lock().rcgs.get(rcg_id).cloned()
    }

    pub fn rcg_count(&self) -> usize {
        self.state.lock().rcgs.len()
    }

    pub fn pairs(&self) -> Vec<ReplicationPair> {
        self.state.lock().pairs.values().cloned().collect()
    }

    pub fn rcg_actions(&self) -> Vec<(String, RcgAction)> {
        self.state.lock().rcg_actions.clone()
    }

    fn generate_id(&self) -> String {
        format!("{:016x}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn now() -> ArrayTimestamp {
    let now = chrono::Utc::now();
    ArrayTimestamp {
        seconds: now.timestamp(),
        nanos: now.timestamp_subsec_nanos() as i32,
    }
}

fn not_found(kind: &str, id: &str) -> Error {
    Error::ArrayObjectNotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl ArrayClient for InMemoryArray {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn authenticate(&self) -> Result<()> {
        self.authenticate_calls.fetch_add(1, Ordering::Relaxed);
        self.check(Fault::Authenticate, "login")
    }

    async fn login_version(&self) -> Result<String> {
        self.check(Fault::LoginVersion, "version")?;
        Ok("3.6".to_string())
    }

    async fn get_protection_domains(&self) -> Result<Vec<ProtectionDomain>> {
        self.check(Fault::ProtectionDomains, "getProtectionDomains")?;
        Ok(self.state.lock().protection_domains.clone())
    }

    async fn get_peer_mdms(&self) -> Result<Vec<PeerMdm>> {
        self.check(Fault::PeerMdms, "getPeerMdms")?;
        Ok(self.state.lock().peer_mdms.clone())
    }

    async fn get_storage_pools(&self) -> Result<Vec<StoragePool>> {
        self.check(Fault::StoragePools, "getStoragePools")?;
        Ok(self.state.lock().storage_pools.clone())
    }

    async fn get_volume(&self, volume_id: &str) -> Result<ArrayVolume> {
        self.check(Fault::GetVolume, "getVolume")?;
        self.volume(volume_id)
            .ok_or_else(|| not_found("Volume", volume_id))
    }

    async fn find_volume_id(&self, name: &str) -> Result<String> {
        self.check(Fault::FindVolumeId, "queryIdByKey")?;
        self.volume_by_name(name)
            .map(|v| v.id)
            .ok_or_else(|| not_found("Volume", name))
    }

    async fn create_volume(&self, params: CreateVolumeParams) -> Result<String> {
        self.check(Fault::CreateVolume, "createVolume")?;

        let mut state = self.state.lock();
        if state.volumes.values().any(|v| v.name == params.name) {
            return Err(Error::ArrayObjectExists {
                kind: "Volume".into(),
                name: params.name,
            });
        }
        if !state
            .storage_pools
            .iter()
            .any(|p| p.id == params.storage_pool_id)
        {
            return Err(not_found("StoragePool", &params.storage_pool_id));
        }

        let id = self.generate_id();
        state.volumes.insert(
            id.clone(),
            ArrayVolume {
                id: id.clone(),
                name: params.name,
                size_in_kb: params.size_in_kb,
                storage_pool_id: params.storage_pool_id,
                ancestor_volume_id: None,
                consistency_group_id: None,
                volume_type: params.volume_type,
                creation_time: now(),
                ready_to_use: true,
            },
        );
        debug!(system = %self.system_id, volume = %id, "created in-memory volume");
        Ok(id)
    }

    async fn set_volume_name(&self, volume_id: &str, name: &str) -> Result<()> {
        self.check(Fault::SetVolumeName, "setVolumeName")?;

        let mut state = self.state.lock();
        if state
            .volumes
            .values()
            .any(|v| v.name == name && v.id != volume_id)
        {
            return Err(Error::ArrayObjectExists {
                kind: "Volume".into(),
                name: name.to_string(),
            });
        }
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| not_found("Volume", volume_id))?;
        volume.name = name.to_string();
        Ok(())
    }

    async fn get_volume_statistics(&self, volume_id: &str) -> Result<VolumeStatistics> {
        self.check(Fault::VolumeStatistics, "getVolumeStatistics")?;

        let state = self.state.lock();
        if !state.volumes.contains_key(volume_id) {
            return Err(not_found("Volume", volume_id));
        }
        Ok(state.statistics.get(volume_id).copied().unwrap_or_default())
    }

    async fn find_sdc_by_guid(&self, guid: &str) -> Result<Sdc> {
        self.check(Fault::FindSdc, "getSdc")?;
        self.state
            .lock()
            .sdcs
            .iter()
            .find(|s| s.sdc_guid == guid)
            .cloned()
            .ok_or_else(|| not_found("Sdc", guid))
    }

    async fn snapshot_volumes(&self, defs: &[SnapshotDef]) -> Result<SnapshotGroupResponse> {
        self.snapshot_calls.fetch_add(1, Ordering::Relaxed);
        self.check(Fault::SnapshotVolumes, "snapshotVolumes")?;

        let (divergent, not_ready, detached) = {
            let faults = self.faults.lock();
            (
                faults.contains(&Fault::DivergentSnapshotTimes),
                faults.contains(&Fault::SnapshotsNotReady),
                faults.contains(&Fault::DetachedSnapshots),
            )
        };
        let auto_name = self.auto_name_snapshots.load(Ordering::Relaxed);
        let group_id = self.generate_id();
        let created = now();

        let mut state = self.state.lock();
        for def in defs {
            if !state.volumes.contains_key(&def.volume_id) {
                return Err(not_found("Volume", &def.volume_id));
            }
        }

        let mut volume_id_list = Vec::with_capacity(defs.len());
        for (index, def) in defs.iter().enumerate() {
            let source = state.volumes[&def.volume_id].clone();
            let id = self.generate_id();
            let name = match (&def.snapshot_name, auto_name) {
                (Some(name), _) => name.clone(),
                (None, true) => format!("snapshot-{}", id),
                (None, false) => String::new(),
            };
            let mut creation_time = created;
            if divergent {
                creation_time.nanos += index as i32;
            }

            let snapshot = ArrayVolume {
                id: id.clone(),
                name,
                size_in_kb: source.size_in_kb,
                storage_pool_id: source.storage_pool_id,
                ancestor_volume_id: (!detached).then_some(source.id),
                consistency_group_id: Some(group_id.clone()),
                volume_type: VolumeType::Snapshot,
                creation_time,
                ready_to_use: !not_ready,
            };
            state.volumes.insert(id.clone(), snapshot);
            volume_id_list.push(id);
        }

        Ok(SnapshotGroupResponse {
            snapshot_group_id: group_id,
            volume_id_list,
        })
    }

    async fn create_replication_consistency_group(
        &self,
        params: CreateRcgParams,
    ) -> Result<String> {
        self.check(Fault::CreateRcg, "createReplicationConsistencyGroup")?;

        let mut state = self.state.lock();
        if state.rcgs.values().any(|r| r.name == params.name) {
            return Err(Error::ArrayApi {
                operation: "createReplicationConsistencyGroup".into(),
                http_status: 500,
                error_code: 6,
                message: "The Replication Consistency Group already exists".into(),
            });
        }

        let id = self.generate_id();
        state.rcgs.insert(
            id.clone(),
            ReplicationConsistencyGroup {
                id: id.clone(),
                name: params.name,
                protection_domain_id: params.protection_domain_id,
                remote_protection_domain_id: params.remote_protection_domain_id,
                destination_system_id: params.destination_system_id,
                rpo_in_seconds: params.rpo_in_seconds,
                curr_consist_mode: "PartiallyConsistent".to_string(),
                error: RCG_NO_ERROR,
            },
        );
        Ok(id)
    }

    async fn get_replication_consistency_group(
        &self,
        rcg_id: &str,
    ) -> Result<ReplicationConsistencyGroup> {
        self.check(Fault::GetRcg, "getReplicationConsistencyGroup")?;
        self.rcg(rcg_id)
            .ok_or_else(|| not_found("ReplicationConsistencyGroup", rcg_id))
    }

    async fn delete_replication_consistency_group(&self, rcg_id: &str) -> Result<()> {
        self.check(Fault::DeleteRcg, "removeReplicationConsistencyGroup")?;

        let mut state = self.state.lock();
        if state.rcgs.remove(rcg_id).is_none() {
            return Err(not_found("ReplicationConsistencyGroup", rcg_id));
        }
        state
            .pairs
            .retain(|_, p| p.replication_consistency_group_id != rcg_id);
        Ok(())
    }

    async fn execute_rcg_action(&self, rcg_id: &str, action: RcgAction) -> Result<()> {
        self.check(Fault::RcgAction, action.as_str())?;

        let mut state = self.state.lock();
        let rcg = state
            .rcgs
            .get_mut(rcg_id)
            .ok_or_else(|| not_found("ReplicationConsistencyGroup", rcg_id))?;
        if action == RcgAction::Sync {
            rcg.curr_consist_mode = "Consistent".to_string();
        }
        state.rcg_actions.push((rcg_id.to_string(), action));
        Ok(())
    }

    async fn create_replication_pair(&self, params: CreatePairParams) -> Result<String> {
        self.check(Fault::CreatePair, "createReplicationPair")?;

        let mut state = self.state.lock();
        if state.pairs.values().any(|p| p.name == params.name) {
            return Err(Error::ArrayApi {
                operation: "createReplicationPair".into(),
                http_status: 500,
                error_code: 6,
                message: "Replication Pair name already in use".into(),
            });
        }
        if !state
            .rcgs
            .contains_key(&params.replication_consistency_group_id)
        {
            return Err(not_found(
                "ReplicationConsistencyGroup",
                &params.replication_consistency_group_id,
            ));
        }
        if !state.volumes.contains_key(&params.source_volume_id) {
            return Err(not_found("Volume", &params.source_volume_id));
        }

        let id = self.generate_id();
        state.pairs.insert(
            id.clone(),
            ReplicationPair {
                id: id.clone(),
                name: params.name,
                local_volume_id: params.source_volume_id,
                remote_volume_id: params.destination_volume_id,
                replication_consistency_group_id: params.replication_consistency_group_id,
            },
        );
        Ok(id)
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Hands out one shared [`InMemoryArray`] per system ID
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    arrays: DashMap<String, Arc<InMemoryArray>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a pre-built array available
    pub fn insert(&self, array: Arc<InMemoryArray>) {
        self.arrays.insert(array.system_id().to_string(), array);
    }

    pub fn array(&self, system_id: &str) -> Option<Arc<InMemoryArray>> {
        self.arrays.get(system_id).map(|a| a.clone())
    }
}

impl ArrayConnector for InMemoryConnector {
    fn connect(&self, config: &ArrayConfig) -> Result<ArrayClientRef> {
        let array = self
            .arrays
            .entry(config.system_id.clone())
            .or_insert_with(|| Arc::new(InMemoryArray::new(config.system_id.clone())))
            .clone();
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_snapshot_group_members_share_time() {
        let array = InMemoryArray::new("sysA");
        let v1 = array.add_volume("vol1", 8 * 1024 * 1024);
        let v2 = array.add_volume("vol2", 8 * 1024 * 1024);

        let defs = vec![
            SnapshotDef {
                volume_id: v1.clone(),
                snapshot_name: None,
            },
            SnapshotDef {
                volume_id: v2,
                snapshot_name: None,
            },
        ];
        let response = array.snapshot_volumes(&defs).await.unwrap();
        assert_eq!(response.volume_id_list.len(), 2);

        let first = array.volume(&response.volume_id_list[0]).unwrap();
        let second = array.volume(&response.volume_id_list[1]).unwrap();
        assert_eq!(first.creation_time, second.creation_time);
        assert_eq!(first.ancestor_volume_id.as_deref(), Some(v1.as_str()));
        assert_eq!(
            first.consistency_group_id.as_deref(),
            Some(response.snapshot_group_id.as_str())
        );
        assert!(first.name.is_empty());
        assert_eq!(array.snapshot_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rcg_name_rejected() {
        let array = InMemoryArray::new("sysA");
        let params = CreateRcgParams {
            name: "rcg-vol1".into(),
            rpo_in_seconds: 60,
            protection_domain_id: "pdsysA".into(),
            remote_protection_domain_id: "pdsysB".into(),
            destination_system_id: "sysB".into(),
        };

        array
            .create_replication_consistency_group(params.clone())
            .await
            .unwrap();
        let err = array
            .create_replication_consistency_group(params)
            .await
            .unwrap_err();
        assert_matches!(err, Error::ArrayApi { error_code: 6, .. });
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let array = InMemoryArray::new("sysA");
        array.inject(Fault::Authenticate);
        assert!(array.authenticate().await.is_err());

        array.clear(Fault::Authenticate);
        assert!(array.authenticate().await.is_ok());
        assert_eq!(array.authenticate_calls(), 2);
    }

    #[test]
    fn test_connector_shares_arrays() {
        let connector = InMemoryConnector::new();
        let config = ArrayConfig {
            system_id: "sysA".into(),
            endpoint: "memory://sysA".into(),
            username: "admin".into(),
            password: "secret".into(),
            insecure: false,
            is_default: true,
        };

        let first = connector.connect(&config).unwrap();
        let second = connector.connect(&config).unwrap();
        assert_eq!(first.endpoint(), second.endpoint());
        assert!(connector.array("sysA").is_some());
    }
}
