//! Protection-Group Orchestrator
//!
//! A protection group is a replication consistency group (RCG) on the local
//! array plus one replication pair per protected volume. Group health is not
//! tracked locally: every status query re-reads the RCG and maps the array's
//! consistency mode and error code onto [`ProtectionGroupState`].
//!
//! Creation is a fixed sequence of array calls with no rollback. The source
//! volume is read before the RCG is created, so a bad volume handle leaves
//! nothing behind. A failure after the RCG exists, such as a missing replica
//! on the remote array, leaves it in place; callers retry from the top and
//! the array's duplicate-name checks surface as `Internal`.

use crate::controlplane::service::{ExtensionService, Parameters};
use crate::domain::ports::{
    CreatePairParams, CreateRcgParams, RcgAction, ReplicationConsistencyGroup, RCG_NO_ERROR,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Attribute naming the system that owns a protection group
pub const ATTR_SYSTEM_NAME: &str = "systemName";

/// Attribute carrying the replication pair created with the group
pub const ATTR_REPLICATION_PAIR_ID: &str = "replicationPairID";

/// Prefix of the remote replica's volume name
pub const REPLICA_PREFIX: &str = "replica-";

/// RPO used when the parameters do not set one
pub const DEFAULT_RPO_SECONDS: u64 = 60;

const MODE_CONSISTENT: &str = "Consistent";
const MODE_PARTIALLY_CONSISTENT: &str = "PartiallyConsistent";

/// Name of the remote replica of a source volume
pub fn replica_name(source_volume_name: &str) -> String {
    format!("{}{}", REPLICA_PREFIX, source_volume_name)
}

// =============================================================================
// Capabilities
// =============================================================================

/// Replication RPCs this service implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationCapability {
    CreateRemoteVolume,
    CreateProtectionGroup,
    DeleteProtectionGroup,
    ReplicationActionExecution,
    MonitorProtectionGroup,
}

/// Actions a caller may request on a protection group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationAction {
    FailoverRemote,
    UnplannedFailoverLocal,
    ReprotectLocal,
    Suspend,
    Resume,
    Sync,
}

impl ReplicationAction {
    pub const ALL: [ReplicationAction; 6] = [
        ReplicationAction::FailoverRemote,
        ReplicationAction::UnplannedFailoverLocal,
        ReplicationAction::ReprotectLocal,
        ReplicationAction::Suspend,
        ReplicationAction::Resume,
        ReplicationAction::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationAction::FailoverRemote => "FAILOVER_REMOTE",
            ReplicationAction::UnplannedFailoverLocal => "UNPLANNED_FAILOVER_LOCAL",
            ReplicationAction::ReprotectLocal => "REPROTECT_LOCAL",
            ReplicationAction::Suspend => "SUSPEND",
            ReplicationAction::Resume => "RESUME",
            ReplicationAction::Sync => "SYNC",
        }
    }

    /// RCG action that implements this request
    pub fn rcg_action(&self) -> RcgAction {
        match self {
            ReplicationAction::FailoverRemote | ReplicationAction::UnplannedFailoverLocal => {
                RcgAction::Failover
            }
            ReplicationAction::ReprotectLocal => RcgAction::Reverse,
            ReplicationAction::Suspend => RcgAction::Pause,
            ReplicationAction::Resume => RcgAction::Resume,
            ReplicationAction::Sync => RcgAction::Sync,
        }
    }
}

impl FromStr for ReplicationAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ReplicationAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unsupported action {}", s)))
    }
}

impl std::fmt::Display for ReplicationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static capability advertisement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationCapabilities {
    pub capabilities: Vec<ReplicationCapability>,
    pub actions: Vec<ReplicationAction>,
}

// =============================================================================
// Protection Group State
// =============================================================================

/// Externally visible protection-group state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectionGroupState {
    Unknown,
    SyncInProgress,
    Synchronized,
    Invalid,
}

/// Derive the group state from the last-fetched RCG
pub fn protection_group_state(rcg: &ReplicationConsistencyGroup) -> ProtectionGroupState {
    if rcg.error != RCG_NO_ERROR {
        return ProtectionGroupState::Invalid;
    }
    match rcg.curr_consist_mode.as_str() {
        MODE_PARTIALLY_CONSISTENT => ProtectionGroupState::SyncInProgress,
        MODE_CONSISTENT => ProtectionGroupState::Synchronized,
        other => {
            debug!(mode = %other, "consistency mode does not match a known state");
            ProtectionGroupState::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroupStatus {
    pub state: ProtectionGroupState,
    /// Consistency mode the state was derived from
    pub consistency_mode: String,
}

impl From<&ReplicationConsistencyGroup> for ProtectionGroupStatus {
    fn from(rcg: &ReplicationConsistencyGroup) -> Self {
        Self {
            state: protection_group_state(rcg),
            consistency_mode: rcg.curr_consist_mode.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProtectionGroupResponse {
    pub protection_group_id: String,
    pub protection_group_attributes: Parameters,
}

// =============================================================================
// Operations
// =============================================================================

impl ExtensionService {
    pub fn get_replication_capabilities(&self) -> ReplicationCapabilities {
        ReplicationCapabilities {
            capabilities: vec![
                ReplicationCapability::CreateRemoteVolume,
                ReplicationCapability::CreateProtectionGroup,
                ReplicationCapability::DeleteProtectionGroup,
                ReplicationCapability::ReplicationActionExecution,
                ReplicationCapability::MonitorProtectionGroup,
            ],
            actions: ReplicationAction::ALL.to_vec(),
        }
    }

    /// Create an RCG for a volume and pair it with its remote replica
    #[instrument(skip(self, parameters))]
    pub async fn create_storage_protection_group(
        &self,
        volume_handle: &str,
        parameters: &Parameters,
    ) -> Result<CreateProtectionGroupResponse> {
        self.instrumented(
            "create_storage_protection_group",
            self.create_protection_group_inner(volume_handle, parameters),
        )
        .await
    }

    async fn create_protection_group_inner(
        &self,
        volume_handle: &str,
        parameters: &Parameters,
    ) -> Result<CreateProtectionGroupResponse> {
        if volume_handle.is_empty() {
            return Err(Error::InvalidArgument("volume ID is required".into()));
        }
        if parameters.is_empty() {
            return Err(Error::InvalidArgument("empty parameters list".into()));
        }
        let volume = self.require_volume_handle(volume_handle)?;
        let remote_system_id = self.remote_system_parameter(parameters)?;
        let rpo_in_seconds = self.rpo_parameter(parameters)?;
        let system_id = volume.system_id();

        let local = self.registry().require_probe(system_id).await?;
        let remote = self.registry().require_probe(&remote_system_id).await?;

        let local_domain = self
            .registry()
            .get_protection_domains(system_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Internal(format!("no protection domain found on system {}", system_id))
            })?;
        let remote_domain = self
            .registry()
            .get_protection_domains(&remote_system_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Internal(format!(
                    "no protection domain found on system {}",
                    remote_system_id
                ))
            })?;
        debug!(local = %local_domain.id, remote = %remote_domain.id, "protection domains");

        let peers = self.registry().get_peer_mdms(system_id).await?;
        if !peers.iter().any(|p| p.peer_system_id == remote_system_id) {
            return Err(Error::Internal(format!(
                "no peer MDM relationship between {} and {}",
                system_id, remote_system_id
            )));
        }

        let source = local
            .get_volume(volume.local_id())
            .await
            .map_err(|e| Error::internal("can't query volume", e))?;

        let rcg_id = local
            .create_replication_consistency_group(CreateRcgParams {
                name: format!("rcg-{}", source.name),
                rpo_in_seconds,
                protection_domain_id: local_domain.id,
                remote_protection_domain_id: remote_domain.id,
                destination_system_id: remote_system_id.clone(),
            })
            .await
            .map_err(|e| Error::internal("can't create replication consistency group", e))?;
        info!(rcg = %rcg_id, system = %system_id, "replication consistency group created");

        let remote_name = replica_name(&source.name);
        let remote_volume_id = remote.find_volume_id(&remote_name).await.map_err(|e| {
            Error::internal(format!("can't find volume by name {}", remote_name), e)
        })?;

        let pair_id = local
            .create_replication_pair(CreatePairParams {
                name: format!("pair-{}", source.name),
                source_volume_id: source.id.clone(),
                destination_volume_id: remote_volume_id.clone(),
                replication_consistency_group_id: rcg_id.clone(),
            })
            .await
            .map_err(|e| Error::internal("can't create replication pair", e))?;
        info!(
            pair = %pair_id,
            source = %source.id,
            destination = %remote_volume_id,
            "replication pair created"
        );

        let mut attributes = Parameters::new();
        attributes.insert(ATTR_SYSTEM_NAME.to_string(), system_id.to_string());
        attributes.insert(ATTR_REPLICATION_PAIR_ID.to_string(), pair_id);

        Ok(CreateProtectionGroupResponse {
            protection_group_id: rcg_id,
            protection_group_attributes: attributes,
        })
    }

    /// Remove the RCG backing a protection group
    #[instrument(skip(self, attributes))]
    pub async fn delete_storage_protection_group(
        &self,
        protection_group_id: &str,
        attributes: &Parameters,
    ) -> Result<()> {
        self.instrumented("delete_storage_protection_group", async {
            let (system_id, rcg_id) = self.locate_group(protection_group_id, attributes)?;
            let client = self.registry().require_probe(&system_id).await?;

            // Not-found is reported like any other array failure
            client
                .delete_replication_consistency_group(&rcg_id)
                .await
                .map_err(|e| {
                    Error::internal("error deleting the replication consistency group", e)
                })?;
            info!(rcg = %rcg_id, system = %system_id, "replication consistency group deleted");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, attributes))]
    pub async fn get_storage_protection_group_status(
        &self,
        protection_group_id: &str,
        attributes: &Parameters,
    ) -> Result<ProtectionGroupStatus> {
        self.instrumented("get_storage_protection_group_status", async {
            let (system_id, rcg_id) = self.locate_group(protection_group_id, attributes)?;
            self.fetch_status(&system_id, &rcg_id).await
        })
        .await
    }

    /// Apply a replication action and report the resulting status
    #[instrument(skip(self, attributes))]
    pub async fn execute_action(
        &self,
        protection_group_id: &str,
        attributes: &Parameters,
        action: ReplicationAction,
    ) -> Result<ProtectionGroupStatus> {
        self.instrumented("execute_action", async {
            let (system_id, rcg_id) = self.locate_group(protection_group_id, attributes)?;
            let client = self.registry().require_probe(&system_id).await?;

            client
                .execute_rcg_action(&rcg_id, action.rcg_action())
                .await
                .map_err(|e| Error::internal(format!("can't execute action {}", action), e))?;
            info!(rcg = %rcg_id, action = %action, "replication action executed");

            self.fetch_status(&system_id, &rcg_id).await
        })
        .await
    }

    async fn fetch_status(&self, system_id: &str, rcg_id: &str) -> Result<ProtectionGroupStatus> {
        let client = self.registry().require_probe(system_id).await?;
        let rcg = client
            .get_replication_consistency_group(rcg_id)
            .await
            .map_err(|e| Error::internal("no replication consistency group found", e))?;
        debug!(?rcg, "replication consistency group");
        Ok(ProtectionGroupStatus::from(&rcg))
    }

    /// Owning system and array-local RCG ID of a protection group
    fn locate_group(
        &self,
        protection_group_id: &str,
        attributes: &Parameters,
    ) -> Result<(String, String)> {
        if protection_group_id.is_empty() {
            return Err(Error::InvalidArgument("protection group ID is required".into()));
        }
        let system_id = attributes
            .get(ATTR_SYSTEM_NAME)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "protection group attributes must contain {}",
                    ATTR_SYSTEM_NAME
                ))
            })?;

        // A system-qualified group ID is accepted as well as the bare RCG ID
        let rcg_id = crate::domain::ids::CompositeId::decode(protection_group_id)
            .local_id()
            .to_string();
        Ok((system_id.clone(), rcg_id))
    }

    pub(crate) fn remote_system_parameter(&self, parameters: &Parameters) -> Result<String> {
        let key = self.config().remote_system_key();
        parameters
            .get(&key)
            .filter(|s| !s.is_empty())
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("parameter {} is required", key)))
    }

    fn rpo_parameter(&self, parameters: &Parameters) -> Result<u64> {
        let key = self.config().rpo_key();
        match parameters.get(&key) {
            None => Ok(DEFAULT_RPO_SECONDS),
            Some(value) => value.trim().parse().map_err(|_| {
                Error::InvalidArgument(format!("parameter {} must be a number of seconds: {}", key, value))
            }),
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

    struct Fixture {
        service: Arc<ExtensionService>,
        local: Arc<InMemoryArray>,
        remote: Arc<InMemoryArray>,
        source_id: String,
    }

    fn fixture() -> Fixture {
        let local = Arc::new(InMemoryArray::new("sysA").with_peer("sysB"));
        let remote = Arc::new(InMemoryArray::new("sysB").with_peer("sysA"));
        let source_id = local.add_volume("data", 8 * 1024 * 1024);
        remote.add_volume("replica-data", 8 * 1024 * 1024);

        let registry = SystemRegistry::empty();
        registry.register("sysA", local.clone());
        registry.register("sysB", remote.clone());

        Fixture {
            service: ExtensionService::new(Arc::new(registry), ServiceConfig::default()),
            local,
            remote,
            source_id,
        }
    }

    fn parameters() -> Parameters {
        let config = ServiceConfig::default();
        let mut params = Parameters::new();
        params.insert(config.remote_system_key(), "sysB".into());
        params.insert(config.rpo_key(), "30".into());
        params
    }

    fn rcg(mode: &str, error: i64) -> ReplicationConsistencyGroup {
        ReplicationConsistencyGroup {
            id: "rcg1".into(),
            name: "rcg-data".into(),
            protection_domain_id: "pd1".into(),
            remote_protection_domain_id: "pd2".into(),
            destination_system_id: "sysB".into(),
            rpo_in_seconds: 30,
            curr_consist_mode: mode.into(),
            error,
        }
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            protection_group_state(&rcg("Consistent", RCG_NO_ERROR)),
            ProtectionGroupState::Synchronized
        );
        assert_eq!(
            protection_group_state(&rcg("PartiallyConsistent", RCG_NO_ERROR)),
            ProtectionGroupState::SyncInProgress
        );
        assert_eq!(
            protection_group_state(&rcg("Inconsistent", RCG_NO_ERROR)),
            ProtectionGroupState::Unknown
        );
        assert_eq!(
            protection_group_state(&rcg("Consistent", 12)),
            ProtectionGroupState::Invalid
        );
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            "REPROTECT_LOCAL".parse::<ReplicationAction>().unwrap(),
            ReplicationAction::ReprotectLocal
        );
        let err = "FAILBACK_LOCAL".parse::<ReplicationAction>().unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert_eq!(ReplicationAction::UnplannedFailoverLocal.rcg_action(), RcgAction::Failover);
        assert_eq!(ReplicationAction::Suspend.rcg_action(), RcgAction::Pause);
    }

    #[test]
    fn test_capabilities() {
        let f = fixture();
        let caps = f.service.get_replication_capabilities();
        assert_eq!(caps.capabilities.len(), 5);
        assert_eq!(caps.actions.len(), 6);

        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["capabilities"][0], "CREATE_REMOTE_VOLUME");
        assert_eq!(json["actions"][1], "UNPLANNED_FAILOVER_LOCAL");
    }

    #[tokio::test]
    async fn test_create_protection_group() {
        let f = fixture();
        let resp = f
            .service
            .create_storage_protection_group(&format!("sysA-{}", f.source_id), &parameters())
            .await
            .unwrap();

        let rcg = f.local.rcg(&resp.protection_group_id).unwrap();
        assert_eq!(rcg.name, "rcg-data");
        assert_eq!(rcg.rpo_in_seconds, 30);
        assert_eq!(rcg.destination_system_id, "sysB");
        assert_eq!(rcg.remote_protection_domain_id, "pdsysB");

        let pairs = f.local.pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "pair-data");
        assert_eq!(pairs[0].local_volume_id, f.source_id);
        assert_eq!(
            Some(&pairs[0].remote_volume_id),
            f.remote.volume_by_name("replica-data").map(|v| v.id).as_ref()
        );

        assert_eq!(resp.protection_group_attributes[ATTR_SYSTEM_NAME], "sysA");
        assert_eq!(
            resp.protection_group_attributes[ATTR_REPLICATION_PAIR_ID],
            pairs[0].id
        );
    }

    #[tokio::test]
    async fn test_empty_parameters_fail_before_array_calls() {
        let f = fixture();
        let err = f
            .service
            .create_storage_protection_group("sysA-v1", &Parameters::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(err.message().contains("empty parameters"));
        assert_eq!(f.local.array_calls(), 0);
        assert_eq!(f.remote.array_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_remote_system_parameter() {
        let f = fixture();
        let mut params = Parameters::new();
        params.insert(ServiceConfig::default().rpo_key(), "30".into());

        let err = f
            .service
            .create_storage_protection_group("sysA-v1", &params)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert_eq!(f.local.array_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_replica_leaves_rcg_in_place() {
        let local = Arc::new(InMemoryArray::new("sysA").with_peer("sysB"));
        let remote = Arc::new(InMemoryArray::new("sysB"));
        let source_id = local.add_volume("data", 1024);

        let registry = SystemRegistry::empty();
        registry.register("sysA", local.clone());
        registry.register("sysB", remote);
        let service = ExtensionService::new(Arc::new(registry), ServiceConfig::default());

        let err = service
            .create_storage_protection_group(&format!("sysA-{}", source_id), &parameters())
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.message().contains("can't find volume by name replica-data"));
        assert_eq!(local.rcg_count(), 1);
        assert!(local.pairs().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_source_volume_creates_nothing() {
        let f = fixture();
        let err = f
            .service
            .create_storage_protection_group("sysA-missing", &parameters())
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::Internal);
        assert_eq!(f.local.rcg_count(), 0);
        assert!(f.local.pairs().is_empty());
    }

    #[tokio::test]
    async fn test_missing_peer_relationship() {
        let local = Arc::new(InMemoryArray::new("sysA"));
        let remote = Arc::new(InMemoryArray::new("sysB"));
        let source_id = local.add_volume("data", 1024);

        let registry = SystemRegistry::empty();
        registry.register("sysA", local.clone());
        registry.register("sysB", remote);
        let service = ExtensionService::new(Arc::new(registry), ServiceConfig::default());

        let err = service
            .create_storage_protection_group(&format!("sysA-{}", source_id), &parameters())
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert_eq!(local.rcg_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_protection_domain() {
        let local = Arc::new(InMemoryArray::new("sysA").with_peer("sysB"));
        let remote = Arc::new(InMemoryArray::new("sysB").without_protection_domains());
        let source_id = local.add_volume("data", 1024);

        let registry = SystemRegistry::empty();
        registry.register("sysA", local.clone());
        registry.register("sysB", remote);
        let service = ExtensionService::new(Arc::new(registry), ServiceConfig::default());

        let err = service
            .create_storage_protection_group(&format!("sysA-{}", source_id), &parameters())
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.message().contains("no protection domain"));
    }

    #[tokio::test]
    async fn test_duplicate_group_is_internal() {
        let f = fixture();
        let handle = format!("sysA-{}", f.source_id);
        f.service
            .create_storage_protection_group(&handle, &parameters())
            .await
            .unwrap();

        let err = f
            .service
            .create_storage_protection_group(&handle, &parameters())
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert_eq!(f.local.rcg_count(), 1);
    }

    #[tokio::test]
    async fn test_status_and_actions() {
        let f = fixture();
        let resp = f
            .service
            .create_storage_protection_group(&format!("sysA-{}", f.source_id), &parameters())
            .await
            .unwrap();
        let id = resp.protection_group_id.clone();
        let attrs = resp.protection_group_attributes;

        let status = f
            .service
            .get_storage_protection_group_status(&id, &attrs)
            .await
            .unwrap();
        assert_eq!(status.state, ProtectionGroupState::SyncInProgress);

        let status = f
            .service
            .execute_action(&id, &attrs, ReplicationAction::Sync)
            .await
            .unwrap();
        assert_eq!(status.state, ProtectionGroupState::Synchronized);

        f.local.set_rcg_state(&id, "Consistent", 7);
        let status = f
            .service
            .get_storage_protection_group_status(&id, &attrs)
            .await
            .unwrap();
        assert_eq!(status.state, ProtectionGroupState::Invalid);

        f.service
            .execute_action(&id, &attrs, ReplicationAction::Suspend)
            .await
            .unwrap();
        assert_eq!(f.local.rcg_actions().last(), Some(&(id.clone(), RcgAction::Pause)));

        f.local.inject(Fault::RcgAction);
        let err = f
            .service
            .execute_action(&id, &attrs, ReplicationAction::Resume)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
    }

    #[tokio::test]
    async fn test_delete_protection_group() {
        let f = fixture();
        let resp = f
            .service
            .create_storage_protection_group(&format!("sysA-{}", f.source_id), &parameters())
            .await
            .unwrap();
        let id = resp.protection_group_id;
        let attrs = resp.protection_group_attributes;

        f.service.delete_storage_protection_group(&id, &attrs).await.unwrap();
        assert_eq!(f.local.rcg_count(), 0);
        assert!(f.local.pairs().is_empty());

        // Deleting again reports the array's not-found as Internal
        let err = f
            .service
            .delete_storage_protection_group(&id, &attrs)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);

        let err = f
            .service
            .delete_storage_protection_group(&id, &Parameters::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }
}
