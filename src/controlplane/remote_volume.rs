//! Remote-Volume Provisioner
//!
//! Creates the replica of a local volume on the remote system, named so that a
//! later protection-group creation can find it by name. Volume creation goes
//! through [`ExtensionService::create_volume`], the one provisioning call this
//! service exposes.

use crate::controlplane::replication::replica_name;
use crate::controlplane::service::{ExtensionService, Parameters};
use crate::domain::ids::CompositeId;
use crate::domain::ports::{CreateVolumeParams, VolumeType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

/// Volume parameter naming the storage pool
pub const PARAM_STORAGE_POOL: &str = "storagepool";

/// Volume parameter naming the system to create on
pub const PARAM_SYSTEM_ID: &str = "systemID";

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessType {
    Block,
    Mount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessMode {
    SingleNodeWriter,
    SingleNodeReaderOnly,
    MultiNodeReaderOnly,
    MultiNodeSingleWriter,
    MultiNodeMultiWriter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeCapability {
    pub access_type: AccessType,
    pub access_mode: AccessMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeRequest {
    pub name: String,
    pub capacity_bytes: u64,
    pub volume_capabilities: Vec<VolumeCapability>,
    #[serde(default)]
    pub parameters: Parameters,
}

/// A provisioned volume as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub volume_id: String,
    pub capacity_bytes: u64,
    pub volume_context: Parameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRemoteVolumeResponse {
    pub remote_volume: Volume,
}

// =============================================================================
// Operations
// =============================================================================

impl ExtensionService {
    /// Create the remote replica of a local volume
    #[instrument(skip(self, parameters))]
    pub async fn create_remote_volume(
        &self,
        volume_handle: &str,
        parameters: &Parameters,
    ) -> Result<CreateRemoteVolumeResponse> {
        self.instrumented("create_remote_volume", async {
            let volume = self.require_volume_handle(volume_handle)?;
            let remote_system_id = self.remote_system_parameter(parameters)?;
            let remote_pool = parameters
                .get(&self.config().remote_storage_pool_key())
                .cloned()
                .unwrap_or_default();
            let system_id = volume.system_id();

            let local = self.registry().require_probe(system_id).await?;
            let source = local
                .get_volume(volume.local_id())
                .await
                .map_err(|e| Error::internal("can't query volume", e))?;
            debug!(?source, "source volume");

            self.registry().require_probe(&remote_system_id).await?;
            let peers = self.registry().get_peer_mdms(system_id).await?;
            if !peers.iter().any(|p| p.peer_system_id == remote_system_id) {
                return Err(Error::Internal(format!(
                    "no peer MDM relationship between {} and {}",
                    system_id, remote_system_id
                )));
            }

            let mut volume_parameters = Parameters::new();
            volume_parameters.insert(PARAM_STORAGE_POOL.to_string(), remote_pool.clone());
            volume_parameters.insert(PARAM_SYSTEM_ID.to_string(), remote_system_id.clone());

            let request = CreateVolumeRequest {
                name: replica_name(&source.name),
                capacity_bytes: source.size_bytes(),
                volume_capabilities: vec![VolumeCapability {
                    access_type: AccessType::Block,
                    access_mode: AccessMode::SingleNodeWriter,
                }],
                parameters: volume_parameters,
            };

            let created = self.create_volume(request).await.map_err(|e| {
                error!(remote = %remote_system_id, "remote volume creation failed: {}", e);
                e
            })?;
            info!(volume = %created.volume_id, "remote volume created");

            let mut context = Parameters::new();
            context.insert("storagePool".to_string(), remote_pool);
            context.insert("remoteSystem".to_string(), remote_system_id);
            context.insert("remoteVolumeID".to_string(), created.volume_id.clone());

            Ok(CreateRemoteVolumeResponse {
                remote_volume: Volume {
                    volume_id: created.volume_id,
                    capacity_bytes: source.size_bytes(),
                    volume_context: context,
                },
            })
        })
        .await
    }

    /// Create a thin volume in a named storage pool
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume> {
        if request.name.is_empty() {
            return Err(Error::InvalidArgument("volume name is required".into()));
        }
        if request.capacity_bytes == 0 {
            return Err(Error::InvalidArgument("required capacity must be positive".into()));
        }
        if request.volume_capabilities.is_empty() {
            return Err(Error::InvalidArgument("volume capabilities are required".into()));
        }
        let pool_name = request
            .parameters
            .get(PARAM_STORAGE_POOL)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("parameter {} is required", PARAM_STORAGE_POOL))
            })?;
        let system_id = request
            .parameters
            .get(PARAM_SYSTEM_ID)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| self.default_system_id())
            .ok_or_else(|| {
                Error::InvalidArgument("no system given and no default system configured".into())
            })?
            .to_string();

        let client = self.registry().require_probe(&system_id).await?;

        let pool = client
            .get_storage_pools()
            .await
            .map_err(|e| Error::internal("can't read storage pools", e))?
            .into_iter()
            .find(|p| &p.name == pool_name || &p.id == pool_name)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "storage pool {} not found on system {}",
                    pool_name, system_id
                ))
            })?;

        let size_in_kb = request.capacity_bytes.div_ceil(1024);
        let volume_id = client
            .create_volume(CreateVolumeParams {
                name: request.name.clone(),
                size_in_kb,
                storage_pool_id: pool.id.clone(),
                volume_type: VolumeType::ThinProvisioned,
            })
            .await
            .map_err(|e| Error::internal(format!("can't create volume {}", request.name), e))?;

        let composite = CompositeId::new(system_id.clone(), volume_id)?;
        info!(volume = %composite, pool = %pool.name, size_in_kb, "volume created");

        let mut context = Parameters::new();
        context.insert("storagePool".to_string(), pool.name);
        context.insert(PARAM_SYSTEM_ID.to_string(), system_id);

        Ok(Volume {
            volume_id: composite.encode(),
            capacity_bytes: size_in_kb.saturating_mul(1024),
            volume_context: context,
        })
    }
}
