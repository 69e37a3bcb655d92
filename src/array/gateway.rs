//! REST Gateway Client
//!
//! [`ArrayClient`] over the array's REST management gateway. A session token
//! is obtained from `/api/login` with the configured credentials and then sent
//! as the basic-auth password on every request.

use crate::config::{ArrayConfig, GatewayConfig};
use crate::domain::ports::{
    ArrayClient, ArrayClientRef, ArrayConnector, ArrayTimestamp, ArrayVolume, CreatePairParams,
    CreateRcgParams, CreateVolumeParams, PeerMdm, ProtectionDomain, RcgAction,
    ReplicationConsistencyGroup, Sdc, SnapshotDef, SnapshotGroupResponse, StoragePool,
    VolumeStatistics, VolumeType,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_code: i64,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayVolume {
    id: String,
    #[serde(default)]
    name: Option<String>,
    size_in_kb: u64,
    #[serde(default)]
    storage_pool_id: String,
    #[serde(default)]
    ancestor_volume_id: Option<String>,
    #[serde(default)]
    consistency_group_id: Option<String>,
    volume_type: String,
    #[serde(default)]
    creation_time: i64,
}

impl From<GatewayVolume> for ArrayVolume {
    fn from(v: GatewayVolume) -> Self {
        let volume_type = match v.volume_type.as_str() {
            "Snapshot" => VolumeType::Snapshot,
            "ThickProvisioned" => VolumeType::ThickProvisioned,
            _ => VolumeType::ThinProvisioned,
        };
        ArrayVolume {
            id: v.id,
            name: v.name.unwrap_or_default(),
            size_in_kb: v.size_in_kb,
            storage_pool_id: v.storage_pool_id,
            ancestor_volume_id: v.ancestor_volume_id.filter(|s| !s.is_empty()),
            consistency_group_id: v.consistency_group_id.filter(|s| !s.is_empty()),
            volume_type,
            creation_time: ArrayTimestamp::from_seconds(v.creation_time),
            // The gateway has no readiness flag; a recorded creation time means the copy completed
            ready_to_use: v.creation_time > 0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VolumeCreatePayload<'a> {
    name: &'a str,
    volume_size_in_kb: String,
    storage_pool_id: &'a str,
    volume_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDefPayload<'a> {
    volume_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotVolumesPayload<'a> {
    snapshot_defs: Vec<SnapshotDefPayload<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BandwidthCounter {
    #[serde(default)]
    num_occured: u64,
    #[serde(default)]
    num_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayVolumeStatistics {
    user_data_read_bwc: BandwidthCounter,
    user_data_write_bwc: BandwidthCounter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayRcg {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    protection_domain_id: String,
    #[serde(default)]
    remote_protection_domain_id: String,
    #[serde(default)]
    destination_system_id: String,
    #[serde(default)]
    rpo_in_seconds: u64,
    #[serde(default)]
    curr_consist_mode: String,
    #[serde(default)]
    error: i64,
}

impl From<GatewayRcg> for ReplicationConsistencyGroup {
    fn from(r: GatewayRcg) -> Self {
        ReplicationConsistencyGroup {
            id: r.id,
            name: r.name,
            protection_domain_id: r.protection_domain_id,
            remote_protection_domain_id: r.remote_protection_domain_id,
            destination_system_id: r.destination_system_id,
            rpo_in_seconds: r.rpo_in_seconds,
            curr_consist_mode: r.curr_consist_mode,
            error: r.error,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RcgCreatePayload<'a> {
    name: &'a str,
    rpo_in_seconds: String,
    protection_domain_id: &'a str,
    remote_protection_domain_id: &'a str,
    destination_system_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PairCreatePayload<'a> {
    name: &'a str,
    source_volume_id: &'a str,
    destination_volume_id: &'a str,
    replication_consistency_group_id: &'a str,
    copy_type: &'a str,
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Path of a single object, e.g. `/api/instances/Volume::abc`
fn instance_path(kind: &str, id: &str) -> String {
    format!("/api/instances/{}::{}", kind, urlencoding::encode(id))
}

fn action_path(kind: &str, id: &str, action: &str) -> String {
    format!("{}/action/{}", instance_path(kind, id), action)
}

fn relationship_path(kind: &str, id: &str, to: &str) -> String {
    format!("{}/relationships/{}", instance_path(kind, id), to)
}

/// Turn a non-success gateway response into an error
fn gateway_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let parsed: Option<GatewayError> = serde_json::from_str(body).ok();
    let (message, error_code) = match parsed {
        Some(e) if !e.message.is_empty() => (e.message, e.error_code),
        Some(e) => (body.to_string(), e.error_code),
        None => (body.trim().to_string(), 0),
    };

    if status == StatusCode::UNAUTHORIZED {
        return Error::Unavailable(format!("{}: unauthorized: {}", operation, message));
    }

    Error::ArrayApi {
        operation: operation.to_string(),
        http_status: status.as_u16(),
        error_code,
        message,
    }
}

// =============================================================================
// Gateway Client
// =============================================================================

/// Client for one array's REST gateway
pub struct GatewayClient {
    config: ArrayConfig,
    http: Client,
    token: RwLock<Option<String>>,
    login_retry_max_elapsed: Duration,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("system_id", &self.config.system_id)
            .field("endpoint", &self.config.endpoint)
            .field("logged_in", &self.token.read().is_some())
            .finish()
    }
}

impl GatewayClient {
    /// Create a client; no request is made until the first call
    pub fn new(config: ArrayConfig, gateway: &GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(gateway.request_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            token: RwLock::new(None),
            login_retry_max_elapsed: gateway.login_retry_max_elapsed,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// One login attempt, classified for the retry policy
    async fn login_once(&self) -> std::result::Result<String, backoff::Error<Error>> {
        let response = self
            .http
            .get(self.url("/api/login"))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(Error::Unavailable(format!(
                    "login to {} failed: {}",
                    self.config.endpoint, e
                )))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| backoff::Error::transient(Error::from(e)))?;

        // A rejected login is not retried
        if status == StatusCode::UNAUTHORIZED {
            return Err(backoff::Error::permanent(gateway_error("login", status, &body)));
        }
        if !status.is_success() {
            let err = gateway_error("login", status, &body);
            return Err(if err.is_transient() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }

        serde_json::from_str(&body).map_err(|e| backoff::Error::permanent(Error::from(e)))
    }

    async fn login(&self) -> Result<String> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.login_retry_max_elapsed),
            ..Default::default()
        };

        let token = backoff::future::retry(policy, || async move {
            self.login_once().await.map_err(|e| {
                if let backoff::Error::Transient { err, .. } = &e {
                    warn!(system = %self.config.system_id, "login failed, retrying: {}", err);
                }
                e
            })
        })
        .await?;

        *self.token.write() = Some(token.clone());
        Ok(token)
    }

    async fn session_token(&self) -> Result<String> {
        let cached = self.token.read().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    /// Send a request, logging in again once if the session expired
    async fn send(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String> {
        let mut relogged = false;
        loop {
            let token = self.session_token().await?;
            let mut request = self
                .http
                .request(method.clone(), self.url(path))
                .basic_auth(&self.config.username, Some(&token));
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            debug!(operation, %status, "gateway response");

            if status == StatusCode::UNAUTHORIZED && !relogged {
                info!(system = %self.config.system_id, "session expired, logging in again");
                *self.token.write() = None;
                relogged = true;
                continue;
            }
            if !status.is_success() {
                return Err(gateway_error(operation, status, &text));
            }
            return Ok(text);
        }
    }

    async fn get<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        let text = self.send(operation, Method::GET, path, None).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let text = self.send(operation, Method::POST, path, Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post_unit<B: Serialize>(&self, operation: &str, path: &str, body: &B) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.send(operation, Method::POST, path, Some(body)).await?;
        Ok(())
    }

    fn system_id(&self) -> &str {
        &self.config.system_id
    }
}

#[async_trait]
impl ArrayClient for GatewayClient {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    #[instrument(skip(self), fields(system = %self.config.system_id))]
    async fn authenticate(&self) -> Result<()> {
        *self.token.write() = None;
        self.login().await.map(|_| ())
    }

    async fn login_version(&self) -> Result<String> {
        self.get("version", "/api/version").await
    }

    async fn get_protection_domains(&self) -> Result<Vec<ProtectionDomain>> {
        let path = relationship_path("System", self.system_id(), "ProtectionDomain");
        self.get("getProtectionDomains", &path).await
    }

    async fn get_peer_mdms(&self) -> Result<Vec<PeerMdm>> {
        self.get("getPeerMdms", "/api/types/PeerMdm/instances").await
    }

    async fn get_storage_pools(&self) -> Result<Vec<StoragePool>> {
        self.get("getStoragePools", "/api/types/StoragePool/instances")
            .await
    }

    async fn get_volume(&self, volume_id: &str) -> Result<ArrayVolume> {
        let volume: GatewayVolume = self
            .get("getVolume", &instance_path("Volume", volume_id))
            .await?;
        Ok(volume.into())
    }

    async fn find_volume_id(&self, name: &str) -> Result<String> {
        self.post(
            "queryIdByKey",
            "/api/types/Volume/instances/action/queryIdByKey",
            &serde_json::json!({ "name": name }),
        )
        .await
    }

    async fn create_volume(&self, params: CreateVolumeParams) -> Result<String> {
        let payload = VolumeCreatePayload {
            name: &params.name,
            volume_size_in_kb: params.size_in_kb.to_string(),
            storage_pool_id: &params.storage_pool_id,
            volume_type: params.volume_type.to_string(),
        };
        let response: IdResponse = self
            .post("createVolume", "/api/types/Volume/instances", &payload)
            .await?;
        Ok(response.id)
    }

    async fn set_volume_name(&self, volume_id: &str, name: &str) -> Result<()> {
        self.post_unit(
            "setVolumeName",
            &action_path("Volume", volume_id, "setVolumeName"),
            &serde_json::json!({ "newName": name }),
        )
        .await
    }

    async fn get_volume_statistics(&self, volume_id: &str) -> Result<VolumeStatistics> {
        let stats: GatewayVolumeStatistics = self
            .get(
                "getVolumeStatistics",
                &relationship_path("Volume", volume_id, "Statistics"),
            )
            .await?;
        Ok(VolumeStatistics {
            read_count: stats.user_data_read_bwc.num_occured,
            write_count: stats.user_data_write_bwc.num_occured,
            sample_seconds: stats.user_data_write_bwc.num_seconds,
        })
    }

    async fn find_sdc_by_guid(&self, guid: &str) -> Result<Sdc> {
        let sdcs: Vec<Sdc> = self
            .get("getSdcs", &relationship_path("System", self.system_id(), "Sdc"))
            .await?;
        sdcs.into_iter()
            .find(|s| s.sdc_guid == guid)
            .ok_or_else(|| Error::ArrayObjectNotFound {
                kind: "Sdc".into(),
                id: guid.to_string(),
            })
    }

    async fn snapshot_volumes(&self, defs: &[SnapshotDef]) -> Result<SnapshotGroupResponse> {
        let payload = SnapshotVolumesPayload {
            snapshot_defs: defs
                .iter()
                .map(|d| SnapshotDefPayload {
                    volume_id: &d.volume_id,
                    snapshot_name: d.snapshot_name.as_deref(),
                })
                .collect(),
        };
        self.post(
            "snapshotVolumes",
            &action_path("System", self.system_id(), "snapshotVolumes"),
            &payload,
        )
        .await
    }

    async fn create_replication_consistency_group(
        &self,
        params: CreateRcgParams,
    ) -> Result<String> {
        let payload = RcgCreatePayload {
            name: &params.name,
            rpo_in_seconds: params.rpo_in_seconds.to_string(),
            protection_domain_id: &params.protection_domain_id,
            remote_protection_domain_id: &params.remote_protection_domain_id,
            destination_system_id: &params.destination_system_id,
        };
        let response: IdResponse = self
            .post(
                "createReplicationConsistencyGroup",
                "/api/types/ReplicationConsistencyGroup/instances",
                &payload,
            )
            .await?;
        Ok(response.id)
    }

    async fn get_replication_consistency_group(
        &self,
        rcg_id: &str,
    ) -> Result<ReplicationConsistencyGroup> {
        let rcg: GatewayRcg = self
            .get(
                "getReplicationConsistencyGroup",
                &instance_path("ReplicationConsistencyGroup", rcg_id),
            )
            .await?;
        Ok(rcg.into())
    }

    async fn delete_replication_consistency_group(&self, rcg_id: &str) -> Result<()> {
        self.post_unit(
            "removeReplicationConsistencyGroup",
            &action_path(
                "ReplicationConsistencyGroup",
                rcg_id,
                "removeReplicationConsistencyGroup",
            ),
            &serde_json::json!({}),
        )
        .await
    }

    async fn execute_rcg_action(&self, rcg_id: &str, action: RcgAction) -> Result<()> {
        self.post_unit(
            action.as_str(),
            &action_path("ReplicationConsistencyGroup", rcg_id, action.as_str()),
            &serde_json::json!({}),
        )
        .await
    }

    async fn create_replication_pair(&self, params: CreatePairParams) -> Result<String> {
        let payload = PairCreatePayload {
            name: &params.name,
            source_volume_id: &params.source_volume_id,
            destination_volume_id: &params.destination_volume_id,
            replication_consistency_group_id: &params.replication_consistency_group_id,
            copy_type: "OnlineCopy",
        };
        let response: IdResponse = self
            .post(
                "createReplicationPair",
                "/api/types/ReplicationPair/instances",
                &payload,
            )
            .await?;
        Ok(response.id)
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Builds a [`GatewayClient`] per configured array
#[derive(Debug, Clone, Default)]
pub struct GatewayConnector {
    config: GatewayConfig,
}

impl GatewayConnector {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

impl ArrayConnector for GatewayConnector {
    fn connect(&self, config: &ArrayConfig) -> Result<ArrayClientRef> {
        Ok(Arc::new(GatewayClient::new(config.clone(), &self.config)?))
    }
}
