//! Host connectivity diagnostic
//!
//! Answers two questions for a node-health monitor: is the node's SDC
//! connected to the array, and has any of the given volumes seen I/O in the
//! array's last sampling window. Per-volume problems are reported as messages
//! rather than failing the call.

use crate::controlplane::service::ExtensionService;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Reply to a call with neither node nor volumes
pub const NOP_MESSAGE: &str = "ValidateVolumeHostConnectivity is implemented";

const SDC_CONNECTED: &str = "Connected";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateConnectivityRequest {
    /// SDC GUID of the node
    #[serde(default, rename = "nodeID")]
    pub node_id: String,
    #[serde(default, rename = "arrayID")]
    pub array_id: Option<String>,
    #[serde(default, rename = "volumeIDs")]
    pub volume_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateConnectivityResponse {
    pub connected: bool,
    pub ios_in_progress: bool,
    pub messages: Vec<String>,
}

impl ExtensionService {
    #[instrument(skip(self, request), fields(node = %request.node_id))]
    pub async fn validate_volume_host_connectivity(
        &self,
        request: &ValidateConnectivityRequest,
    ) -> Result<ValidateConnectivityResponse> {
        let mut response = ValidateConnectivityResponse::default();

        if request.volume_ids.is_empty() && request.node_id.is_empty() {
            response.messages.push(NOP_MESSAGE.to_string());
            return Ok(response);
        }
        if request.node_id.is_empty() {
            return Err(Error::InvalidArgument("The NodeID is a required field".into()));
        }

        self.instrumented("validate_volume_host_connectivity", async move {
            let mut system_id = request
                .array_id
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    request
                        .volume_ids
                        .first()
                        .map(|id| self.qualify(id).system_id().to_string())
                        .filter(|s| !s.is_empty())
                })
                .or_else(|| self.default_system_id().map(String::from))
                .ok_or_else(|| {
                    Error::InvalidArgument("no system given and no default system configured".into())
                })?;

            let client = self.registry().require_probe(&system_id).await?;
            let sdc = client.find_sdc_by_guid(&request.node_id).await.map_err(|_| {
                Error::InvalidArgument(format!(
                    "NodeID is invalid: {} - there is no corresponding SDC",
                    request.node_id
                ))
            })?;
            response
                .messages
                .push(format!("SDC connection state: {}", sdc.mdm_connection_state));
            response.connected = sdc.mdm_connection_state == SDC_CONNECTED;

            for volume_id in &request.volume_ids {
                let volume = self.qualify(volume_id);
                if volume.system_id() != system_id {
                    system_id = volume.system_id().to_string();
                }
                let client = match self.registry().require_probe(&system_id).await {
                    Ok(client) => client,
                    Err(_) => {
                        response
                            .messages
                            .push(format!("Could not probe system: {}", volume_id));
                        continue;
                    }
                };

                if client.get_volume(volume.local_id()).await.is_err() {
                    response
                        .messages
                        .push(format!("Could not retrieve volume: {}", volume_id));
                    continue;
                }
                let stats = match client.get_volume_statistics(volume.local_id()).await {
                    Ok(stats) => stats,
                    Err(_) => {
                        response
                            .messages
                            .push(format!("Could not retrieve volume statistics: {}", volume_id));
                        continue;
                    }
                };

                response.messages.push(format!(
                    "Volume {} writes {} reads {} for {} seconds",
                    volume_id, stats.write_count, stats.read_count, stats.sample_seconds
                ));
                if stats.read_count.saturating_add(stats.write_count) > 0 {
                    response.ios_in_progress = true;
                }
            }

            info!(
                connected = response.connected,
                ios_in_progress = response.ios_in_progress,
                "connectivity validated"
            );
            Ok(response)
        })
        .await
    }
}
