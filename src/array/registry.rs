//! System Registry
//!
//! Maps system IDs to array clients. Entries are created lazily the first time
//! a configured system is referenced and are never removed. Each entry carries
//! a `probed` flag that flips to true after the first successful
//! authenticate + login-version check; later probes are no-ops. Two tasks
//! probing the same fresh entry at once may both run the check, which is
//! harmless.

use crate::config::ArrayConfig;
use crate::domain::ids;
use crate::domain::ports::{ArrayClientRef, ArrayConnectorRef, PeerMdm, ProtectionDomain};
use crate::error::{Error, Result};
use crate::metrics::{OperationMetrics, Outcome};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Registry Entry
// =============================================================================

/// One known array
pub struct SystemEntry {
    system_id: String,
    client: ArrayClientRef,
    probed: AtomicBool,
    registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemEntry")
            .field("system_id", &self.system_id)
            .field("endpoint", &self.client.endpoint())
            .field("probed", &self.is_probed())
            .finish()
    }
}

impl SystemEntry {
    fn new(system_id: String, client: ArrayClientRef) -> Self {
        Self {
            system_id,
            client,
            probed: AtomicBool::new(false),
            registered_at: Utc::now(),
        }
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn client(&self) -> ArrayClientRef {
        self.client.clone()
    }

    pub fn is_probed(&self) -> bool {
        self.probed.load(Ordering::Acquire)
    }

    fn summary(&self) -> SystemSummary {
        SystemSummary {
            system_id: self.system_id.clone(),
            endpoint: self.client.endpoint().to_string(),
            probed: self.is_probed(),
            registered_at: self.registered_at,
        }
    }
}

/// Serializable view of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSummary {
    pub system_id: String,
    pub endpoint: String,
    pub probed: bool,
    pub registered_at: DateTime<Utc>,
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct ProbeStats {
    attempts: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time registry statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub configured_systems: usize,
    pub systems: usize,
    pub probed_systems: usize,
    pub probe_attempts: u64,
    pub probe_failures: u64,
}

// =============================================================================
// System ID Resolution
// =============================================================================

/// System named by a composite ID, or `default_system_id` for legacy IDs
pub fn resolve_system_id(composite_id: &str, default_system_id: Option<&str>) -> Result<String> {
    let (system_id, _) = ids::decode(composite_id);
    if !system_id.is_empty() {
        return Ok(system_id);
    }
    match default_system_id {
        Some(default) if !default.is_empty() => Ok(default.to_string()),
        _ => Err(Error::InvalidArgument(format!(
            "can't determine system for volume {}: no system in ID and no default system",
            composite_id
        ))),
    }
}

// =============================================================================
// System Registry
// =============================================================================

/// Concurrent map of system ID to array client
pub struct SystemRegistry {
    systems: DashMap<String, Arc<SystemEntry>>,
    configs: BTreeMap<String, ArrayConfig>,
    connector: Option<ArrayConnectorRef>,
    default_system_id: Option<String>,
    stats: ProbeStats,
    metrics: Option<Arc<OperationMetrics>>,
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRegistry")
            .field("systems", &self.systems.len())
            .field("configured", &self.configs.len())
            .field("default_system_id", &self.default_system_id)
            .finish()
    }
}

impl SystemRegistry {
    /// Registry backed by configured arrays; clients are built on first use
    pub fn new(connector: ArrayConnectorRef, arrays: Vec<ArrayConfig>) -> Self {
        let default_system_id = crate::config::default_system_id(&arrays);
        let configs = arrays
            .into_iter()
            .map(|a| (a.system_id.clone(), a))
            .collect();
        Self {
            systems: DashMap::new(),
            configs,
            connector: Some(connector),
            default_system_id,
            stats: ProbeStats::default(),
            metrics: None,
        }
    }

    /// Registry that only knows explicitly registered clients
    pub fn empty() -> Self {
        Self {
            systems: DashMap::new(),
            configs: BTreeMap::new(),
            connector: None,
            default_system_id: None,
            stats: ProbeStats::default(),
            metrics: None,
        }
    }

    /// Override the default system
    pub fn with_default_system(mut self, system_id: Option<String>) -> Self {
        if system_id.is_some() {
            self.default_system_id = system_id;
        }
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OperationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn default_system_id(&self) -> Option<&str> {
        self.default_system_id.as_deref()
    }

    /// Add a client for a system; an existing entry is kept
    pub fn register(&self, system_id: impl Into<String>, client: ArrayClientRef) -> Arc<SystemEntry> {
        let system_id = system_id.into();
        let mut inserted = false;
        let entry = self
            .systems
            .entry(system_id.clone())
            .or_insert_with(|| {
                inserted = true;
                Arc::new(SystemEntry::new(system_id.clone(), client))
            })
            .clone();

        if inserted {
            info!(system = %system_id, endpoint = %entry.client.endpoint(), "system registered");
        }
        entry
    }

    /// Entry for a system, created from configuration if needed
    pub fn entry(&self, system_id: &str) -> Result<Arc<SystemEntry>> {
        if let Some(entry) = self.systems.get(system_id) {
            return Ok(entry.clone());
        }

        let (config, connector) = match (self.configs.get(system_id), &self.connector) {
            (Some(config), Some(connector)) => (config, connector),
            _ => {
                return Err(Error::SystemNotConfigured {
                    system_id: system_id.to_string(),
                })
            }
        };

        let client = connector.connect(config)?;
        Ok(self.register(system_id, client))
    }

    pub fn client(&self, system_id: &str) -> Result<ArrayClientRef> {
        Ok(self.entry(system_id)?.client())
    }

    pub fn is_probed(&self, system_id: &str) -> bool {
        self.systems
            .get(system_id)
            .map(|e| e.is_probed())
            .unwrap_or(false)
    }

    /// Resolve against this registry's default system
    pub fn resolve_system_id(&self, composite_id: &str) -> Result<String> {
        resolve_system_id(composite_id, self.default_system_id())
    }

    /// Make sure a system is reachable and return its client
    pub async fn require_probe(&self, system_id: &str) -> Result<ArrayClientRef> {
        if system_id.is_empty() {
            return Err(Error::InvalidArgument("system ID is required".into()));
        }

        let entry = self.entry(system_id).map_err(|e| match e {
            Error::SystemNotConfigured { .. } => e,
            other => Error::Unavailable(format!(
                "can't connect to system {}: {}",
                system_id,
                other.message()
            )),
        })?;

        if entry.is_probed() {
            return Ok(entry.client());
        }

        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        match self.probe(&entry).await {
            Ok(version) => {
                entry.probed.store(true, Ordering::Release);
                self.record_probe(Outcome::Success);
                info!(system = %system_id, version = %version, "system probed");
                Ok(entry.client())
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                self.record_probe(Outcome::Failure);
                warn!(system = %system_id, "probe failed: {}", e);
                Err(e)
            }
        }
    }

    async fn probe(&self, entry: &SystemEntry) -> Result<String> {
        entry.client.authenticate().await.map_err(|e| {
            Error::Unavailable(format!(
                "unable to login to system {}: {}",
                entry.system_id,
                e.message()
            ))
        })?;

        let version = entry.client.login_version().await.map_err(|e| {
            Error::internal(
                format!("unable to read API version of system {}", entry.system_id),
                e,
            )
        })?;

        debug!(system = %entry.system_id, version = %version, "login version");
        Ok(version)
    }

    fn record_probe(&self, outcome: Outcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_probe(outcome);
        }
    }

    /// Probe every configured system concurrently; failures are only logged
    pub async fn probe_all(&self) -> usize {
        let probes = self.configs.keys().map(|system_id| async move {
            (system_id.as_str(), self.require_probe(system_id).await)
        });

        let mut probed = 0;
        for (system_id, result) in futures::future::join_all(probes).await {
            match result {
                Ok(_) => probed += 1,
                Err(e) => warn!(system = %system_id, "system unavailable at startup: {}", e),
            }
        }
        probed
    }

    pub async fn get_protection_domains(&self, system_id: &str) -> Result<Vec<ProtectionDomain>> {
        let client = self.client(system_id)?;
        client.get_protection_domains().await.map_err(|e| {
            Error::internal(
                format!("can't read protection domains of system {}", system_id),
                e,
            )
        })
    }

    pub async fn get_peer_mdms(&self, system_id: &str) -> Result<Vec<PeerMdm>> {
        let client = self.client(system_id)?;
        client.get_peer_mdms().await.map_err(|e| {
            Error::internal(format!("can't read peer MDMs of system {}", system_id), e)
        })
    }

    /// Known entries sorted by system ID
    pub fn systems(&self) -> Vec<SystemSummary> {
        let mut systems: Vec<SystemSummary> =
            self.systems.iter().map(|e| e.value().summary()).collect();
        systems.sort_by(|a, b| a.system_id.cmp(&b.system_id));
        systems
    }

    pub fn any_probed(&self) -> bool {
        self.systems.iter().any(|e| e.value().is_probed())
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            configured_systems: self.configs.len(),
            systems: self.systems.len(),
            probed_systems: self.systems.iter().filter(|e| e.value().is_probed()).count(),
            probe_attempts: self.stats.attempts.load(Ordering::Relaxed),
            probe_failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }
}
