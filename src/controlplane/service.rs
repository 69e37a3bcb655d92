//! Extension Service
//!
//! Shared context for every extension operation: the system registry, the
//! service configuration and the optional metrics sink. The operations
//! themselves live in the sibling modules as `impl ExtensionService` blocks.

use crate::array::SystemRegistry;
use crate::config::ServiceConfig;
use crate::domain::ids::CompositeId;
use crate::error::{Error, Result};
use crate::metrics::{OperationMetrics, Outcome};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Caller-supplied key/value parameters or attributes
pub type Parameters = BTreeMap<String, String>;

/// Entry point for the replication, snapshot and diagnostic operations
pub struct ExtensionService {
    registry: Arc<SystemRegistry>,
    config: ServiceConfig,
    metrics: Option<Arc<OperationMetrics>>,
}

impl std::fmt::Debug for ExtensionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionService")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl ExtensionService {
    pub fn new(registry: Arc<SystemRegistry>, config: ServiceConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            metrics: None,
        })
    }

    pub fn with_metrics(
        registry: Arc<SystemRegistry>,
        config: ServiceConfig,
        metrics: Arc<OperationMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            metrics: Some(metrics),
        })
    }

    pub fn registry(&self) -> &Arc<SystemRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<OperationMetrics>> {
        self.metrics.as_ref()
    }

    /// Configured default system, falling back to the array marked default
    pub fn default_system_id(&self) -> Option<&str> {
        self.config
            .default_system_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.registry.default_system_id())
    }

    /// Decode a composite ID, filling in the default system for legacy IDs
    pub(crate) fn qualify(&self, composite_id: &str) -> CompositeId {
        let id = CompositeId::decode(composite_id);
        match self.default_system_id() {
            Some(default) => id.or_system(default),
            None => id,
        }
    }

    /// Decode a volume handle that must name both a system and a volume
    pub(crate) fn require_volume_handle(&self, volume_handle: &str) -> Result<CompositeId> {
        if volume_handle.is_empty() {
            return Err(Error::InvalidArgument("volume ID is required".into()));
        }
        let id = self.qualify(volume_handle);
        if !id.is_qualified() || id.local_id().is_empty() {
            return Err(Error::InvalidArgument(
                "failed to provide system ID or volume ID".into(),
            ));
        }
        Ok(id)
    }

    /// Run an operation with timing, outcome metrics and failure logging
    pub(crate) async fn instrumented<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        info!(operation, "operation started");

        let result = fut.await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => info!(operation, elapsed_ms = elapsed.as_millis() as u64, "operation completed"),
            Err(e) => error!(operation, code = %e.code(), "operation failed: {}", e.message()),
        }
        if let Some(metrics) = &self.metrics {
            metrics.observe(operation, Outcome::of(&result), elapsed);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::InMemoryArray;
    use assert_matches::assert_matches;

    fn service(default_system_id: Option<&str>) -> Arc<ExtensionService> {
        let registry = SystemRegistry::empty();
        registry.register("sysA", Arc::new(InMemoryArray::new("sysA")));
        let config = ServiceConfig {
            default_system_id: default_system_id.map(String::from),
            ..Default::default()
        };
        ExtensionService::new(Arc::new(registry), config)
    }

    #[test]
    fn test_volume_handle_validation() {
        let svc = service(None);
        assert_matches!(svc.require_volume_handle(""), Err(Error::InvalidArgument(_)));
        assert_matches!(svc.require_volume_handle("v1"), Err(Error::InvalidArgument(_)));
        assert_matches!(svc.require_volume_handle("sysA-"), Err(Error::InvalidArgument(_)));

        let id = svc.require_volume_handle("sysA-v1").unwrap();
        assert_eq!(id.system_id(), "sysA");
        assert_eq!(id.local_id(), "v1");
    }

    #[test]
    fn test_legacy_handle_uses_default_system() {
        let svc = service(Some("sysA"));
        let id = svc.require_volume_handle("v1").unwrap();
        assert_eq!(id.system_id(), "sysA");
        assert_eq!(svc.default_system_id(), Some("sysA"));
    }

    #[tokio::test]
    async fn test_instrumented_records_outcome() {
        let registry = Arc::new(SystemRegistry::empty());
        let metrics = Arc::new(OperationMetrics::new().unwrap());
        let svc = ExtensionService::with_metrics(registry, ServiceConfig::default(), metrics.clone());

        let ok: Result<u32> = svc.instrumented("probe", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: Result<u32> = svc
            .instrumented("probe", async { Err(Error::Internal("boom".into())) })
            .await;
        assert!(err.is_err());

        assert_eq!(metrics.operation_count("probe", Outcome::Success), 1);
        assert_eq!(metrics.operation_count("probe", Outcome::Failure), 1);
    }
}
