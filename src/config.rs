//! Operator configuration
//!
//! Arrays are described in a YAML or JSON file (JSON is valid YAML, so one
//! parser covers both):
//!
//! ```yaml
//! - systemID: 7f5d8fa1b2c3d4e5
//!   endpoint: https://gateway-a.example.com
//!   username: admin
//!   password: secret
//!   insecure: true
//!   isDefault: true
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Default prefix of the replication parameter keys
pub const DEFAULT_REPLICATION_PREFIX: &str = "replication.storage.dell.com";

// =============================================================================
// Array Configuration
// =============================================================================

/// Connection settings for one array
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConfig {
    #[serde(rename = "systemID")]
    pub system_id: String,
    pub endpoint: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl std::fmt::Debug for ArrayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayConfig")
            .field("system_id", &self.system_id)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("insecure", &self.insecure)
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// Parse and validate an arrays document
pub fn parse_arrays(contents: &str) -> Result<Vec<ArrayConfig>> {
    let arrays: Vec<ArrayConfig> = serde_yaml::from_str(contents)?;
    validate_arrays(&arrays)?;
    Ok(arrays)
}

/// Load the arrays file
pub fn load_arrays(path: impl AsRef<Path>) -> Result<Vec<ArrayConfig>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_arrays(&contents)
}

fn validate_arrays(arrays: &[ArrayConfig]) -> Result<()> {
    if arrays.is_empty() {
        return Err(Error::Configuration("no arrays configured".into()));
    }

    let mut seen = BTreeSet::new();
    for array in arrays {
        if array.system_id.is_empty() {
            return Err(Error::Configuration("array is missing systemID".into()));
        }
        if array.system_id.contains(crate::domain::ID_SEPARATOR) {
            return Err(Error::Configuration(format!(
                "systemID {} must not contain '{}'",
                array.system_id,
                crate::domain::ID_SEPARATOR
            )));
        }
        if array.endpoint.is_empty() {
            return Err(Error::Configuration(format!(
                "array {} is missing endpoint",
                array.system_id
            )));
        }
        if array.username.is_empty() || array.password.is_empty() {
            return Err(Error::Configuration(format!(
                "array {} is missing credentials",
                array.system_id
            )));
        }
        if !seen.insert(array.system_id.as_str()) {
            return Err(Error::Configuration(format!(
                "duplicate systemID {}",
                array.system_id
            )));
        }
    }

    if arrays.iter().filter(|a| a.is_default).count() > 1 {
        return Err(Error::Configuration(
            "more than one array is marked isDefault".into(),
        ));
    }

    Ok(())
}

/// System ID of the array marked as default
pub fn default_system_id(arrays: &[ArrayConfig]) -> Option<String> {
    arrays
        .iter()
        .find(|a| a.is_default)
        .map(|a| a.system_id.clone())
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Settings shared by every extension operation
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// System used for legacy IDs that carry no system
    pub default_system_id: Option<String>,
    /// Prefix of the replication parameter keys
    pub replication_prefix: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_system_id: None,
            replication_prefix: DEFAULT_REPLICATION_PREFIX.to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn remote_system_key(&self) -> String {
        format!("{}/remoteSystem", self.replication_prefix)
    }

    pub fn remote_storage_pool_key(&self) -> String {
        format!("{}/remoteStoragePool", self.replication_prefix)
    }

    pub fn rpo_key(&self) -> String {
        format!("{}/rpo", self.replication_prefix)
    }
}

/// Settings for the REST gateway client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Upper bound on retrying a failed login
    pub login_retry_max_elapsed: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            login_retry_max_elapsed: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const ARRAYS: &str = r#"
- systemID: sysA
  endpoint: https://gateway-a.example.com
  username: admin
  password: secret
  isDefault: true
- systemID: sysB
  endpoint: https://gateway-b.example.com
  username: admin
  password: secret
  insecure: true
"#;

    #[test]
    fn test_parse_yaml_arrays() {
        let arrays = parse_arrays(ARRAYS).unwrap();
        assert_eq!(arrays.len(), 2);
        assert!(arrays[1].insecure);
        assert_eq!(default_system_id(&arrays).as_deref(), Some("sysA"));
    }

    #[test]
    fn test_parse_json_arrays() {
        let json = r#"[{"systemID": "sysA", "endpoint": "https://a", "username": "u", "password": "p"}]"#;
        let arrays = parse_arrays(json).unwrap();
        assert_eq!(arrays[0].system_id, "sysA");
        assert!(!arrays[0].is_default);
        assert_eq!(default_system_id(&arrays), None);
    }

    #[test]
    fn test_rejects_invalid_arrays() {
        assert_matches!(parse_arrays("[]"), Err(Error::Configuration(_)));

        let duplicate = r#"[
            {"systemID": "sysA", "endpoint": "https://a", "username": "u", "password": "p"},
            {"systemID": "sysA", "endpoint": "https://b", "username": "u", "password": "p"}
        ]"#;
        assert_matches!(parse_arrays(duplicate), Err(Error::Configuration(_)));

        let two_defaults = r#"[
            {"systemID": "sysA", "endpoint": "https://a", "username": "u", "password": "p", "isDefault": true},
            {"systemID": "sysB", "endpoint": "https://b", "username": "u", "password": "p", "isDefault": true}
        ]"#;
        assert_matches!(parse_arrays(two_defaults), Err(Error::Configuration(_)));

        let dashed = r#"[{"systemID": "sys-A", "endpoint": "https://a", "username": "u", "password": "p"}]"#;
        assert_matches!(parse_arrays(dashed), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_load_arrays_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ARRAYS.as_bytes()).unwrap();

        let arrays = load_arrays(file.path()).unwrap();
        assert_eq!(arrays.len(), 2);

        assert_matches!(
            load_arrays("/nonexistent/arrays.yaml"),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let arrays = parse_arrays(ARRAYS).unwrap();
        assert!(!format!("{:?}", arrays[0]).contains("secret"));
    }

    #[test]
    fn test_parameter_keys() {
        let config = ServiceConfig::default();
        assert_eq!(
            config.remote_system_key(),
            "replication.storage.dell.com/remoteSystem"
        );
        assert_eq!(config.rpo_key(), "replication.storage.dell.com/rpo");
    }
}
