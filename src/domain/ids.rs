//! Composite Identifiers
//!
//! Volumes, snapshots, snapshot groups and protection groups are exposed to
//! callers as `"<systemID>-<arrayLocalID>"`. [`CompositeId`] is the only place
//! that string is built or taken apart.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Separator between the system ID and the array-local ID
pub const ID_SEPARATOR: char = '-';

/// A system-qualified array object identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeId {
    system_id: String,
    local_id: String,
}

impl CompositeId {
    /// Build a system-qualified ID; both parts are required
    pub fn new(system_id: impl Into<String>, local_id: impl Into<String>) -> Result<Self> {
        let system_id = system_id.into();
        let local_id = local_id.into();

        if system_id.is_empty() {
            return Err(Error::InvalidArgument("system ID is required".into()));
        }
        if local_id.is_empty() {
            return Err(Error::InvalidArgument("array object ID is required".into()));
        }
        if system_id.contains(ID_SEPARATOR) {
            return Err(Error::InvalidArgument(format!(
                "system ID {} must not contain '{}'",
                system_id, ID_SEPARATOR
            )));
        }

        Ok(Self {
            system_id,
            local_id,
        })
    }

    /// Split a wire ID on the first separator.
    ///
    /// Legacy IDs carry no separator; the system ID is then empty and the
    /// whole input is the local ID.
    pub fn decode(id: &str) -> Self {
        match id.split_once(ID_SEPARATOR) {
            Some((system_id, local_id)) => Self {
                system_id: system_id.trim().to_string(),
                local_id: local_id.to_string(),
            },
            None => Self {
                system_id: String::new(),
                local_id: id.to_string(),
            },
        }
    }

    /// Wire form of the ID
    pub fn encode(&self) -> String {
        if self.system_id.is_empty() {
            return self.local_id.clone();
        }
        format!("{}{}{}", self.system_id, ID_SEPARATOR, self.local_id)
    }

    /// System ID; empty for legacy IDs
    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    /// Array-local object ID
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Whether the ID names its system
    pub fn is_qualified(&self) -> bool {
        !self.system_id.is_empty()
    }

    /// Fill in the system for a legacy ID
    pub fn or_system(self, default_system_id: &str) -> Self {
        if self.is_qualified() {
            self
        } else {
            Self {
                system_id: default_system_id.to_string(),
                local_id: self.local_id,
            }
        }
    }
}

impl std::fmt::Display for CompositeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Encode `(system_id, local_id)` into the wire form
pub fn encode(system_id: &str, local_id: &str) -> Result<String> {
    CompositeId::new(system_id, local_id).map(|id| id.encode())
}

/// Decode a wire ID into `(system_id, local_id)`
pub fn decode(id: &str) -> (String, String) {
    let id = CompositeId::decode(id);
    (id.system_id, id.local_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_round_trip() {
        let cases = [
            ("sysA", "v1"),
            ("7f5d8fa1b2c3d4e5", "a1b2c3d400000001"),
            ("sysA", "snap-with-dashes"),
        ];
        for (system, local) in cases {
            let wire = encode(system, local).unwrap();
            assert_eq!(decode(&wire), (system.to_string(), local.to_string()));
        }
    }

    #[test]
    fn test_legacy_id_has_no_system() {
        let id = CompositeId::decode("a1b2c3d4");
        assert!(!id.is_qualified());
        assert_eq!(id.local_id(), "a1b2c3d4");

        let resolved = id.or_system("sysDefault");
        assert_eq!(resolved.encode(), "sysDefault-a1b2c3d4");
    }

    #[test]
    fn test_encode_rejects_empty_parts() {
        assert_matches!(encode("", "v1"), Err(Error::InvalidArgument(_)));
        assert_matches!(encode("sysA", ""), Err(Error::InvalidArgument(_)));
        assert_matches!(encode("sys-A", "v1"), Err(Error::InvalidArgument(_)));
    }

    #[test]
    fn test_qualified_id_keeps_its_system() {
        let id = CompositeId::decode("sysA-v1").or_system("sysB");
        assert_eq!(id.system_id(), "sysA");
        assert_eq!(id.to_string(), "sysA-v1");
    }
}
