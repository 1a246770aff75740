//! Per-process PDP identity and PAP-assigned attributes.

use parking_lot::RwLock;
use uuid::Uuid;

/// Generate a fresh PDP name: `opa-<uuid v4>`.
pub fn generate_pdp_name() -> String {
    format!("opa-{}", Uuid::new_v4())
}

#[derive(Debug, Default)]
struct Attributes {
    subgroup: Option<String>,
    heartbeat_interval_ms: i64,
}

/// Who this PDP is.
///
/// The name and group are fixed for the process lifetime. Subgroup and
/// heartbeat interval start unset and are written only by the update handler.
#[derive(Debug)]
pub struct PdpIdentity {
    name: String,
    group: String,
    attributes: RwLock<Attributes>,
}

impl PdpIdentity {
    /// Create an identity with a freshly generated name.
    pub fn new(group: impl Into<String>) -> Self {
        Self::with_name(generate_pdp_name(), group)
    }

    pub fn with_name(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            attributes: RwLock::new(Attributes::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Assigned subgroup, `None` until the first update.
    pub fn subgroup(&self) -> Option<String> {
        self.attributes.read().subgroup.clone()
    }

    pub fn heartbeat_interval_ms(&self) -> i64 {
        self.attributes.read().heartbeat_interval_ms
    }

    /// Apply both PAP-assigned attributes under one write lock.
    pub fn assign(&self, subgroup: String, heartbeat_interval_ms: i64) {
        let mut attrs = self.attributes.write();
        attrs.subgroup = Some(subgroup).filter(|s| !s.is_empty());
        attrs.heartbeat_interval_ms = heartbeat_interval_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_unique() {
        let a = generate_pdp_name();
        let b = generate_pdp_name();
        assert!(a.starts_with("opa-"));
        assert_eq!(a.len(), "opa-".len() + 36);
        assert_ne!(a, b);
    }

    #[test]
    fn attributes_start_unset() {
        let identity = PdpIdentity::new("defaultGroup");
        assert_eq!(identity.group(), "defaultGroup");
        assert_eq!(identity.subgroup(), None);
        assert_eq!(identity.heartbeat_interval_ms(), 0);
    }

    #[test]
    fn assign_overwrites() {
        let identity = PdpIdentity::with_name("opa-1", "defaultGroup");
        identity.assign("opa".to_string(), 1000);
        identity.assign("opa-b".to_string(), -1);
        assert_eq!(identity.name(), "opa-1");
        assert_eq!(identity.subgroup().as_deref(), Some("opa-b"));
        assert_eq!(identity.heartbeat_interval_ms(), -1);
    }
}
