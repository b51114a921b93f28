//! Namespace registry
//!
//! Repository-wide prefix to URI mappings. Sessions keep their own local
//! remappings on top (see `Session::set_namespace_prefix`) and fall back to
//! this registry for anything they have not remapped.

use crate::services::error::{RepositoryError, Result};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Prefix that can never be (re)mapped, compared case-insensitively
pub const RESERVED_PREFIX: &str = "xml";

const BUILT_IN: [(&str, &str); 4] = [
    ("jcr", "http://www.jcp.org/jcr/1.0"),
    ("nt", "http://www.jcp.org/jcr/nt/1.0"),
    ("mix", "http://www.jcp.org/jcr/mix/1.0"),
    ("xml", "http://www.w3.org/XML/1998/namespace"),
];

/// Reject reserved and empty prefixes and empty URIs
pub fn validate_mapping(prefix: &str, uri: &str) -> Result<()> {
    if prefix.to_ascii_lowercase().starts_with(RESERVED_PREFIX) {
        return Err(RepositoryError::namespace(format!(
            "Attempt to register a prefix which starts with \"{}\" (case-insensitive)",
            RESERVED_PREFIX
        )));
    }
    if prefix.is_empty() || uri.is_empty() {
        return Err(RepositoryError::namespace(
            "Attempt to map the empty prefix or the empty namespace",
        ));
    }
    Ok(())
}

#[derive(Debug)]
pub struct NamespaceRegistry {
    mappings: RwLock<BTreeMap<String, String>>,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self {
            mappings: RwLock::new(
                BUILT_IN
                    .iter()
                    .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
                    .collect(),
            ),
        }
    }
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_namespace(&self, prefix: &str, uri: &str) -> Result<()> {
        validate_mapping(prefix, uri)?;
        let mut mappings = self.mappings.write().unwrap_or_else(PoisonError::into_inner);
        mappings.retain(|_, mapped| mapped != uri);
        mappings.insert(prefix.to_string(), uri.to_string());
        Ok(())
    }

    pub fn unregister_namespace(&self, prefix: &str) -> Result<()> {
        if BUILT_IN.iter().any(|(built_in, _)| *built_in == prefix) {
            return Err(RepositoryError::namespace(format!(
                "Built-in prefix \"{}\" cannot be unregistered",
                prefix
            )));
        }
        let mut mappings = self.mappings.write().unwrap_or_else(PoisonError::into_inner);
        mappings
            .remove(prefix)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::namespace(format!("Prefix \"{}\" is not registered", prefix)))
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn uri(&self, prefix: &str) -> Result<String> {
        self.read()
            .get(prefix)
            .cloned()
            .ok_or_else(|| RepositoryError::namespace(format!("Prefix \"{}\" is not registered", prefix)))
    }

    pub fn prefix(&self, uri: &str) -> Result<String> {
        self.read()
            .iter()
            .find(|(_, mapped)| *mapped == uri)
            .map(|(prefix, _)| prefix.clone())
            .ok_or_else(|| RepositoryError::namespace(format!("URI \"{}\" is not registered", uri)))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.mappings.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_ins_are_registered() {
        let registry = NamespaceRegistry::new();
        assert_eq!(registry.uri("jcr").unwrap(), "http://www.jcp.org/jcr/1.0");
        assert_eq!(registry.prefix("http://www.jcp.org/jcr/nt/1.0").unwrap(), "nt");
        assert!(registry.unregister_namespace("jcr").is_err());
    }

    #[test]
    fn test_registration_rules() {
        let registry = NamespaceRegistry::new();
        assert!(registry.register_namespace("XMLfoo", "http://x").is_err());
        assert!(registry.register_namespace("", "http://x").is_err());
        assert!(registry.register_namespace("foo", "").is_err());

        registry.register_namespace("foo", "http://foo").unwrap();
        registry.register_namespace("bar", "http://foo").unwrap();
        assert!(registry.uri("foo").is_err());
        assert_eq!(registry.prefix("http://foo").unwrap(), "bar");

        registry.unregister_namespace("bar").unwrap();
        assert!(registry.unregister_namespace("bar").is_err());
    }
}
