//! Capability-based permission model for bridges.
//!
//! Bridges declare the permissions they need. The registry hands the
//! declarations to a [`PermissionPolicy`] when a bridge is registered and
//! keeps them read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A class of resource a bridge can request access to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionType {
    /// Read or write files.
    FileSystem,

    /// Open network connections.
    Network,

    /// Spawn subprocesses.
    Process,

    /// Hold in-memory state.
    Memory,

    /// Read clocks or set timers.
    Time,

    /// Use cryptographic primitives.
    Crypto,

    /// Persist data or write to an output.
    Storage,

    /// Custom permission for extension.
    Custom(String),
}

impl PermissionType {
    /// Parse a permission type from a string.
    pub fn parse(s: &str) -> Self {
        match s {
            "filesystem" => PermissionType::FileSystem,
            "network" => PermissionType::Network,
            "process" => PermissionType::Process,
            "memory" => PermissionType::Memory,
            "time" => PermissionType::Time,
            "crypto" => PermissionType::Crypto,
            "storage" => PermissionType::Storage,
            other => PermissionType::Custom(other.to_string()),
        }
    }

    /// Convert permission type to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            PermissionType::FileSystem => "filesystem",
            PermissionType::Network => "network",
            PermissionType::Process => "process",
            PermissionType::Memory => "memory",
            PermissionType::Time => "time",
            PermissionType::Crypto => "crypto",
            PermissionType::Storage => "storage",
            PermissionType::Custom(s) => s,
        }
    }
}

impl From<String> for PermissionType {
    fn from(s: String) -> Self {
        PermissionType::parse(&s)
    }
}

impl From<PermissionType> for String {
    fn from(kind: PermissionType) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single permission declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "type")]
    pub kind: PermissionType,

    /// Resource the permission applies to, e.g. `debug.logging`.
    pub resource: String,

    /// Allowed actions on the resource.
    #[serde(default)]
    pub actions: Vec<String>,

    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new(
        kind: PermissionType,
        resource: impl Into<String>,
        actions: &[&str],
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            resource: resource.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            description: description.into(),
        }
    }

    /// Check if the permission covers an action.
    pub fn allows(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// A set of permission types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    kinds: HashSet<PermissionType>,
}

impl PermissionSet {
    /// Create an empty permission set.
    pub fn new() -> Self {
        Self {
            kinds: HashSet::new(),
        }
    }

    /// Create a permission set from a list of permission type strings.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = strings
            .into_iter()
            .map(|s| PermissionType::parse(s.as_ref()))
            .collect();
        Self { kinds }
    }

    /// Add a permission type to the set.
    pub fn add(&mut self, kind: PermissionType) {
        self.kinds.insert(kind);
    }

    /// Check if the set contains a permission type.
    pub fn has(&self, kind: &PermissionType) -> bool {
        self.kinds.contains(kind)
    }

    /// Check if this set is a superset of another.
    pub fn contains_all(&self, other: &PermissionSet) -> bool {
        other.kinds.is_subset(&self.kinds)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionType> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl FromIterator<PermissionType> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = PermissionType>>(iter: T) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

/// Decides whether a bridge may be registered with its declared permissions.
pub trait PermissionPolicy: Send + Sync {
    /// Return `Err(reason)` to refuse the bridge.
    fn evaluate(&self, bridge_id: &str, permissions: &[Permission]) -> Result<(), String>;
}

/// Policy that admits every bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionPolicy for AllowAll {
    fn evaluate(&self, _bridge_id: &str, _permissions: &[Permission]) -> Result<(), String> {
        Ok(())
    }
}

/// Policy configuration, usually loaded from the `[policy]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Admit bridges that have no explicit grant.
    pub default_allow: bool,

    /// Bridges that are always refused.
    pub denied_bridges: Vec<String>,

    /// Per-bridge allowed permission types.
    pub grants: HashMap<String, Vec<String>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_allow: true,
            denied_bridges: Vec::new(),
            grants: HashMap::new(),
        }
    }
}

/// Policy backed by a fixed table of grants.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    default_allow: bool,
    denied: HashSet<String>,
    grants: HashMap<String, PermissionSet>,
}

impl StaticPolicy {
    /// A policy that refuses any bridge without a grant.
    pub fn deny_by_default() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            default_allow: config.default_allow,
            denied: config.denied_bridges.iter().cloned().collect(),
            grants: config
                .grants
                .iter()
                .map(|(id, kinds)| (id.clone(), PermissionSet::from_strings(kinds)))
                .collect(),
        }
    }

    pub fn grant(mut self, bridge_id: impl Into<String>, kinds: PermissionSet) -> Self {
        self.grants.insert(bridge_id.into(), kinds);
        self
    }

    pub fn deny(mut self, bridge_id: impl Into<String>) -> Self {
        self.denied.insert(bridge_id.into());
        self
    }
}

impl PermissionPolicy for StaticPolicy {
    fn evaluate(&self, bridge_id: &str, permissions: &[Permission]) -> Result<(), String> {
        if self.denied.contains(bridge_id) {
            return Err("bridge is on the deny list".to_string());
        }

        match self.grants.get(bridge_id) {
            Some(granted) => {
                for permission in permissions {
                    if !granted.has(&permission.kind) {
                        return Err(format!(
                            "{} access to {} was not granted",
                            permission.kind, permission.resource
                        ));
                    }
                }
                Ok(())
            }
            None if self.default_allow || permissions.is_empty() => Ok(()),
            None => Err("no permissions granted".to_string()),
        }
    }
}
