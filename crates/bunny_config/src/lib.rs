use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// The default vhost used when a permission declaration omits one.
pub const DEFAULT_VHOST: &str = "/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Desired cluster membership.
///
/// The first entry of `nodes` is the master node; all other nodes join it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name as reported by `cluster_status`
    pub name: String,
    /// Ordered node list, first entry is the master
    pub nodes: Vec<String>,
}

impl ClusterSpec {
    /// The master node (first entry of the node list).
    pub fn master(&self) -> Option<&str> {
        self.nodes.first().map(|s| s.as_str())
    }
}

/// A vhost that should exist. Existence is binary, there are no attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VhostSpec {
    pub name: String,
}

/// A broker-internal user that should exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    /// Write-only: used when creating the user, never read back for comparison
    #[serde(default)]
    pub password: Option<String>,
    /// Desired tags; the managed tag is added implicitly by the reconciler
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A permission triple for one (user, vhost) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionSpec {
    pub user: String,
    /// Defaults to "/" when absent or empty
    #[serde(default)]
    pub vhost: Option<String>,
    pub configure: String,
    pub write: String,
    pub read: String,
}

impl PermissionSpec {
    /// The effective vhost, falling back to the default vhost.
    pub fn vhost(&self) -> &str {
        match self.vhost.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => DEFAULT_VHOST,
        }
    }
}

/// What a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyTo {
    All,
    Queues,
    Exchanges,
}

impl ApplyTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyTo::All => "all",
            ApplyTo::Queues => "queues",
            ApplyTo::Exchanges => "exchanges",
        }
    }
}

/// A single value inside a policy definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Ordered key/value pairs of a policy definition.
///
/// A plain serde map would lose the declaration order of the config file, but
/// the order matters for the serialized command argument, so the entries are
/// kept in a vector and deserialized through a map visitor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyParameters(pub Vec<(String, PolicyValue)>);

impl PolicyParameters {
    pub fn iter(&self) -> impl Iterator<Item = &(String, PolicyValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de> Deserialize<'de> for PolicyParameters {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = PolicyParameters;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of policy definition entries")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, PolicyValue>()? {
                    entries.push((key, value));
                }
                Ok(PolicyParameters(entries))
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}

impl Serialize for PolicyParameters {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A policy that should be set on the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    /// Regex matched against queue/exchange names
    pub pattern: String,
    /// Policy definition, serialized as a single-line JSON object
    #[serde(default)]
    pub definition: PolicyParameters,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub vhost: Option<String>,
    #[serde(default)]
    pub apply_to: Option<ApplyTo>,
}

/// The declarative desired state of one broker.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cluster: Option<ClusterSpec>,
    #[serde(default)]
    pub vhosts: Vec<VhostSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub permissions: Vec<PermissionSpec>,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        Self::load(&dir.join("bunny.toml"))
    }

    pub fn user(&self, name: &str) -> Option<&UserSpec> {
        self.users.iter().find(|u| u.name == name)
    }

    pub fn vhost(&self, name: &str) -> Option<&VhostSpec> {
        self.vhosts.iter().find(|v| v.name == name)
    }

    pub fn policy(&self, name: &str) -> Option<&PolicySpec> {
        self.policies.iter().find(|p| p.name == name)
    }

    pub fn permissions_for(&self, user: &str) -> Vec<&PermissionSpec> {
        self.permissions.iter().filter(|p| p.user == user).collect()
    }
}
