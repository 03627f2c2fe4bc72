//! Typed snapshots of broker state as reported by rabbitmqctl.
//!
//! Every query returns a fresh point-in-time snapshot; nothing here is
//! cached between reconciliation passes.

use serde::Deserialize;

/// `cluster_status --formatter json`, reduced to the fields the reconciler
/// compares against. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClusterStatus {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub running_nodes: Vec<String>,
}

impl ClusterStatus {
    pub fn is_running(&self, node: &str) -> bool {
        self.running_nodes.iter().any(|n| n == node)
    }
}

/// One entry of `list_vhosts --formatter json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VhostEntry {
    pub name: String,
}

/// One entry of `list_users --formatter json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservedUser {
    pub user: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One entry of `list_user_permissions <user> --formatter json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObservedPermission {
    pub vhost: String,
    pub configure: String,
    pub write: String,
    pub read: String,
}

/// One entry of `list_policies -p <vhost> --formatter json`, reduced to the
/// fields the existence check compares; everything else the broker reports
/// (pattern, definition, priority) is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservedPolicy {
    pub vhost: String,
    pub name: String,
}

/// Extracts the local node identity from `eval "node()."` output.
///
/// The broker prints the erlang atom on the first line, wrapped in quote
/// characters depending on the node name.
pub fn parse_node_name(stdout: &str) -> String {
    stdout
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string()
}
