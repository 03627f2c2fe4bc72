//! Test Utilities - exportiert für Integrationstests
//!
//! Der MockBroker zeichnet jede Control-Plane-Operation auf, hält einen
//! mutierbaren In-Memory-Zustand und kann pro Kommando Fehlschläge
//! injizieren (für Retry-Tests).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use bunny_config::PolicySpec;

use crate::ctl::CommandError;
use crate::observed::{ClusterStatus, ObservedPermission, ObservedPolicy, ObservedUser, VhostEntry};
use crate::BrokerBackend;

#[derive(Default)]
struct MockState {
    node_name: String,
    cluster: ClusterStatus,
    vhosts: Vec<String>,
    users: Vec<ObservedUser>,
    permissions: HashMap<String, Vec<ObservedPermission>>,
    policies: Vec<ObservedPolicy>,
    parameters_output: String,
}

/// Mock Broker Backend für Tests.
#[derive(Default)]
pub struct MockBroker {
    state: Mutex<MockState>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, u32>>,
}

impl MockBroker {
    pub fn new() -> Self {
        let broker = Self::default();
        broker.state.lock().unwrap().node_name = "rabbit@local".to_string();
        broker
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    pub fn set_node_name(&self, name: &str) {
        self.state.lock().unwrap().node_name = name.to_string();
    }

    pub fn set_cluster(&self, name: &str, running_nodes: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.cluster = ClusterStatus {
            cluster_name: name.to_string(),
            running_nodes: running_nodes.iter().map(|s| s.to_string()).collect(),
        };
    }

    pub fn add_vhost_entry(&self, name: &str) {
        self.state.lock().unwrap().vhosts.push(name.to_string());
    }

    pub fn add_user_entry(&self, user: &str, tags: &[&str]) {
        self.state.lock().unwrap().users.push(ObservedUser {
            user: user.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        });
    }

    pub fn add_permission_entry(&self, user: &str, permission: ObservedPermission) {
        self.state
            .lock()
            .unwrap()
            .permissions
            .entry(user.to_string())
            .or_default()
            .push(permission);
    }

    pub fn add_policy_entry(&self, policy: ObservedPolicy) {
        self.state.lock().unwrap().policies.push(policy);
    }

    pub fn set_parameters_output(&self, output: &str) {
        self.state.lock().unwrap().parameters_output = output.to_string();
    }

    /// Lässt die nächsten `times` Aufrufe des Kommandos fehlschlagen.
    pub fn fail_times(&self, command: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(command.to_string(), times);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Alle aufgezeichneten Operationen in Aufruf-Reihenfolge.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Anzahl der Aufrufe deren Aufzeichnung mit `prefix` beginnt.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn users(&self) -> Vec<ObservedUser> {
        self.state.lock().unwrap().users.clone()
    }

    pub fn vhosts(&self) -> Vec<String> {
        self.state.lock().unwrap().vhosts.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn maybe_fail(&self, command: &str) -> Result<(), CommandError> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(command) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CommandError::Failed {
                    command: command.to_string(),
                    code: Some(69),
                    stderr: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerBackend for MockBroker {
    async fn cluster_status(&self) -> Result<ClusterStatus, CommandError> {
        self.record("cluster_status".to_string());
        self.maybe_fail("cluster_status")?;
        Ok(self.state.lock().unwrap().cluster.clone())
    }

    async fn node_name(&self) -> Result<String, CommandError> {
        self.record("node_name".to_string());
        self.maybe_fail("node_name")?;
        Ok(self.state.lock().unwrap().node_name.clone())
    }

    async fn list_vhosts(&self) -> Result<Vec<VhostEntry>, CommandError> {
        self.record("list_vhosts".to_string());
        self.maybe_fail("list_vhosts")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .vhosts
            .iter()
            .map(|name| VhostEntry { name: name.clone() })
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<ObservedUser>, CommandError> {
        self.record("list_users".to_string());
        self.maybe_fail("list_users")?;
        Ok(self.state.lock().unwrap().users.clone())
    }

    async fn list_user_permissions(&self, user: &str) -> Result<Vec<ObservedPermission>, CommandError> {
        self.record(format!("list_user_permissions {}", user));
        self.maybe_fail("list_user_permissions")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .permissions
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_policies(&self, vhost: Option<&str>) -> Result<Vec<ObservedPolicy>, CommandError> {
        match vhost {
            Some(vhost) => self.record(format!("list_policies {}", vhost)),
            None => self.record("list_policies".to_string()),
        }
        self.maybe_fail("list_policies")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .policies
            .iter()
            .filter(|p| vhost.map_or(true, |v| p.vhost == v))
            .cloned()
            .collect())
    }

    async fn list_parameters(&self) -> Result<String, CommandError> {
        self.record("list_parameters".to_string());
        self.maybe_fail("list_parameters")?;
        Ok(self.state.lock().unwrap().parameters_output.clone())
    }

    async fn set_cluster_name(&self, name: &str) -> Result<(), CommandError> {
        self.record(format!("set_cluster_name {}", name));
        self.maybe_fail("set_cluster_name")?;
        self.state.lock().unwrap().cluster.cluster_name = name.to_string();
        Ok(())
    }

    async fn stop_app(&self) -> Result<(), CommandError> {
        self.record("stop_app".to_string());
        self.maybe_fail("stop_app")
    }

    async fn start_app(&self) -> Result<(), CommandError> {
        self.record("start_app".to_string());
        self.maybe_fail("start_app")
    }

    async fn join_cluster(&self, master: &str) -> Result<(), CommandError> {
        self.record(format!("join_cluster {}", master));
        self.maybe_fail("join_cluster")?;

        // Nach erfolgreichem Join laufen Master und lokaler Node im Cluster
        let mut state = self.state.lock().unwrap();
        let local = state.node_name.clone();
        for node in [master.to_string(), local] {
            if !state.cluster.running_nodes.contains(&node) {
                state.cluster.running_nodes.push(node);
            }
        }
        Ok(())
    }

    async fn reset_node(&self) -> Result<(), CommandError> {
        self.record("reset".to_string());
        self.maybe_fail("reset")
    }

    async fn restart_service(&self) -> Result<(), CommandError> {
        self.record("restart_service".to_string());
        self.maybe_fail("restart_service")
    }

    async fn add_vhost(&self, name: &str) -> Result<(), CommandError> {
        self.record(format!("add_vhost {}", name));
        self.maybe_fail("add_vhost")?;
        self.state.lock().unwrap().vhosts.push(name.to_string());
        Ok(())
    }

    async fn add_user(&self, name: &str, password: &str) -> Result<(), CommandError> {
        self.record(format!("add_user {} {}", name, password));
        self.maybe_fail("add_user")?;
        self.state.lock().unwrap().users.push(ObservedUser {
            user: name.to_string(),
            tags: vec![],
        });
        Ok(())
    }

    async fn set_user_tags(&self, name: &str, tags: &[String]) -> Result<(), CommandError> {
        self.record(format!("set_user_tags {} {}", name, tags.join(" ")));
        self.maybe_fail("set_user_tags")?;
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.iter_mut().find(|u| u.user == name) {
            user.tags = tags.to_vec();
        }
        Ok(())
    }

    async fn set_permissions(
        &self,
        vhost: &str,
        user: &str,
        configure: &str,
        write: &str,
        read: &str,
    ) -> Result<(), CommandError> {
        self.record(format!(
            "set_permissions {} {} {} {} {}",
            vhost, user, configure, write, read
        ));
        self.maybe_fail("set_permissions")?;

        let permission = ObservedPermission {
            vhost: vhost.to_string(),
            configure: configure.to_string(),
            write: write.to_string(),
            read: read.to_string(),
        };
        let mut state = self.state.lock().unwrap();
        let entries = state.permissions.entry(user.to_string()).or_default();
        match entries.iter_mut().find(|p| p.vhost == vhost) {
            Some(existing) => *existing = permission,
            None => entries.push(permission),
        }
        Ok(())
    }

    async fn set_policy(&self, spec: &PolicySpec) -> Result<(), CommandError> {
        self.record(format!("set_policy {}", spec.name));
        self.maybe_fail("set_policy")?;

        let vhost = spec.vhost.clone().unwrap_or_else(|| "/".to_string());
        let observed = ObservedPolicy {
            vhost: vhost.clone(),
            name: spec.name.clone(),
        };
        let mut state = self.state.lock().unwrap();
        match state
            .policies
            .iter_mut()
            .find(|p| p.name == spec.name && p.vhost == vhost)
        {
            Some(existing) => *existing = observed,
            None => state.policies.push(observed),
        }
        Ok(())
    }

    async fn clear_policy(&self, name: &str, vhost: Option<&str>) -> Result<(), CommandError> {
        match vhost {
            Some(vhost) => self.record(format!("clear_policy {} {}", name, vhost)),
            None => self.record(format!("clear_policy {}", name)),
        }
        self.maybe_fail("clear_policy")?;
        self.state
            .lock()
            .unwrap()
            .policies
            .retain(|p| !(p.name == name && vhost.map_or(true, |v| p.vhost == v)));
        Ok(())
    }
}
