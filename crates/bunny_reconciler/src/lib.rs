use async_trait::async_trait;
use thiserror::Error;

use bunny_config::PolicySpec;

pub mod converge;
pub mod ctl;
pub mod drift;
pub mod observed;
pub mod retry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use ctl::{CommandError, CtlConfig, Rabbitmqctl};
use observed::{parse_node_name, ClusterStatus, ObservedPermission, ObservedPolicy, ObservedUser, VhostEntry};

pub use converge::policy::{build_set_policy_args, format_definition};
pub use converge::Outcome;

/// Tag der implizit an jedem verwalteten User gesetzt wird.
pub const MANAGED_TAG: &str = "managed-by-automation";

#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("{step} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        step: String,
        attempts: u32,
        #[source]
        source: CommandError,
    },
}

// ============================================================================
// BrokerBackend Trait - abstrahiert die rabbitmqctl-Interaktion für Tests
// ============================================================================

/// Trait für alle Control-Plane-Operationen gegen einen Broker-Node.
/// Ermöglicht Mocking für Tests.
///
/// Die Queries liefern immer frische Snapshots; der Trait cached nichts.
#[async_trait]
pub trait BrokerBackend: Send + Sync {
    // Queries
    async fn cluster_status(&self) -> Result<ClusterStatus, CommandError>;
    async fn node_name(&self) -> Result<String, CommandError>;
    async fn list_vhosts(&self) -> Result<Vec<VhostEntry>, CommandError>;
    async fn list_users(&self) -> Result<Vec<ObservedUser>, CommandError>;
    async fn list_user_permissions(&self, user: &str) -> Result<Vec<ObservedPermission>, CommandError>;
    async fn list_policies(&self, vhost: Option<&str>) -> Result<Vec<ObservedPolicy>, CommandError>;
    /// Passthrough: rohe `list_parameters` Ausgabe
    async fn list_parameters(&self) -> Result<String, CommandError>;

    // Cluster-Lifecycle
    async fn set_cluster_name(&self, name: &str) -> Result<(), CommandError>;
    async fn stop_app(&self) -> Result<(), CommandError>;
    async fn start_app(&self) -> Result<(), CommandError>;
    async fn join_cluster(&self, master: &str) -> Result<(), CommandError>;
    async fn reset_node(&self) -> Result<(), CommandError>;
    async fn restart_service(&self) -> Result<(), CommandError>;

    // Mutationen
    async fn add_vhost(&self, name: &str) -> Result<(), CommandError>;
    async fn add_user(&self, name: &str, password: &str) -> Result<(), CommandError>;
    async fn set_user_tags(&self, name: &str, tags: &[String]) -> Result<(), CommandError>;
    async fn set_permissions(
        &self,
        vhost: &str,
        user: &str,
        configure: &str,
        write: &str,
        read: &str,
    ) -> Result<(), CommandError>;
    async fn set_policy(&self, spec: &PolicySpec) -> Result<(), CommandError>;
    async fn clear_policy(&self, name: &str, vhost: Option<&str>) -> Result<(), CommandError>;
}

// ============================================================================
// RealRabbitmqctl - Echte rabbitmqctl CLI Implementierung
// ============================================================================

/// Echte Broker-Implementierung über die rabbitmqctl CLI.
pub struct RealRabbitmqctl {
    ctl: Rabbitmqctl,
}

impl RealRabbitmqctl {
    pub fn new(config: CtlConfig) -> Self {
        Self {
            ctl: Rabbitmqctl::new(config),
        }
    }
}

#[async_trait]
impl BrokerBackend for RealRabbitmqctl {
    async fn cluster_status(&self) -> Result<ClusterStatus, CommandError> {
        self.ctl
            .execute_json(&["-q", "cluster_status", "--formatter", "json"])
            .await
    }

    async fn node_name(&self) -> Result<String, CommandError> {
        let output = self.ctl.execute(&["eval", "node()."]).await?;
        Ok(parse_node_name(&output.stdout))
    }

    async fn list_vhosts(&self) -> Result<Vec<VhostEntry>, CommandError> {
        self.ctl
            .execute_json(&["list_vhosts", "--formatter", "json"])
            .await
    }

    async fn list_users(&self) -> Result<Vec<ObservedUser>, CommandError> {
        self.ctl
            .execute_json(&["list_users", "--formatter", "json"])
            .await
    }

    async fn list_user_permissions(&self, user: &str) -> Result<Vec<ObservedPermission>, CommandError> {
        self.ctl
            .execute_json(&["list_user_permissions", user, "--formatter", "json"])
            .await
    }

    async fn list_policies(&self, vhost: Option<&str>) -> Result<Vec<ObservedPolicy>, CommandError> {
        let mut args = vec!["list_policies"];
        if let Some(vhost) = vhost {
            args.push("-p");
            args.push(vhost);
        }
        args.push("--formatter");
        args.push("json");
        self.ctl.execute_json(&args).await
    }

    async fn list_parameters(&self) -> Result<String, CommandError> {
        let output = self.ctl.execute(&["list_parameters", "-q"]).await?;
        Ok(output.stdout)
    }

    async fn set_cluster_name(&self, name: &str) -> Result<(), CommandError> {
        self.ctl.execute(&["set_cluster_name", name]).await?;
        Ok(())
    }

    async fn stop_app(&self) -> Result<(), CommandError> {
        self.ctl.execute(&["stop_app"]).await?;
        Ok(())
    }

    async fn start_app(&self) -> Result<(), CommandError> {
        self.ctl.execute(&["start_app"]).await?;
        Ok(())
    }

    async fn join_cluster(&self, master: &str) -> Result<(), CommandError> {
        self.ctl.execute(&["join_cluster", master]).await?;
        Ok(())
    }

    async fn reset_node(&self) -> Result<(), CommandError> {
        self.ctl.execute(&["reset"]).await?;
        Ok(())
    }

    async fn restart_service(&self) -> Result<(), CommandError> {
        self.ctl.restart_service().await
    }

    async fn add_vhost(&self, name: &str) -> Result<(), CommandError> {
        self.ctl.execute(&["add_vhost", name]).await?;
        Ok(())
    }

    async fn add_user(&self, name: &str, password: &str) -> Result<(), CommandError> {
        self.ctl.execute(&["add_user", name, password]).await?;
        Ok(())
    }

    async fn set_user_tags(&self, name: &str, tags: &[String]) -> Result<(), CommandError> {
        let mut args = vec!["set_user_tags", name];
        args.extend(tags.iter().map(String::as_str));
        self.ctl.execute(&args).await?;
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
        self.ctl
            .execute(&["set_permissions", "--vhost", vhost, user, configure, write, read])
            .await?;
        Ok(())
    }

    async fn set_policy(&self, spec: &PolicySpec) -> Result<(), CommandError> {
        let args = build_set_policy_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.ctl.execute(&args).await?;
        Ok(())
    }

    async fn clear_policy(&self, name: &str, vhost: Option<&str>) -> Result<(), CommandError> {
        let mut args = vec!["clear_policy", name];
        if let Some(vhost) = vhost {
            args.push("-p");
            args.push(vhost);
        }
        self.ctl.execute(&args).await?;
        Ok(())
    }
}
