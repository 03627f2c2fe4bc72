//! Cluster Convergence - Membership-Join und Cluster-Name
//!
//! Der Join läuft als strikt geordnete Sequenz stop_app -> join_cluster ->
//! start_app. Schritt N+1 startet erst nachdem Schritt N erfolgreich war;
//! schlägt ein Schritt endgültig fehl, bricht die Sequenz ab und die
//! Broker-App bleibt gestoppt (kein automatisches Recovery).

use bunny_config::ClusterSpec;
use tracing::info;

use crate::converge::Outcome;
use crate::drift::{cluster_plan, ClusterAction};
use crate::retry::{run_with_retry, APP_STEP_RETRY};
use crate::{BrokerBackend, ConvergeError};

/// Stellt sicher dass der lokale Node Teil des gewünschten Clusters ist.
///
/// Der Master-Node (erster Eintrag der Node-Liste) tritt sich nie selbst
/// bei; bei ihm wird stattdessen der Cluster-Name abgeglichen.
pub async fn join<B: BrokerBackend>(backend: &B, spec: &ClusterSpec) -> Result<Outcome, ConvergeError> {
    let master = spec
        .master()
        .ok_or_else(|| ConvergeError::Precondition("cluster node list is empty".to_string()))?
        .to_string();

    let local = backend.node_name().await?;
    let status = backend.cluster_status().await?;

    match cluster_plan(spec, &master, &local, &status) {
        ClusterAction::AlreadyJoined => {
            info!(node = %local, cluster = %spec.name, "cluster membership already converged");
            Ok(Outcome::Unchanged)
        }
        ClusterAction::Rename { to } => {
            info!(from = %status.cluster_name, to = %to, "correcting cluster name on master node");
            backend.set_cluster_name(&to).await?;
            Ok(Outcome::Changed)
        }
        ClusterAction::Join { master } => {
            info!(node = %local, master = %master, "joining cluster");

            run_with_retry(APP_STEP_RETRY, "stop_app", || backend.stop_app()).await?;
            run_with_retry(APP_STEP_RETRY, "join_cluster", || backend.join_cluster(&master)).await?;
            run_with_retry(APP_STEP_RETRY, "start_app", || backend.start_app()).await?;

            info!(node = %local, master = %master, "cluster join finished");
            Ok(Outcome::Changed)
        }
    }
}
