//! Vhost Convergence - Existenz ist binär, es gibt keine weiteren Attribute.

use tracing::info;

use crate::converge::Outcome;
use crate::{BrokerBackend, ConvergeError};

/// Legt den vhost an falls er fehlt.
pub async fn ensure<B: BrokerBackend>(backend: &B, name: &str) -> Result<Outcome, ConvergeError> {
    let vhosts = backend.list_vhosts().await?;

    if vhosts.iter().any(|v| v.name == name) {
        info!(vhost = %name, "vhost already exists");
        return Ok(Outcome::Unchanged);
    }

    info!(vhost = %name, "creating vhost");
    backend.add_vhost(name).await?;
    Ok(Outcome::Changed)
}
