//! User Convergence - User-Existenz, Tag-Set und Permission-Triples
//!
//! Tags werden immer als Ganzes ersetzt (Replace-Semantik von
//! set_user_tags); Tags die der User hatte, aber nicht im Soll stehen,
//! fallen dabei stillschweigend weg. Der Drift-Check selbst ist einseitig:
//! zusätzliche beobachtete Tags zählen nicht als Drift.

use bunny_config::{PermissionSpec, UserSpec};
use tracing::info;

use crate::converge::Outcome;
use crate::drift::{desired_tags, permission_state, tags_in_sync, PermissionState};
use crate::{BrokerBackend, ConvergeError};

/// Legt den User an bzw. gleicht sein Tag-Set ab.
pub async fn ensure_user<B: BrokerBackend>(backend: &B, spec: &UserSpec) -> Result<Outcome, ConvergeError> {
    let tags = desired_tags(spec);
    let users = backend.list_users().await?;

    let observed = users.iter().find(|u| u.user == spec.name);

    match observed {
        None => {
            let password = spec.password.as_deref().ok_or_else(|| {
                ConvergeError::Precondition(format!(
                    "user {} does not exist and no password is declared",
                    spec.name
                ))
            })?;

            info!(user = %spec.name, "creating user");
            backend.add_user(&spec.name, password).await?;
            backend.set_user_tags(&spec.name, &tags).await?;
            Ok(Outcome::Changed)
        }
        Some(observed) => {
            if tags_in_sync(&tags, &observed.tags) {
                info!(user = %spec.name, "user tags already converged");
                return Ok(Outcome::Unchanged);
            }

            info!(user = %spec.name, desired = ?tags, observed = ?observed.tags, "replacing user tags");
            backend.set_user_tags(&spec.name, &tags).await?;
            Ok(Outcome::Changed)
        }
    }
}

/// Gleicht den Permission-Triple eines (user, vhost) Paars ab.
///
/// Der User muss bereits existieren: an dieser Stelle ist kein Passwort
/// mehr verfügbar, ein Self-Heal durch Anlegen ist unmöglich. Ein fehlender
/// vhost dagegen ist eine dokumentierte Skip-Condition, kein Fehler.
pub async fn ensure_permissions<B: BrokerBackend>(
    backend: &B,
    spec: &PermissionSpec,
) -> Result<Outcome, ConvergeError> {
    let vhost = spec.vhost();

    let users = backend.list_users().await?;
    if !users.iter().any(|u| u.user == spec.user) {
        return Err(ConvergeError::Precondition(format!(
            "cannot set permissions: user {} does not exist",
            spec.user
        )));
    }

    let vhosts = backend.list_vhosts().await?;
    if !vhosts.iter().any(|v| v.name == vhost) {
        info!(user = %spec.user, vhost = %vhost, "vhost does not exist, skipping permissions");
        return Ok(Outcome::Skipped);
    }

    let permissions = backend.list_user_permissions(&spec.user).await?;

    match permission_state(vhost, &spec.configure, &spec.write, &spec.read, &permissions) {
        PermissionState::InSync => {
            info!(user = %spec.user, vhost = %vhost, "permissions already converged");
            Ok(Outcome::Unchanged)
        }
        state @ (PermissionState::Missing | PermissionState::Incorrect) => {
            info!(user = %spec.user, vhost = %vhost, ?state, "setting permissions");
            backend
                .set_permissions(vhost, &spec.user, &spec.configure, &spec.write, &spec.read)
                .await?;
            Ok(Outcome::Changed)
        }
    }
}
