//! Destruktives Recovery - Service-Restart plus stop/reset/start Sequenz.
//!
//! Wann ein Reset nötig ist entscheidet der externe Aufrufer; der Grund
//! wird als Warnung geloggt.

use tracing::warn;

use crate::converge::Outcome;
use crate::retry::{run_with_retry, APP_STEP_RETRY};
use crate::{BrokerBackend, ConvergeError};

/// Setzt den Broker-Node zurück.
///
/// Restart des Service-Units, danach strikt geordnet stop_app -> reset ->
/// start_app, jeder Schritt mit dem App-Lifecycle-Retry-Budget.
pub async fn reset<B: BrokerBackend>(backend: &B, reason: &str) -> Result<Outcome, ConvergeError> {
    warn!(%reason, "resetting broker node");

    backend.restart_service().await?;

    run_with_retry(APP_STEP_RETRY, "stop_app", || backend.stop_app()).await?;
    run_with_retry(APP_STEP_RETRY, "reset", || backend.reset_node()).await?;
    run_with_retry(APP_STEP_RETRY, "start_app", || backend.start_app()).await?;

    Ok(Outcome::Changed)
}
