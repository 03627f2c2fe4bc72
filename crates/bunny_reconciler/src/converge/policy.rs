//! Policy Convergence - set ist upstream idempotent, clear prüft Existenz.

use bunny_config::{PolicyParameters, PolicySpec, PolicyValue};
use tracing::info;

use crate::converge::Outcome;
use crate::{BrokerBackend, ConvergeError};

/// Serialisiert eine Policy-Definition als einzeiliges JSON-Objekt.
///
/// String-Werte werden gequotet, numerische und boolesche Werte nicht;
/// die Feld-Reihenfolge folgt der Deklarationsreihenfolge, Kommas stehen
/// nur zwischen Einträgen.
pub fn format_definition(parameters: &PolicyParameters) -> String {
    let mut json = String::from("{");
    for (i, (key, value)) in parameters.iter().enumerate() {
        if i > 0 {
            json.push(',');
        }
        // Display von serde_json::Value liefert gequotetes, escaptes JSON
        json.push_str(&serde_json::Value::String(key.clone()).to_string());
        json.push(':');
        match value {
            PolicyValue::String(s) => {
                json.push_str(&serde_json::Value::String(s.clone()).to_string())
            }
            PolicyValue::Int(i) => json.push_str(&i.to_string()),
            PolicyValue::Float(f) => json.push_str(&f.to_string()),
            PolicyValue::Bool(b) => json.push_str(&b.to_string()),
        }
    }
    json.push('}');
    json
}

/// Baut den set_policy Argument-Vektor.
///
/// Optionale Flags (-p, --apply-to, --priority) werden nur angehängt wenn
/// der Spec sie deklariert.
pub fn build_set_policy_args(spec: &PolicySpec) -> Vec<String> {
    let mut args = vec!["-q".to_string(), "set_policy".to_string()];

    if let Some(vhost) = spec.vhost.as_deref() {
        args.push("-p".to_string());
        args.push(vhost.to_string());
    }
    if let Some(apply_to) = spec.apply_to {
        args.push("--apply-to".to_string());
        args.push(apply_to.as_str().to_string());
    }

    args.push(spec.name.clone());
    args.push(spec.pattern.clone());
    args.push(format_definition(&spec.definition));

    if let Some(priority) = spec.priority {
        args.push("--priority".to_string());
        args.push(priority.to_string());
    }

    args
}

/// Setzt die Policy bedingungslos - set_policy überschreibt upstream
/// idempotent, ein Pre-Check entfällt.
pub async fn set<B: BrokerBackend>(backend: &B, spec: &PolicySpec) -> Result<Outcome, ConvergeError> {
    info!(policy = %spec.name, vhost = ?spec.vhost, "setting policy");
    backend.set_policy(spec).await?;
    Ok(Outcome::Changed)
}

/// Entfernt die Policy falls sie existiert; sonst geloggter No-Op.
pub async fn clear<B: BrokerBackend>(backend: &B, spec: &PolicySpec) -> Result<Outcome, ConvergeError> {
    let vhost = spec.vhost.as_deref();
    let policies = backend.list_policies(vhost).await?;

    if !policies.iter().any(|p| p.name == spec.name) {
        info!(policy = %spec.name, vhost = ?vhost, "policy does not exist, nothing to clear");
        return Ok(Outcome::Skipped);
    }

    info!(policy = %spec.name, vhost = ?vhost, "clearing policy");
    backend.clear_policy(&spec.name, vhost).await?;
    Ok(Outcome::Changed)
}

/// Passthrough-Query ohne Vergleichslogik.
pub async fn list<B: BrokerBackend>(backend: &B) -> Result<String, ConvergeError> {
    Ok(backend.list_parameters().await?)
}
