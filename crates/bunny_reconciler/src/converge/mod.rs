//! Convergence Actions - bringen den Broker vom Ist- zum Soll-Zustand
//!
//! Jede Action folgt demselben Muster:
//! 1. Frischen Zustand über das Backend abfragen
//! 2. Drift über die puren Prädikate aus `drift` feststellen
//! 3. Nur bei Drift die minimale Kommando-Sequenz ausführen
//!
//! Der Aufrufer (CLI) serialisiert mehrere Actions gegen denselben Broker;
//! hier gibt es keinen shared mutable State zwischen den Actions.

pub mod cluster;
pub mod policy;
pub mod reset;
pub mod user;
pub mod vhost;

/// Ergebnis einer Convergence-Action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Mindestens ein mutierendes Kommando wurde ausgeführt
    Changed,
    /// Bereits konvergiert, keine Kommandos nötig
    Unchanged,
    /// Skip-Condition: dokumentierter No-Op (z.B. fehlender vhost)
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Changed => "changed",
            Outcome::Unchanged => "unchanged",
            Outcome::Skipped => "skipped",
        }
    }
}
