//! Drift Detection - Pure Functions für den Soll/Ist-Vergleich
//!
//! Alle Funktionen hier sind **pure functions**:
//! - Keine Side Effects, keine Broker-Abfragen
//! - Deterministisch
//! - Perfekt testbar ohne Mocks
//!
//! Die Convergence-Actions rufen zuerst die Inspektoren auf und entscheiden
//! dann anhand dieser Prädikate, ob Kommandos nötig sind.

use bunny_config::{ClusterSpec, UserSpec};

use crate::observed::{ClusterStatus, ObservedPermission};
use crate::MANAGED_TAG;

/// Berechnet das vollständige gewünschte Tag-Set eines Users.
///
/// Der Managed-Tag wird immer ergänzt, damit am Broker sichtbar ist welche
/// User von der Automatisierung verwaltet werden.
pub fn desired_tags(spec: &UserSpec) -> Vec<String> {
    let mut tags = spec.tags.clone();
    if !tags.iter().any(|t| t == MANAGED_TAG) {
        tags.push(MANAGED_TAG.to_string());
    }
    tags
}

/// Prüft ob die beobachteten Tags das gewünschte Set abdecken.
///
/// Der Vergleich ist einseitig: Drift existiert genau dann wenn ein
/// gewünschter Tag fehlt. Zusätzliche beobachtete Tags sind kein Drift.
pub fn tags_in_sync(desired: &[String], observed: &[String]) -> bool {
    desired.iter().all(|tag| observed.contains(tag))
}

/// Zustand eines (user, vhost) Permission-Eintrags relativ zum Soll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionState {
    /// Kein Eintrag für diesen vhost vorhanden
    Missing,
    /// Eintrag vorhanden, aber mindestens ein Feld weicht ab
    Incorrect,
    /// Eintrag stimmt vollständig überein
    InSync,
}

/// Vergleicht den gewünschten Permission-Triple mit den beobachteten
/// Einträgen eines Users.
///
/// Der Vergleich ist alles-oder-nichts: entweder der komplette Triple stimmt,
/// oder der Eintrag wird als Ganzes überschrieben. Es gibt kein partielles
/// Patchen einzelner Felder.
pub fn permission_state(
    vhost: &str,
    configure: &str,
    write: &str,
    read: &str,
    observed: &[ObservedPermission],
) -> PermissionState {
    match observed.iter().find(|p| p.vhost == vhost) {
        None => PermissionState::Missing,
        Some(entry) => {
            if entry.configure == configure && entry.write == write && entry.read == read {
                PermissionState::InSync
            } else {
                PermissionState::Incorrect
            }
        }
    }
}

/// Die vom Cluster-Planner abgeleitete Aktion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterAction {
    /// Nichts zu tun: Membership (oder Name) stimmt bereits
    AlreadyJoined,
    /// Lokaler Node ist der Master, aber der Cluster-Name weicht ab
    Rename { to: String },
    /// Lokaler Node muss dem Master beitreten (stop_app -> join -> start_app)
    Join { master: String },
}

/// Plant die Cluster-Convergence anhand des Ist-Zustands.
///
/// Der Master-Node tritt sich nie selbst bei; bei ihm wird stattdessen der
/// Cluster-Name abgeglichen. Alle anderen Nodes gelten als joined wenn
/// sowohl sie selbst als auch der Master in `running_nodes` stehen.
pub fn cluster_plan(spec: &ClusterSpec, master: &str, local: &str, status: &ClusterStatus) -> ClusterAction {
    if local == master {
        if status.cluster_name != spec.name {
            ClusterAction::Rename {
                to: spec.name.clone(),
            }
        } else {
            ClusterAction::AlreadyJoined
        }
    } else if status.is_running(master) && status.is_running(local) {
        ClusterAction::AlreadyJoined
    } else {
        ClusterAction::Join {
            master: master.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn make_cluster_spec(name: &str, nodes: &[&str]) -> ClusterSpec {
        ClusterSpec {
            name: name.to_string(),
            nodes: strings(nodes),
        }
    }

    fn make_status(name: &str, running: &[&str]) -> ClusterStatus {
        ClusterStatus {
            cluster_name: name.to_string(),
            running_nodes: strings(running),
        }
    }

    fn make_permission(vhost: &str, configure: &str, write: &str, read: &str) -> ObservedPermission {
        ObservedPermission {
            vhost: vhost.to_string(),
            configure: configure.to_string(),
            write: write.to_string(),
            read: read.to_string(),
        }
    }

    // =========================================================================
    // Tests: Tags
    // =========================================================================

    #[test]
    fn test_desired_tags_adds_managed_tag() {
        let spec = UserSpec {
            name: "svc".to_string(),
            password: None,
            tags: strings(&["monitoring"]),
        };

        let tags = desired_tags(&spec);
        assert_eq!(tags, strings(&["monitoring", MANAGED_TAG]));
    }

    #[test]
    fn test_desired_tags_does_not_duplicate_managed_tag() {
        let spec = UserSpec {
            name: "svc".to_string(),
            password: None,
            tags: strings(&[MANAGED_TAG, "monitoring"]),
        };

        let tags = desired_tags(&spec);
        assert_eq!(tags.iter().filter(|t| *t == MANAGED_TAG).count(), 1);
    }

    #[test]
    fn test_tags_in_sync_exact_match() {
        let desired = strings(&["a", "b"]);
        assert!(tags_in_sync(&desired, &strings(&["a", "b"])));
    }

    #[test]
    fn test_tags_extra_observed_is_not_drift() {
        let desired = strings(&["a"]);
        assert!(tags_in_sync(&desired, &strings(&["a", "unrelated", "extra"])));
    }

    #[test]
    fn test_tags_missing_desired_is_drift() {
        let desired = strings(&["a", "b"]);
        assert!(!tags_in_sync(&desired, &strings(&["a"])));
        assert!(!tags_in_sync(&desired, &strings(&["b", "extra"])));
        assert!(!tags_in_sync(&desired, &[]));
    }

    #[test]
    fn test_tags_empty_desired_never_drifts() {
        assert!(tags_in_sync(&[], &[]));
        assert!(tags_in_sync(&[], &strings(&["anything"])));
    }

    // =========================================================================
    // Tests: Permissions
    // =========================================================================

    #[test]
    fn test_permission_missing_when_no_entries() {
        let state = permission_state("prod", ".*", ".*", ".*", &[]);
        assert_eq!(state, PermissionState::Missing);
    }

    #[test]
    fn test_permission_missing_when_other_vhost_only() {
        let observed = vec![make_permission("/", ".*", ".*", ".*")];
        let state = permission_state("prod", ".*", ".*", ".*", &observed);
        assert_eq!(state, PermissionState::Missing);
    }

    #[test]
    fn test_permission_incorrect_on_single_field() {
        let observed = vec![make_permission("prod", ".*", ".*", "x")];
        let state = permission_state("prod", ".*", ".*", ".*", &observed);
        assert_eq!(state, PermissionState::Incorrect);
    }

    #[test]
    fn test_permission_in_sync() {
        let observed = vec![
            make_permission("/", "^$", "^$", "^$"),
            make_permission("prod", ".*", ".*", ".*"),
        ];
        let state = permission_state("prod", ".*", ".*", ".*", &observed);
        assert_eq!(state, PermissionState::InSync);
    }

    // =========================================================================
    // Tests: Cluster Plan
    // =========================================================================

    #[test]
    fn test_cluster_plan_master_with_correct_name() {
        let spec = make_cluster_spec("prod", &["rabbit@a", "rabbit@b"]);
        let status = make_status("prod", &["rabbit@a"]);

        let action = cluster_plan(&spec, "rabbit@a", "rabbit@a", &status);
        assert_eq!(action, ClusterAction::AlreadyJoined);
    }

    #[test]
    fn test_cluster_plan_master_with_wrong_name_renames() {
        let spec = make_cluster_spec("new", &["rabbit@a", "rabbit@b"]);
        let status = make_status("old", &["rabbit@a"]);

        let action = cluster_plan(&spec, "rabbit@a", "rabbit@a", &status);
        assert_eq!(
            action,
            ClusterAction::Rename {
                to: "new".to_string()
            }
        );
    }

    #[test]
    fn test_cluster_plan_member_already_joined() {
        let spec = make_cluster_spec("prod", &["rabbit@a", "rabbit@b"]);
        let status = make_status("prod", &["rabbit@a", "rabbit@b"]);

        let action = cluster_plan(&spec, "rabbit@a", "rabbit@b", &status);
        assert_eq!(action, ClusterAction::AlreadyJoined);
    }

    #[test]
    fn test_cluster_plan_member_not_joined() {
        let spec = make_cluster_spec("prod", &["rabbit@a", "rabbit@b"]);
        let status = make_status("prod", &["rabbit@a"]);

        let action = cluster_plan(&spec, "rabbit@a", "rabbit@b", &status);
        assert_eq!(
            action,
            ClusterAction::Join {
                master: "rabbit@a".to_string()
            }
        );
    }

    #[test]
    fn test_cluster_plan_member_joined_requires_master_running() {
        // Lokaler Node läuft, aber der Master fehlt in running_nodes
        let spec = make_cluster_spec("prod", &["rabbit@a", "rabbit@b"]);
        let status = make_status("prod", &["rabbit@b"]);

        let action = cluster_plan(&spec, "rabbit@a", "rabbit@b", &status);
        assert!(matches!(action, ClusterAction::Join { .. }));
    }
}
