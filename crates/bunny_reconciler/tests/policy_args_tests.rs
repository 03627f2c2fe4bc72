//! Tests for set_policy argument building and definition serialization

use bunny_config::{ApplyTo, PolicyParameters, PolicySpec, PolicyValue};
use bunny_reconciler::{build_set_policy_args, format_definition};

/// Helper to create a basic PolicySpec
fn basic_policy() -> PolicySpec {
    PolicySpec {
        name: "ha-all".to_string(),
        pattern: "^ha\\.".to_string(),
        definition: PolicyParameters(vec![
            ("ha-mode".to_string(), PolicyValue::String("all".to_string())),
            ("ha-params".to_string(), PolicyValue::Int(2)),
        ]),
        priority: None,
        vhost: None,
        apply_to: None,
    }
}

// ============================================================================
// Definition Serialization Tests
// ============================================================================

#[test]
fn test_definition_strings_quoted_numbers_unquoted() {
    let policy = basic_policy();
    assert_eq!(
        format_definition(&policy.definition),
        r#"{"ha-mode":"all","ha-params":2}"#
    );
}

#[test]
fn test_definition_empty() {
    assert_eq!(format_definition(&PolicyParameters::default()), "{}");
}

#[test]
fn test_definition_single_entry_has_no_comma() {
    let params = PolicyParameters(vec![(
        "max-length".to_string(),
        PolicyValue::Int(100_000),
    )]);
    assert_eq!(format_definition(&params), r#"{"max-length":100000}"#);
}

#[test]
fn test_definition_preserves_declaration_order() {
    let params = PolicyParameters(vec![
        ("zz".to_string(), PolicyValue::Int(1)),
        ("aa".to_string(), PolicyValue::Int(2)),
    ]);
    assert_eq!(format_definition(&params), r#"{"zz":1,"aa":2}"#);
}

#[test]
fn test_definition_bool_and_float() {
    let params = PolicyParameters(vec![
        ("lazy".to_string(), PolicyValue::Bool(true)),
        ("factor".to_string(), PolicyValue::Float(0.5)),
    ]);
    assert_eq!(format_definition(&params), r#"{"lazy":true,"factor":0.5}"#);
}

#[test]
fn test_definition_escapes_special_characters() {
    let params = PolicyParameters(vec![(
        "note".to_string(),
        PolicyValue::String("say \"hi\"".to_string()),
    )]);
    assert_eq!(format_definition(&params), r#"{"note":"say \"hi\""}"#);
}

// ============================================================================
// Argument Vector Tests
// ============================================================================

#[test]
fn test_build_args_basic_structure() {
    let args = build_set_policy_args(&basic_policy());

    assert_eq!(args[0], "-q");
    assert_eq!(args[1], "set_policy");
    assert_eq!(args[2], "ha-all");
    assert_eq!(args[3], "^ha\\.");
    assert_eq!(args[4], r#"{"ha-mode":"all","ha-params":2}"#);
    assert_eq!(args.len(), 5);
}

#[test]
fn test_build_args_with_vhost() {
    let mut policy = basic_policy();
    policy.vhost = Some("prod".to_string());
    let args = build_set_policy_args(&policy);

    assert_eq!(&args[2..4], &["-p".to_string(), "prod".to_string()]);
}

#[test]
fn test_build_args_with_apply_to() {
    let mut policy = basic_policy();
    policy.apply_to = Some(ApplyTo::Queues);
    let args = build_set_policy_args(&policy);

    assert_eq!(&args[2..4], &["--apply-to".to_string(), "queues".to_string()]);
}

#[test]
fn test_build_args_with_priority_last() {
    let mut policy = basic_policy();
    policy.priority = Some(7);
    let args = build_set_policy_args(&policy);

    assert_eq!(&args[args.len() - 2..], &["--priority".to_string(), "7".to_string()]);
}

#[test]
fn test_build_args_all_optional_flags() {
    let mut policy = basic_policy();
    policy.vhost = Some("prod".to_string());
    policy.apply_to = Some(ApplyTo::Exchanges);
    policy.priority = Some(1);
    let args = build_set_policy_args(&policy);

    assert_eq!(
        args,
        vec![
            "-q",
            "set_policy",
            "-p",
            "prod",
            "--apply-to",
            "exchanges",
            "ha-all",
            "^ha\\.",
            r#"{"ha-mode":"all","ha-params":2}"#,
            "--priority",
            "1",
        ]
    );
}

#[test]
fn test_build_args_pattern_is_not_shell_quoted() {
    // Patterns go through as plain argv entries, no shell quoting layer
    let mut policy = basic_policy();
    policy.pattern = "^ha\\.|x y".to_string();
    let args = build_set_policy_args(&policy);

    assert!(args.contains(&"^ha\\.|x y".to_string()));
}
