//! Configuration profiles deserialize with defaults and strict keys.

use choreo::RuntimeConfig;

#[test]
fn partial_profile_fills_in_defaults() {
    let cfg: RuntimeConfig = serde_json::from_str(r#"{ "ops_budget": 32 }"#).expect("valid");
    assert_eq!(cfg.ops_budget, 32);
    assert_eq!(
        cfg.default_mailbox_capacity,
        RuntimeConfig::DEFAULT_MAILBOX_CAPACITY
    );
    assert_eq!(cfg.max_steps, RuntimeConfig::DEFAULT_MAX_STEPS);
}

#[test]
fn full_profile_round_trips() {
    let cfg: RuntimeConfig = serde_json::from_str(
        r#"{ "ops_budget": 8, "default_mailbox_capacity": 16, "max_steps": 1000 }"#,
    )
    .expect("valid");
    assert_eq!(cfg.ops_budget, 8);
    assert_eq!(cfg.default_mailbox_capacity, 16);
    assert_eq!(cfg.max_steps, 1000);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = serde_json::from_str::<RuntimeConfig>(r#"{ "opsbudget": 8 }"#).unwrap_err();
    assert!(err.to_string().contains("unknown field"));
}
