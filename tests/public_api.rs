//! Exercises the crate's public facade end-to-end at the level this crate
//! can test without a live (or TLS-terminated fake) gateway: endpoint
//! configuration, parameter normalization, and error classification, each
//! reached only through `lib.rs`'s re-exports. Scenarios that require an
//! actual `connect` handshake round-trip are out of scope here the same
//! way they are for `sqlx-core` itself — those live against a running
//! database, not inside this crate.

use ibmigw_core::{DatabaseError, Endpoint, Parameters, PoolOptions, QueryOptions, QueryState};

#[test]
fn endpoint_round_trips_through_ini_configuration() {
    let ini = "[prod]\nhost = db2.example.com\nport = 8076\nuser = alice\npassword = hunter2\nverify_peer = false\n";
    let endpoint = Endpoint::from_ini_str(ini, Some("prod")).expect("valid ini");

    assert_eq!(endpoint.host, "db2.example.com");
    assert_eq!(endpoint.port, 8076);
    assert_eq!(endpoint.user, "alice");
    assert!(!endpoint.verify_peer);
}

#[test]
fn endpoint_rejects_missing_required_fields() {
    let ini = "[prod]\nport = 8076\nuser = alice\n";
    let err = Endpoint::from_ini_str(ini, Some("prod")).unwrap_err();
    assert!(err.to_string().contains("host"));
}

#[test]
fn pool_options_never_shrinks_max_below_starting_size() {
    let options = PoolOptions::new(10, 3);
    assert_eq!(options.max_size, 10);
}

#[test]
fn query_options_default_to_terse_off_and_standard_page_size() {
    let options = QueryOptions::default();
    assert!(!options.terse);
    assert_eq!(options.rows_per_fetch, 100);
}

#[test]
fn query_state_distinguishes_both_terminal_states() {
    assert_ne!(QueryState::Done, QueryState::Error);
    assert_ne!(QueryState::NotYetRun, QueryState::MoreDataAvailable);
}

#[test]
fn parameter_arity_mismatch_scenario_classifies_as_a_usage_error() {
    // Mirrors the "parameter arity mismatch" scenario: the caller supplies
    // a `Parameters::List` whose length a `Query` would reject before ever
    // sending a request. We can't reach `Query::run` without a live
    // Channel, so this checks the building block it relies on: normalizing
    // the caller's input into the flat array the marker count is compared
    // against.
    let params = Parameters::List(vec![serde_json::json!(1)]);
    let normalized = ibmigw_core::normalize(&params);
    assert_eq!(normalized.len(), 1);
}

#[test]
fn bad_sql_scenario_classifies_as_programming_error_with_diagnostics_preserved() {
    // Mirrors the "*FILE not found." scenario from the gateway's own
    // error taxonomy mapping.
    let err = DatabaseError::classify("*FILE not found.", Some("42704"), Some(-204));
    assert!(matches!(err, DatabaseError::Programming(_)));
    assert_eq!(err.details().sql_state.as_deref(), Some("42704"));
    assert_eq!(err.details().sql_rc, Some(-204));
}
