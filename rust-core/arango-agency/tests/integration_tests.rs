// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end tests against the in-memory agency cluster.

use std::time::Duration;

use arango_agency::memory::{AgentRole, InMemoryCluster};
use arango_agency::{
    are_agents_healthy, probe_agents, Agency, AgencyError, Condition, HealthCheckOptions, Key,
    KeyChanger, LegacyAgency, LegacyTransaction, Transaction, TransactionInput,
    TransactionOptions, WriteCondition,
};
use serde_json::json;

const A: &str = "http://agent-a:8531";
const B: &str = "http://agent-b:8531";
const C: &str = "http://agent-c:8531";

fn three_agents() -> InMemoryCluster {
    InMemoryCluster::with_agents(A, &[B, C])
}

/// One client per agent, each bound to that agent only.
fn clients(cluster: &InMemoryCluster) -> Vec<Agency> {
    [A, B, C]
        .iter()
        .map(|endpoint| cluster.agency([*endpoint]).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Read path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_read_nested_value() {
    let cluster = three_agents();
    cluster.seed(["a", "b"], json!("v"));
    let agency = cluster.agency([A]).unwrap();

    let value: String = agency.read_key(["a", "b"]).await.unwrap();
    assert_eq!(value, "v");

    match agency.read_value(["a", "c"]).await {
        Err(AgencyError::KeyNotFound { key }) => assert_eq!(key, Key::new(["a", "c"])),
        other => panic!("expected KeyNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_through_follower_moves_client_to_leader() {
    let cluster = three_agents();
    cluster.seed(Key::arango(["Plan", "Version"]), json!(3));
    let agency = cluster.agency([B]).unwrap();

    let version: u64 = agency.read_key(Key::arango(["Plan", "Version"])).await.unwrap();
    assert_eq!(version, 3);
    assert_eq!(agency.endpoints(), vec![A.to_string()]);

    let served_by: Vec<String> = cluster.request_log().into_iter().map(|(e, _)| e).collect();
    assert_eq!(served_by, vec![B.to_string(), A.to_string()]);
}

#[tokio::test]
async fn test_read_after_failover_follows_new_leader() {
    let cluster = three_agents();
    cluster.seed(["k"], json!(1));
    let agency = cluster.agency([B]).unwrap();
    let _: u64 = agency.read_key(["k"]).await.unwrap();
    assert_eq!(agency.endpoints(), vec![A.to_string()]);

    cluster.elect(C);
    let _: u64 = agency.read_key(["k"]).await.unwrap();
    assert_eq!(agency.endpoints(), vec![C.to_string()]);
}

#[tokio::test]
async fn test_read_without_leader_is_a_redirect_error() {
    let cluster = InMemoryCluster::new();
    cluster.set_role(A, AgentRole::Follower);
    let agency = cluster.agency([A]).unwrap();

    let err = agency.read_value(["k"]).await.unwrap_err();
    assert!(matches!(err, AgencyError::RedirectWithoutLocation { .. }));
}

#[tokio::test]
async fn test_read_from_down_agent_is_transport_error() {
    let cluster = three_agents();
    cluster.set_role(B, AgentRole::Down);
    let agency = cluster.agency([B]).unwrap();

    let err = agency.read_value(["k"]).await.unwrap_err();
    assert!(matches!(err, AgencyError::Connection(_)));
    assert!(!err.is_key_not_found());
}

// ---------------------------------------------------------------------------
// Write path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_write_then_read() {
    let cluster = three_agents();
    let agency = cluster.agency([A]).unwrap();

    agency
        .write_key(["config", "replicas"], &3, None)
        .await
        .unwrap();
    let replicas: u32 = agency.read_key(["config", "replicas"]).await.unwrap();
    assert_eq!(replicas, 3);
    assert_eq!(cluster.log_index(), 1);
}

#[tokio::test]
async fn test_write_if_empty_is_a_lock() {
    let cluster = three_agents();
    let agency = cluster.agency([A]).unwrap();

    agency
        .write_key_if_empty(["lock"], "owner-1", Some(Duration::from_secs(30)))
        .await
        .unwrap();
    let err = agency
        .write_key_if_empty(["lock"], "owner-2", None)
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
    assert!(arango_agency::is_precondition_failed(&err));

    let owner: String = agency.read_key(["lock"]).await.unwrap();
    assert_eq!(owner, "owner-1");
}

#[tokio::test]
async fn test_compare_and_swap() {
    let cluster = three_agents();
    cluster.seed(["counter"], json!(1));
    let agency = cluster.agency([A]).unwrap();

    agency
        .write_key_if_equal_to(["counter"], &2, &1, None)
        .await
        .unwrap();
    let err = agency
        .write_key_if_equal_to(["counter"], &3, &1, None)
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
    assert_eq!(cluster.snapshot(), json!({"counter": 2}));

    assert!(agency
        .remove_key_if_equal_to(["counter"], &1)
        .await
        .unwrap_err()
        .is_precondition_failed());
    agency.remove_key_if_equal_to(["counter"], &2).await.unwrap();
    assert_eq!(cluster.snapshot(), json!({}));
}

#[tokio::test]
async fn test_transaction_commits_all_or_nothing() {
    let cluster = three_agents();
    cluster.seed(["queue"], json!(["x"]));
    let agency = cluster.agency([A]).unwrap();

    let tx = Transaction::new(Some("client-1".to_string()), TransactionOptions::default())
        .with_key(KeyChanger::push(["queue"], "y"))
        .with_key(KeyChanger::increment(["seq"]))
        .with_condition(["queue"], Condition::is_array(true));
    let index = agency.write_transaction(&tx).await.unwrap();
    assert_eq!(index, 1);
    assert_eq!(cluster.snapshot(), json!({"queue": ["x", "y"], "seq": 1}));

    let rejected = Transaction::default()
        .with_key(KeyChanger::erase(["queue"], "x"))
        .with_key(KeyChanger::increment(["seq"]))
        .with_condition(["queue"], Condition::old_empty(true));
    assert!(agency
        .write_transaction(&rejected)
        .await
        .unwrap_err()
        .is_precondition_failed());
    assert_eq!(cluster.snapshot(), json!({"queue": ["x", "y"], "seq": 1}));
}

#[tokio::test]
async fn test_transient_write_does_not_touch_persistent_store() {
    let cluster = three_agents();
    let agency = cluster.agency([A]).unwrap();

    let tx = Transaction::new(None, TransactionOptions::transient())
        .with_key(KeyChanger::set(["heartbeat", "db1"], "alive"));
    agency.write_transaction(&tx).await.unwrap();

    assert_eq!(cluster.snapshot(), json!({}));
    assert_eq!(
        cluster.transient_snapshot(),
        json!({"heartbeat": {"db1": "alive"}})
    );
}

#[tokio::test]
async fn test_write_to_follower_is_not_redirected() {
    let cluster = three_agents();
    let agency = cluster.agency([B]).unwrap();

    let err = agency.write_key(["k"], &1, None).await.unwrap_err();
    assert_eq!(err.status_code(), Some(307));
    assert_eq!(agency.endpoints(), vec![B.to_string()]);
    assert_eq!(cluster.snapshot(), json!({}));
}

#[tokio::test]
async fn test_change_callbacks() {
    let cluster = three_agents();
    let agency = cluster.agency([A]).unwrap();
    let url = "http://coordinator:8529/_api/callback/1";

    agency.register_change_callback(["Plan"], url).await.unwrap();
    assert_eq!(cluster.observers(["Plan"]), vec![url.to_string()]);

    agency.unregister_change_callback(["Plan"], url).await.unwrap();
    assert!(cluster.observers(["Plan"]).is_empty());
}

// ---------------------------------------------------------------------------
// Health verifier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_one_leader_two_followers_is_healthy() {
    let cluster = three_agents();
    let clients = clients(&cluster);

    are_agents_healthy(&clients, &HealthCheckOptions::default())
        .await
        .unwrap();

    let report = probe_agents(&clients, &HealthCheckOptions::default()).await;
    assert_eq!(report.leader_count(), 1);
    assert!(report.agents[0].is_leader);
    assert_eq!(report.agents[1].leader_endpoint.as_deref(), Some(A));

    // Probes leave every client bound to its own agent.
    for (client, endpoint) in clients.iter().zip([A, B, C]) {
        assert_eq!(client.endpoints(), vec![endpoint.to_string()]);
    }
}

#[tokio::test]
async fn test_repeated_checks_see_the_same_cluster() {
    let cluster = three_agents();
    let clients = clients(&cluster);
    for _ in 0..3 {
        are_agents_healthy(&clients, &HealthCheckOptions::default())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_down_agent_is_named() {
    let cluster = three_agents();
    cluster.set_role(B, AgentRole::Down);

    match are_agents_healthy(&clients(&cluster), &HealthCheckOptions::default()).await {
        Err(AgencyError::AgentUnresponsive { endpoint, .. }) => assert_eq!(endpoint, B),
        other => panic!("expected AgentUnresponsive, got {other:?}"),
    }
}

#[tokio::test]
async fn test_two_leaders_need_upgrade_tolerance() {
    let cluster = three_agents();
    cluster.set_role(B, AgentRole::Leader);
    let clients = clients(&cluster);

    let err = are_agents_healthy(&clients, &HealthCheckOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AgencyError::LeaderMismatch { .. }));

    let lenient = HealthCheckOptions::default().allow_different_leader_endpoints();
    are_agents_healthy(&clients, &lenient).await.unwrap();
}

#[tokio::test]
async fn test_no_leader_needs_maintenance_tolerance() {
    let cluster = InMemoryCluster::new();
    for endpoint in [A, B, C] {
        cluster.set_role(endpoint, AgentRole::Follower);
    }
    let clients = clients(&cluster);

    match are_agents_healthy(&clients, &HealthCheckOptions::default()).await {
        Err(AgencyError::LeaderCount { count }) => assert_eq!(count, 0),
        other => panic!("expected LeaderCount, got {other:?}"),
    }

    // Upgrade tolerance alone does not excuse a leaderless cluster.
    let upgrade = HealthCheckOptions::default().allow_different_leader_endpoints();
    assert!(are_agents_healthy(&clients, &upgrade).await.is_err());

    let maintenance = HealthCheckOptions::default().allow_no_leader();
    are_agents_healthy(&clients, &maintenance).await.unwrap();
}

#[tokio::test]
async fn test_empty_client_list_has_no_leader() {
    let err = are_agents_healthy(&[], &HealthCheckOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AgencyError::LeaderCount { count: 0 }));
}

// ---------------------------------------------------------------------------
// Compatibility adapter
// ---------------------------------------------------------------------------

struct RenameTx;

impl LegacyTransaction for RenameTx {
    fn keys(&self) -> Vec<KeyChanger> {
        vec![
            KeyChanger::set(["new"], "value"),
            KeyChanger::delete(["old"]),
        ]
    }

    fn conditions(&self) -> WriteCondition {
        WriteCondition::new().if_equal_to(["old"], "value")
    }

    fn client_id(&self) -> Option<String> {
        Some("legacy-client".to_string())
    }

    fn options(&self) -> TransactionOptions {
        TransactionOptions::default()
    }
}

#[tokio::test]
async fn test_legacy_transaction_is_applied() {
    let cluster = three_agents();
    cluster.seed(["old"], json!("value"));
    let legacy = LegacyAgency::new(cluster.agency([A]).unwrap());

    legacy.write(TransactionInput::legacy(&RenameTx)).await.unwrap();
    assert_eq!(cluster.snapshot(), json!({"new": "value"}));

    let err = legacy
        .write(TransactionInput::legacy(&RenameTx))
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_legacy_conditional_write_and_remove() {
    let cluster = three_agents();
    let legacy = LegacyAgency::new(cluster.agency([A]).unwrap());

    legacy
        .write_key(["k"], "v1", None, WriteCondition::new().if_empty(["k"]))
        .await
        .unwrap();
    assert!(legacy
        .write_key(["k"], "v2", None, WriteCondition::new().if_empty(["k"]))
        .await
        .unwrap_err()
        .is_precondition_failed());

    legacy
        .remove_key(["k"], WriteCondition::new().if_equal_to(["k"], "v1"))
        .await
        .unwrap();
    assert_eq!(cluster.snapshot(), json!({}));
}

#[tokio::test]
async fn test_native_transactions_pass_through_adapter() {
    let cluster = three_agents();
    let legacy = LegacyAgency::new(cluster.agency([A]).unwrap());
    let tx = Transaction::default().with_key(KeyChanger::set(["n"], 1));

    legacy.write(&tx).await.unwrap();
    legacy.write(tx).await.unwrap();
    assert_eq!(cluster.log_index(), 2);
}
