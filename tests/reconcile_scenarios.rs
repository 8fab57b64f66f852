//! End-to-end reconcile passes against the in-memory store.
//!
//! Each test drives `PodGroupReconciler` directly, one member key at a time,
//! the way the driver would.

mod common;

use common::*;
use podgroup_controller::config::LabelConfig;
use podgroup_controller::errors::{ReconcileError, StoreError};
use podgroup_controller::models::MemberPhase;
use podgroup_controller::reconciler::{
    PodGroupReconciler, ReconcileContext, ReconcileOutcome, Reconciler,
};
use podgroup_controller::store::InMemoryMemberStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn store() -> Arc<InMemoryMemberStore> {
    Arc::new(InMemoryMemberStore::new())
}

#[tokio::test]
async fn test_group_becomes_ready_when_last_member_runs() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    member("p2").group("job-1").phase(MemberPhase::Pending).apply(&store);
    let reconciler = reconciler(&store);

    let outcome = reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::NotReady {
            group: "job-1".to_string(),
            total: 2,
            in_target_phase: 1,
        }
    );
    assert!(store.updated_keys().is_empty());

    store.set_phase(&key("p2"), MemberPhase::Running).unwrap();
    let outcome = reconciler.reconcile(&key("p2"), &ctx()).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Ready {
            group: "job-1".to_string(),
            written: 2,
            already_marked: 0,
        }
    );
    assert_eq!(marked_names(&store), vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_repeat_reconcile_writes_nothing() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    member("p2").group("job-1").running().apply(&store);
    let reconciler = reconciler(&store);

    reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    let writes_after_first = store.updated_keys().len();
    assert_eq!(writes_after_first, 2);

    for name in ["p1", "p2", "p1"] {
        let outcome = reconciler.reconcile(&key(name), &ctx()).await.unwrap();
        assert_eq!(outcome.written(), 0);
        assert!(matches!(
            outcome,
            ReconcileOutcome::Ready { already_marked: 2, .. }
        ));
    }
    assert_eq!(store.updated_keys().len(), writes_after_first);
}

#[tokio::test]
async fn test_marker_survives_member_regression() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    member("p2").group("job-1").running().apply(&store);
    let reconciler = reconciler(&store);
    reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();

    store.set_phase(&key("p2"), MemberPhase::Failed).unwrap();
    let outcome = reconciler.reconcile(&key("p2"), &ctx()).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::NotReady { in_target_phase: 1, .. }));
    assert!(is_marked(&store, "p1"));
    assert!(is_marked(&store, "p2"));
}

#[tokio::test]
async fn test_one_lagging_member_blocks_every_marker() {
    let store = store();
    for name in ["a", "b", "c", "d"] {
        member(name).group("gang").running().apply(&store);
    }
    member("e").group("gang").phase(MemberPhase::Unknown).apply(&store);
    let reconciler = reconciler(&store);

    for name in ["a", "b", "c", "d", "e"] {
        let outcome = reconciler.reconcile(&key(name), &ctx()).await.unwrap();
        assert!(matches!(
            outcome,
            ReconcileOutcome::NotReady { total: 5, in_target_phase: 4, .. }
        ));
    }
    assert!(marked_names(&store).is_empty());
    assert_eq!(store.stats().updates, 0);
}

#[tokio::test]
async fn test_ungrouped_member_never_touches_the_group() {
    let store = store();
    member("loner").running().apply(&store);
    member("blank").group("").running().apply(&store);
    let reconciler = reconciler(&store);

    for name in ["loner", "blank"] {
        let outcome = reconciler.reconcile(&key(name), &ctx()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Ungrouped);
    }
    let stats = store.stats();
    assert_eq!(stats.lists, 0);
    assert_eq!(stats.updates, 0);
    assert!(marked_names(&store).is_empty());
}

#[tokio::test]
async fn test_missing_member_is_success() {
    let store = store();
    let reconciler = reconciler(&store);

    let outcome = reconciler.reconcile(&key("ghost"), &ctx()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::MemberGone);

    member("p1").group("job-1").running().apply(&store);
    store.delete(&key("p1")).unwrap();
    let outcome = reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::MemberGone);
    assert_eq!(store.stats().lists, 0);
}

#[tokio::test]
async fn test_groups_are_scoped_by_namespace_and_value() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    member("p2").group("job-1").running().apply(&store);
    member("p3").group("job-2").phase(MemberPhase::Pending).apply(&store);
    member("p1")
        .in_namespace("other")
        .group("job-1")
        .phase(MemberPhase::Pending)
        .apply(&store);
    let reconciler = reconciler(&store);

    let outcome = reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Ready { written: 2, .. }));

    assert!(is_marked(&store, "p1"));
    assert!(is_marked(&store, "p2"));
    assert!(!is_marked(&store, "p3"));
    let other = store
        .get(&podgroup_controller::models::MemberKey::new("other", "p1"))
        .unwrap();
    assert!(!other.is_marked_ready(READY_LABEL));
}

#[tokio::test]
async fn test_partial_marker_failure_converges_on_retry() {
    let store = store();
    for name in ["p1", "p2", "p3"] {
        member(name).group("job-1").running().apply(&store);
    }
    store.fail_next_update(&key("p2"), StoreError::Unavailable("connection reset".to_string()));
    let reconciler = reconciler(&store);

    let error = reconciler.reconcile(&key("p3"), &ctx()).await.unwrap_err();
    match &error {
        ReconcileError::Update { key: failed, applied, .. } => {
            assert_eq!(failed, &key("p2"));
            assert_eq!(*applied, 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(error.is_retryable());
    assert_eq!(marked_names(&store), vec!["p1"]);

    let outcome = reconciler.reconcile(&key("p3"), &ctx()).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Ready {
            group: "job-1".to_string(),
            written: 2,
            already_marked: 1,
        }
    );
    assert_eq!(marked_names(&store), vec!["p1", "p2", "p3"]);
    assert_eq!(store.updated_keys(), vec![key("p1"), key("p2"), key("p3")]);
}

#[tokio::test]
async fn test_store_read_failures_are_reported() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    let reconciler = reconciler(&store);

    store.fail_next_fetch(StoreError::Backend("etcd timeout".to_string()));
    let error = reconciler.reconcile(&key("p1"), &ctx()).await.unwrap_err();
    assert_eq!(error.error_kind(), "fetch");

    store.fail_next_list(StoreError::Unavailable("apiserver down".to_string()));
    let error = reconciler.reconcile(&key("p1"), &ctx()).await.unwrap_err();
    assert!(matches!(
        error,
        ReconcileError::List { ref group, .. } if group == "job-1"
    ));
    assert!(!is_marked(&store, "p1"));

    let outcome = reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Ready { written: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_hits_the_deadline() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    store.set_latency(Some(Duration::from_secs(30)));
    let reconciler = reconciler(&store);

    let ctx = ReconcileContext::new(Duration::from_secs(1));
    let error = reconciler.reconcile(&key("p1"), &ctx).await.unwrap_err();
    assert_eq!(
        error,
        ReconcileError::DeadlineExceeded {
            operation: "fetch",
            timeout: Duration::from_secs(1),
        }
    );
    assert!(!is_marked(&store, "p1"));
}

#[tokio::test]
async fn test_shutdown_cancels_the_pass() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    let reconciler = reconciler(&store);

    let (tx, rx) = watch::channel(true);
    let ctx = ReconcileContext::new(Duration::from_secs(5)).with_shutdown(rx);
    let error = reconciler.reconcile(&key("p1"), &ctx).await.unwrap_err();
    assert_eq!(error, ReconcileError::Cancelled { operation: "fetch" });
    assert_eq!(store.stats().updates, 0);
    drop(tx);
}

#[tokio::test]
async fn test_custom_labels_and_target_phase() {
    let store = store();
    let labels = LabelConfig {
        group_label: "gang".to_string(),
        ready_label: "gang-done".to_string(),
        target_phase: MemberPhase::Succeeded,
    };
    for name in ["w1", "w2"] {
        member(name)
            .label("gang", "batch-7")
            .phase(MemberPhase::Succeeded)
            .apply(&store);
    }
    member("w3").group("batch-7").running().apply(&store);
    let reconciler = PodGroupReconciler::new(Arc::clone(&store), &labels);

    let outcome = reconciler.reconcile(&key("w1"), &ctx()).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Ready { written: 2, .. }));

    for name in ["w1", "w2"] {
        let stored = store.get(&key(name)).unwrap();
        assert_eq!(stored.label("gang-done"), Some("true"));
        assert!(!stored.is_marked_ready(READY_LABEL));
    }
    assert_eq!(
        reconciler.reconcile(&key("w3"), &ctx()).await.unwrap(),
        ReconcileOutcome::Ungrouped
    );
}

#[test]
fn test_outcome_serializes_with_tag() {
    let outcome = ReconcileOutcome::Ready {
        group: "job-1".to_string(),
        written: 2,
        already_marked: 0,
    };
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "ready");
    assert_eq!(json["written"], 2);
    assert_eq!(outcome.label(), "ready");
}

#[tokio::test]
async fn test_job_1_scenario() {
    let store = store();
    member("p1").group("job-1").running().apply(&store);
    member("p2").group("job-1").running().apply(&store);
    member("p3").group("job-1").phase(MemberPhase::Pending).apply(&store);
    let reconciler = reconciler(&store);

    reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    assert_eq!(store.stats().updates, 0);

    store.set_phase(&key("p3"), MemberPhase::Running).unwrap();
    reconciler.reconcile(&key("p3"), &ctx()).await.unwrap();
    assert_eq!(store.updated_keys(), vec![key("p1"), key("p2"), key("p3")]);

    reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    assert_eq!(store.stats().updates, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reconciles_of_one_group_converge() {
    let store = store();
    for name in ["p1", "p2", "p3"] {
        member(name).group("job-1").running().apply(&store);
    }
    store.set_latency(Some(Duration::from_millis(5)));
    let reconciler = reconciler(&store);

    let (key_p1, key_p3) = (key("p1"), key("p3"));
    let (ctx_p1, ctx_p3) = (ctx(), ctx());
    let (first, second) = tokio::join!(
        reconciler.reconcile(&key_p1, &ctx_p1),
        reconciler.reconcile(&key_p3, &ctx_p3),
    );
    for result in [&first, &second] {
        match result {
            Ok(outcome) => assert!(matches!(outcome, ReconcileOutcome::Ready { .. })),
            Err(error) => {
                assert!(error.is_retryable());
                assert_eq!(error.error_kind(), "update_conflict");
            }
        }
    }
    let written = [&first, &second]
        .iter()
        .filter_map(|result| result.as_ref().ok())
        .map(ReconcileOutcome::written)
        .sum::<usize>();
    assert!(written <= 3);

    let retry = reconciler.reconcile(&key("p1"), &ctx()).await.unwrap();
    assert_eq!(retry.written(), 0);
    assert!(matches!(retry, ReconcileOutcome::Ready { already_marked: 3, .. }));
    assert_eq!(marked_names(&store), vec!["p1", "p2", "p3"]);
    assert_eq!(store.updated_keys().len(), 3);
}
