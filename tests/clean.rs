mod common;

use common::{at, FixedClock, RecordingStore, T};
use fleetsim_core::{CleanArgs, DeleteRequest, ReplayEngine, ReplayError};
use std::sync::Arc;
use std::time::Duration;

fn engine(store: Arc<RecordingStore>) -> ReplayEngine {
    ReplayEngine::new(store).with_clock(Arc::new(FixedClock(at(T))))
}

#[tokio::test]
async fn test_clean_all_issues_single_unscoped_delete() {
    let store = Arc::new(RecordingStore::new());

    engine(store.clone())
        .clean(CleanArgs {
            all: true,
            hosts: vec!["ignored".to_string()],
            duration: Some(Duration::from_secs(24 * 3_600)),
            measurement: "metrics".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(
        store.deletes(),
        vec![DeleteRequest {
            measurement: "metrics".to_string(),
            host: None,
            since: at(T - 86_400),
            until: at(T),
        }]
    );
    assert_eq!(store.calls().len(), 1);
}

#[tokio::test]
async fn test_clean_hosts_deletes_each_host() {
    let store = Arc::new(RecordingStore::new());

    engine(store.clone())
        .clean(CleanArgs {
            hosts: vec!["node-a".to_string(), "node-b".to_string()],
            duration: Some(Duration::from_secs(3_600)),
            measurement: "anomalies".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut deletes = store.deletes();
    deletes.sort_by(|a, b| a.host.cmp(&b.host));
    assert_eq!(deletes.len(), 2);
    for (request, host) in deletes.iter().zip(["node-a", "node-b"]) {
        assert_eq!(request.host.as_deref(), Some(host));
        assert_eq!(request.measurement, "anomalies");
        assert_eq!(request.since, at(T - 3_600));
        assert_eq!(request.until, at(T));
    }
}

#[tokio::test]
async fn test_clean_without_duration_reaches_epoch() {
    let store = Arc::new(RecordingStore::new());

    engine(store.clone())
        .clean(CleanArgs {
            all: true,
            measurement: "metrics".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(store.deletes()[0].since, at(0));
}

#[tokio::test]
async fn test_clean_requires_hosts_or_all() {
    let store = Arc::new(RecordingStore::new());

    let err = engine(store.clone())
        .clean(CleanArgs {
            measurement: "metrics".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Configuration(_)));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_clean_requires_measurement() {
    let store = Arc::new(RecordingStore::new());
    let err = engine(store.clone())
        .clean(CleanArgs {
            all: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::Configuration(_)));
}

#[tokio::test]
async fn test_clean_host_failure_reported_without_stopping_others() {
    let store = Arc::new(RecordingStore::new().failing_for("node-bad"));

    let err = engine(store.clone())
        .clean(CleanArgs {
            hosts: vec!["node-bad".to_string(), "node-ok".to_string()],
            measurement: "metrics".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    let ReplayError::Failures(failures) = err else {
        panic!("expected aggregated failures");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target, "node-bad");
    let deleted: Vec<_> = store.deletes().into_iter().filter_map(|d| d.host).collect();
    assert_eq!(deleted, vec!["node-ok"]);
}
