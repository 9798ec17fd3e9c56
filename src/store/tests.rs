use std::sync::Arc;
use std::time::Duration;

use super::DocumentStore;
use super::index::MemoryCorpus;
use super::source::Location;
use crate::error::LoadError;
use crate::models::{DatasetKey, DatasetKind};
use crate::testing::*;

#[tokio::test]
async fn test_load_caches_by_identity() {
    let corpus = Arc::new(steel_corpus());
    let store = DocumentStore::in_memory(corpus.clone());
    let flow_ref = reference(DatasetKind::Flow, STEEL_FLOW);

    let first = store.load(&flow_ref).await.unwrap();
    let second = store.load(&flow_ref).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(corpus.reads(), 1);
    assert_eq!(store.cached_count(), 1);
}

#[tokio::test]
async fn test_missing_document_is_not_found_and_not_cached() {
    let corpus = Arc::new(MemoryCorpus::new());
    let store = DocumentStore::in_memory(corpus.clone());
    let group_ref = reference(DatasetKind::UnitGroup, MASS_GROUP);

    let err = store.load(&group_ref).await.unwrap_err();
    assert!(matches!(err, LoadError::NotFound { key, .. } if key == group_ref.key()));
    assert_eq!(store.cached_count(), 0);

    // The file appears later; a retry succeeds
    corpus.insert(unit_group(MASS_GROUP, Some(0), &[(0, "kg")]));
    let doc = store.load(&group_ref).await.unwrap();
    assert_eq!(doc.key(), group_ref.key());
}

#[tokio::test]
async fn test_not_found_reports_searched_hint() {
    let corpus = Arc::new(MemoryCorpus::new());
    corpus.insert_at(
        Location::new("flows/elsewhere.yml"),
        flow(STEEL_FLOW + 1, &[]),
    );
    let store = DocumentStore::in_memory(corpus);

    // The hint is reachable but holds another dataset
    let flow_ref = reference(DatasetKind::Flow, STEEL_FLOW).with_location_hint("../flows/elsewhere.yml");
    match store.load(&flow_ref).await {
        Err(LoadError::NotFound { searched, .. }) => {
            assert_eq!(searched, vec!["flows/elsewhere.yml".to_string()]);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_location_hint_finds_unindexed_dataset() {
    let corpus = Arc::new(steel_corpus());
    let mut archived = flow(STEEL_FLOW + 1, &[]);
    archived.version = Some("09.00.000".to_string());
    corpus.insert_at(Location::new("archive/steel.yml"), archived);
    let store = DocumentStore::in_memory(corpus);

    let hinted = reference(DatasetKind::Flow, STEEL_FLOW + 1).with_location_hint("../archive/steel.yml");
    let doc = store.load(&hinted).await.unwrap();
    assert_eq!(doc.version.as_deref(), Some("09.00.000"));
    assert!(store.conflicts().is_empty());
}

#[tokio::test]
async fn test_indexed_copy_wins_when_hinted_load_comes_first() {
    let corpus = Arc::new(steel_corpus());
    let mut relocated = flow(STEEL_FLOW, &[]);
    relocated.version = Some("09.00.000".to_string());
    corpus.insert_at(Location::new("archive/steel.yml"), relocated);
    let store = DocumentStore::in_memory(corpus);
    let plain = reference(DatasetKind::Flow, STEEL_FLOW);
    let hinted = plain.clone().with_location_hint("../archive/steel.yml");

    // Nothing cached yet: the hinted load is the one that reads both copies
    let via_hint = store.load(&hinted).await.unwrap();
    assert_eq!(via_hint.version.as_deref(), Some("01.00.000"));

    let direct = store.load(&plain).await.unwrap();
    assert!(Arc::ptr_eq(&via_hint, &direct));

    match store.conflict(&plain.key()) {
        Some(LoadError::ConflictingContent { first, second, .. }) => {
            assert_eq!(first, format!("flows/{}.yml", id(STEEL_FLOW)));
            assert_eq!(second, "archive/steel.yml");
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert!(store.reference_conflict(&hinted).is_some());
    assert!(store.reference_conflict(&plain).is_none());
    assert_eq!(store.conflicts().len(), 1);
}

#[tokio::test]
async fn test_conflicts_do_not_depend_on_load_order() {
    let mut relocated = flow(STEEL_FLOW, &[]);
    relocated.version = Some("09.00.000".to_string());
    let hinted = reference(DatasetKind::Flow, STEEL_FLOW).with_location_hint("../archive/steel.yml");
    let plain = reference(DatasetKind::Flow, STEEL_FLOW);

    let mut seen = Vec::new();
    for order in [[&hinted, &plain], [&plain, &hinted]] {
        let corpus = Arc::new(steel_corpus());
        corpus.insert_at(Location::new("archive/steel.yml"), relocated.clone());
        let store = Arc::new(DocumentStore::in_memory(corpus));

        let mut handles = Vec::new();
        for reference in order {
            let store = store.clone();
            let reference = reference.clone();
            handles.push(tokio::spawn(async move { store.load(&reference).await }));
        }
        for handle in handles {
            let doc = handle.await.unwrap().unwrap();
            assert_eq!(doc.version.as_deref(), Some("01.00.000"));
        }
        seen.push(store.conflicts());
    }

    assert_eq!(seen[0].len(), 1);
    assert_eq!(seen[0], seen[1]);
}

#[tokio::test]
async fn test_kind_mismatch_through_hint() {
    let corpus = Arc::new(steel_corpus());
    let store = DocumentStore::in_memory(corpus);

    // A unit group reference that actually points at the steel flow's file
    let wrong = reference(DatasetKind::UnitGroup, STEEL_FLOW)
        .with_location_hint(format!("../flows/{}.yml", id(STEEL_FLOW)));
    let err = store.load(&wrong).await.unwrap_err();
    assert_eq!(
        err,
        LoadError::KindMismatch {
            id: id(STEEL_FLOW),
            expected: DatasetKind::UnitGroup,
            found: DatasetKind::Flow,
        }
    );
}

#[tokio::test]
async fn test_kind_mismatch_through_index() {
    let store = DocumentStore::in_memory(Arc::new(steel_corpus()));
    let wrong = reference(DatasetKind::FlowProperty, MASS_GROUP);
    let err = store.load(&wrong).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::KindMismatch { expected: DatasetKind::FlowProperty, found: DatasetKind::UnitGroup, .. }
    ));
}

#[tokio::test]
async fn test_unparseable_document() {
    let corpus = Arc::new(MemoryCorpus::new());
    let key = DatasetKey::new(DatasetKind::Flow, id(STEEL_FLOW));
    corpus.insert_broken(key, "unexpected end of stream");
    let store = DocumentStore::in_memory(corpus);

    let err = store.load(&key.to_ref()).await.unwrap_err();
    match err {
        LoadError::Unparseable { reason, .. } => assert!(reason.contains("unexpected end")),
        other => panic!("expected Unparseable, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_read_times_out() {
    let corpus = Arc::new(steel_corpus().with_latency(Duration::from_millis(300)));
    let store = DocumentStore::in_memory(corpus).with_timeout(Duration::from_millis(20));

    let err = store
        .load(&reference(DatasetKind::Flow, STEEL_FLOW))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Timeout { after_ms: 20, .. }));
    assert_eq!(store.cached_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_share_one_read() {
    let corpus = Arc::new(steel_corpus().with_latency(Duration::from_millis(50)));
    let store = Arc::new(DocumentStore::in_memory(corpus.clone()));
    let flow_ref = reference(DatasetKind::Flow, STEEL_FLOW);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let flow_ref = flow_ref.clone();
        handles.push(tokio::spawn(async move { store.load(&flow_ref).await }));
    }

    let mut docs = Vec::new();
    for handle in handles {
        docs.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(corpus.reads(), 1);
    assert!(docs.iter().all(|doc| Arc::ptr_eq(doc, &docs[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failed_loads_share_one_error() {
    let corpus = Arc::new(MemoryCorpus::new().with_latency(Duration::from_millis(50)));
    let key = DatasetKey::new(DatasetKind::Flow, id(STEEL_FLOW));
    corpus.insert_broken(key, "bad");
    let store = Arc::new(DocumentStore::in_memory(corpus.clone()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.load(&key.to_ref()).await }));
    }
    for handle in handles {
        assert!(matches!(handle.await.unwrap(), Err(LoadError::Unparseable { .. })));
    }
    assert_eq!(corpus.reads(), 1);
}

#[tokio::test]
async fn test_two_locations_with_same_content_share_cache() {
    let corpus = Arc::new(steel_corpus());
    corpus.insert_at(
        Location::new("mirror/steel.yml"),
        flow(STEEL_FLOW, &[(0, reference(DatasetKind::UnitGroup, MASS_GROUP))]),
    );
    let store = DocumentStore::in_memory(corpus.clone());

    let indexed = store.load(&reference(DatasetKind::Flow, STEEL_FLOW)).await.unwrap();
    let mirrored = store
        .load(&reference(DatasetKind::Flow, STEEL_FLOW).with_location_hint("mirror/steel.yml"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&indexed, &mirrored));
    assert!(store.conflicts().is_empty());

    // The mirror has been compared once; later loads through it hit the cache
    let reads = corpus.reads();
    store
        .load(&reference(DatasetKind::Flow, STEEL_FLOW).with_location_hint("mirror/steel.yml"))
        .await
        .unwrap();
    assert_eq!(corpus.reads(), reads);
}

#[tokio::test]
async fn test_conflicting_content_is_flagged_and_cached_copy_kept() {
    let corpus = Arc::new(steel_corpus());
    corpus.insert_at(Location::new("mirror/steel.yml"), flow(STEEL_FLOW, &[]));
    let store = DocumentStore::in_memory(corpus);
    let key = DatasetKey::new(DatasetKind::Flow, id(STEEL_FLOW));

    let indexed = store.load(&key.to_ref()).await.unwrap();
    let mirrored = store
        .load(&key.to_ref().with_location_hint("./mirror/steel.yml"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&indexed, &mirrored));
    match store.conflict(&key) {
        Some(LoadError::ConflictingContent { first, second, .. }) => {
            assert_eq!(first, format!("flows/{}.yml", id(STEEL_FLOW)));
            assert_eq!(second, "mirror/steel.yml");
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(store.conflicts().len(), 1);
}

#[tokio::test]
async fn test_invalidate_forces_reload() {
    let corpus = Arc::new(steel_corpus());
    let store = DocumentStore::in_memory(corpus.clone());
    let flow_ref = reference(DatasetKind::Flow, STEEL_FLOW);
    let group_ref = reference(DatasetKind::UnitGroup, MASS_GROUP);

    store.load(&flow_ref).await.unwrap();
    store.load(&group_ref).await.unwrap();
    assert_eq!(corpus.reads(), 2);

    store.invalidate(&flow_ref.key());
    assert!(store.cached(&flow_ref.key()).is_none());
    assert!(store.cached(&group_ref.key()).is_some());
    store.load(&flow_ref).await.unwrap();
    assert_eq!(corpus.reads(), 3);

    store.invalidate_all();
    assert_eq!(store.cached_count(), 0);
}
