//! End-to-end scenarios through the memory pool.

use agora_rs_core::{CoreError, MemoryPool, UpdateOutcome, WriteOutcome, WritePlan, WriteRequest};
use agora_rs_memory::{FileRecordStore, InMemoryMembership, InMemoryRecordStore, RecordStore};
use agora_rs_protocol::{
    ChannelScope, DuplicateKind, MemoryRecord, RecommendedAction, SharingPolicy, SyncEventType,
};
use agora_rs_test_utils::{RecordingAudit, RecordingSubscriber};
use chrono::{Duration, Utc};
use futures_util::future::join_all;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::tempdir;

async fn stored(pool: &MemoryPool, request: WriteRequest) -> MemoryRecord {
    match pool.write(request, WritePlan::Store).await.expect("write") {
        WriteOutcome::Stored(record) => record,
        other => panic!("expected stored record, got {other:?}"),
    }
}

/// A repeated quote from the same bot is skipped; another agent's copy is
/// independent.
#[tokio::test]
async fn trading_bot_quote_is_deduplicated_per_agent() {
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .build()
        .expect("pool");

    let (verdict, outcome) = pool
        .write_deduplicated(WriteRequest::new("trading-bot", "AAPL price is $150.25"))
        .await
        .expect("first quote");
    assert_eq!(verdict.kind, DuplicateKind::Distinct);
    assert!(matches!(outcome, WriteOutcome::Stored(_)));

    let (verdict, outcome) = pool
        .write_deduplicated(WriteRequest::new("trading-bot", "AAPL price is $150.25"))
        .await
        .expect("repeat quote");
    assert_eq!(verdict.kind, DuplicateKind::Exact);
    assert_eq!(verdict.recommended_action, RecommendedAction::Skip);
    assert_eq!(outcome, WriteOutcome::Skipped);

    let (verdict, outcome) = pool
        .write_deduplicated(WriteRequest::new("risk-mgmt", "AAPL price is $150.25"))
        .await
        .expect("risk copy");
    assert_eq!(verdict.kind, DuplicateKind::Distinct);
    assert!(matches!(outcome, WriteOutcome::Stored(_)));
}

#[tokio::test]
async fn design_category_scenario() {
    let membership = Arc::new(InMemoryMembership::new());
    membership.join_category("design", "X");
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .membership(membership)
        .build()
        .expect("pool");
    let r1 = stored(
        &pool,
        WriteRequest::new("lead", "spacing scale is 4px based")
            .category("design")
            .sharing(SharingPolicy::CategoryShared),
    )
    .await;

    assert_eq!(pool.get(r1.id, "X").await.expect("X reads").content, r1.content);
    let err = pool.get(r1.id, "Y").await.expect_err("Y denied");
    assert!(matches!(err, CoreError::AuthorizationDenied { .. }));
}

/// An update stamped before the committed one loses and changes nothing.
#[tokio::test]
async fn out_of_order_updates_keep_the_latest_write() {
    let subscriber = Arc::new(RecordingSubscriber::new());
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .build()
        .expect("pool");
    let r2 = stored(&pool, WriteRequest::new("A", "position limit is 100 shares")).await;
    pool.subscribe("A", ChannelScope::Record(r2.id), subscriber.clone())
        .await
        .expect("subscribe");

    let t1 = r2.updated_at + Duration::seconds(10);
    let t0 = r2.updated_at + Duration::seconds(5);
    let applied = pool
        .update_content(r2.id, "A", "position limit is 300 shares", t1)
        .await
        .expect("T1 update");
    assert!(matches!(applied, UpdateOutcome::Applied(_)));

    let late = pool
        .update_content(r2.id, "A", "position limit is 200 shares", t0)
        .await
        .expect("T0 update");
    assert_eq!(late, UpdateOutcome::Superseded { current_updated_at: t1 });

    let tie = pool
        .update_content(r2.id, "A", "position limit is 250 shares", t1)
        .await
        .expect("tied update");
    assert_eq!(tie, UpdateOutcome::Superseded { current_updated_at: t1 });

    let current = pool.get(r2.id, "A").await.expect("read back");
    assert_eq!(current.content, "position limit is 300 shares");
    assert_eq!(current.updated_at, t1);

    let events = subscriber.wait_for(1, std::time::Duration::from_secs(2)).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(subscriber.events().len(), 1);
    assert_eq!(events[0].event_type, SyncEventType::Updated);
}

#[tokio::test]
async fn updates_refresh_derived_fields() {
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .build()
        .expect("pool");
    let record = stored(&pool, WriteRequest::new("A", "first draft")).await;
    let UpdateOutcome::Applied(updated) = pool
        .update_content(record.id, "A", "second   draft", Utc::now())
        .await
        .expect("update")
    else {
        panic!("expected applied update");
    };
    assert_eq!(updated.summary, "second draft");
    assert_ne!(updated.content_hash, record.content_hash);
    assert_eq!(updated.created_at, record.created_at);

    let verdict = pool.evaluate("second draft", "A").await.expect("evaluate");
    assert_eq!(verdict.kind, DuplicateKind::Exact);

    let err = pool
        .update_content(record.id, "A", "  ", Utc::now())
        .await
        .expect_err("blank content");
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn every_operation_is_audited() {
    let audit = Arc::new(RecordingAudit::new());
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .audit(audit.clone())
        .build()
        .expect("pool");
    let record = stored(&pool, WriteRequest::new("A", "audit me")).await;
    pool.write(WriteRequest::new("A", "skip me"), WritePlan::Skip)
        .await
        .expect("skip");
    pool.get(record.id, "A").await.expect("get");
    pool.update_content(record.id, "A", "audit me again", Utc::now())
        .await
        .expect("update");
    pool.get_memory_batch(&[record.id], "A", false)
        .await
        .expect("batch");
    pool.compact("A").await.expect("compact");
    pool.delete(record.id, "A").await.expect("delete");

    assert_eq!(
        audit.names(),
        vec![
            "memory.created",
            "memory.write_skipped",
            "memory.read",
            "memory.updated",
            "memory.batch",
            "memory.compact_evaluated",
            "memory.deleted",
        ]
    );
    let created = &audit.attributes("memory.created")[0];
    assert_eq!(created["agent_id"], "A");
    assert_eq!(created["policy"], "private");
}

/// Records written through one pool are visible after reopening the file.
#[tokio::test]
async fn file_store_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("records.jsonl");

    let store = Arc::new(FileRecordStore::open(&path).expect("open"));
    let pool = MemoryPool::builder(store).build().expect("pool");
    let record = stored(
        &pool,
        WriteRequest::new("A", "backup rotation runs nightly").sharing(SharingPolicy::Shared),
    )
    .await;
    drop(pool);

    let reopened: Arc<dyn RecordStore> = Arc::new(FileRecordStore::open(&path).expect("reopen"));
    let pool = MemoryPool::builder(reopened.clone())
        .build()
        .expect("pool");
    assert_eq!(pool.get(record.id, "B").await.expect("read"), record);
    assert!(reopened.embedding(record.id).await.expect("vector").is_some());

    let verdict = pool
        .evaluate("backup rotation runs nightly", "A")
        .await
        .expect("evaluate");
    assert_eq!(verdict.kind, DuplicateKind::Exact);
}

/// Concurrent writers never lose records or events.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_do_not_lose_updates() {
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .build()
        .expect("pool");
    let subscriber = Arc::new(RecordingSubscriber::new());
    pool.subscribe("agent-0", ChannelScope::Owned, subscriber.clone())
        .await
        .expect("subscribe");

    let tasks = (0..4).map(|agent| {
        let pool = pool.clone();
        tokio::spawn(async move {
            for note in 0..10 {
                let owner = format!("agent-{agent}");
                let request = WriteRequest::new(owner, format!("note {note} from {agent}"));
                pool.write(request, WritePlan::Store).await.expect("write");
            }
        })
    });
    for joined in join_all(tasks).await {
        joined.expect("join");
    }

    let events = subscriber.wait_for(10, std::time::Duration::from_secs(2)).await;
    assert_eq!(events.len(), 10);
    assert!(events.iter().all(|event| event.owner_agent_id == "agent-0"));
    for agent in 0..4 {
        let verdicts = pool.compact(&format!("agent-{agent}")).await.expect("compact");
        assert!(verdicts.iter().all(|verdict| verdict.kind != DuplicateKind::Exact));
    }
    let batch = pool
        .search_index("note", "agent-1", 20, Default::default())
        .await
        .expect("search");
    assert_eq!(batch.results.len(), 10);
}
