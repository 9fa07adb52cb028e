//! Sharing policy enforcement through the pool.

use agora_rs_core::access::AccessTarget;
use agora_rs_core::{AccessEvaluator, CoreError, MemoryPool, WriteOutcome, WritePlan, WriteRequest};
use agora_rs_memory::{InMemoryMembership, InMemoryRecordStore, MembershipSource};
use agora_rs_protocol::{AccessReason, Capability, MemoryRecord, SharingPolicy};
use agora_rs_test_utils::{FailingMembership, RecordBuilder, RecordingAudit};
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use uuid::Uuid;

fn pool_with(membership: Arc<InMemoryMembership>) -> MemoryPool {
    MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .membership(membership)
        .build()
        .expect("pool")
}

async fn store(pool: &MemoryPool, request: WriteRequest) -> MemoryRecord {
    match pool.write(request, WritePlan::Store).await.expect("write") {
        WriteOutcome::Stored(record) => record,
        other => panic!("expected stored record, got {other:?}"),
    }
}

fn is_denied(err: &CoreError) -> bool {
    matches!(err, CoreError::AuthorizationDenied { .. })
}

#[tokio::test]
async fn custom_list_grants_read_but_never_write() {
    let pool = pool_with(Arc::new(InMemoryMembership::new()));
    let record = store(
        &pool,
        WriteRequest::new("O", "launch checklist").sharing(SharingPolicy::custom(["A", "B"])),
    )
    .await;

    assert_eq!(pool.get(record.id, "A").await.expect("A reads").id, record.id);
    assert_eq!(pool.get(record.id, "B").await.expect("B reads").id, record.id);
    assert!(is_denied(&pool.get(record.id, "C").await.expect_err("C denied")));

    let err = pool
        .update_content(record.id, "A", "edited by A", Utc::now())
        .await
        .expect_err("A cannot write");
    assert!(is_denied(&err));
    let err = pool.delete(record.id, "A").await.expect_err("A cannot delete");
    assert!(is_denied(&err));
}

#[tokio::test]
async fn private_records_are_owner_only() {
    let pool = pool_with(Arc::new(InMemoryMembership::new()));
    let record = store(&pool, WriteRequest::new("O", "private scratchpad")).await;

    pool.get(record.id, "O").await.expect("owner reads");
    assert!(is_denied(&pool.get(record.id, "P").await.expect_err("denied")));
    pool.update_content(record.id, "O", "private scratchpad v2", Utc::now())
        .await
        .expect("owner writes");
    pool.delete(record.id, "O").await.expect("owner deletes");
}

/// A missing record and a forbidden one produce the same error.
#[tokio::test]
async fn missing_records_look_like_denied_records() {
    let pool = pool_with(Arc::new(InMemoryMembership::new()));
    let record = store(&pool, WriteRequest::new("O", "private scratchpad")).await;
    let missing = Uuid::new_v4();

    let denied = pool.get(record.id, "P").await.expect_err("denied");
    let absent = pool.get(missing, "P").await.expect_err("absent");
    assert!(is_denied(&denied));
    assert!(is_denied(&absent));
    assert_eq!(
        denied.to_string().replace(&record.id.to_string(), "<id>"),
        absent.to_string().replace(&missing.to_string(), "<id>")
    );

    let err = pool.delete(missing, "O").await.expect_err("absent delete");
    assert!(is_denied(&err));
}

/// Category-shared records follow membership, including later changes.
#[tokio::test]
async fn category_members_read_design_notes() {
    let membership = Arc::new(InMemoryMembership::new());
    membership.join_category("design", "X");
    let pool = pool_with(membership.clone());
    let record = store(
        &pool,
        WriteRequest::new("D", "use the new color tokens")
            .category("design")
            .sharing(SharingPolicy::CategoryShared),
    )
    .await;

    pool.get(record.id, "X").await.expect("member reads");
    assert!(is_denied(&pool.get(record.id, "Y").await.expect_err("non-member")));

    let err = pool
        .update_content(record.id, "X", "use the old color tokens", Utc::now())
        .await
        .expect_err("members cannot write");
    assert!(is_denied(&err));

    membership.join_category("design", "Y");
    pool.get(record.id, "Y").await.expect("new member reads");
    assert!(membership.leave_category("design", "X"));
    assert!(is_denied(&pool.get(record.id, "X").await.expect_err("left")));
}

#[tokio::test]
async fn space_writes_require_membership_and_stay_category_shared() {
    let membership = Arc::new(InMemoryMembership::new());
    assert!(membership.create_space("ops", ["A", "B"]));
    let pool = pool_with(membership.clone());

    let err = pool
        .write(WriteRequest::new("C", "runbook draft").space("ops"), WritePlan::Store)
        .await
        .expect_err("outsider cannot write into the space");
    assert!(matches!(
        err,
        CoreError::AuthorizationDenied { ref resource } if resource == "space:ops"
    ));

    let record = store(
        &pool,
        WriteRequest::new("A", "runbook draft")
            .space("ops")
            .sharing(SharingPolicy::Shared),
    )
    .await;
    assert_eq!(record.sharing_policy, SharingPolicy::CategoryShared);
    pool.get(record.id, "B").await.expect("space member reads");
    assert!(is_denied(&pool.get(record.id, "C").await.expect_err("outsider")));

    let err = pool
        .change_sharing(record.id, "A", SharingPolicy::Shared)
        .await
        .expect_err("space records stay category-shared");
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn owner_changes_sharing() {
    let audit = Arc::new(RecordingAudit::new());
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .audit(audit.clone())
        .build()
        .expect("pool");
    let record = store(&pool, WriteRequest::new("O", "incident timeline")).await;
    assert!(is_denied(&pool.get(record.id, "P").await.expect_err("private")));

    let err = pool
        .change_sharing(record.id, "P", SharingPolicy::Shared)
        .await
        .expect_err("only the owner shares");
    assert!(is_denied(&err));

    let shared = pool
        .change_sharing(record.id, "O", SharingPolicy::Shared)
        .await
        .expect("owner shares");
    assert!(shared.updated_at > record.updated_at);
    pool.get(record.id, "P").await.expect("now readable");

    let private = pool
        .change_sharing(record.id, "O", SharingPolicy::Custom(Vec::new()))
        .await
        .expect("owner revokes");
    assert_eq!(private.sharing_policy, SharingPolicy::Private);
    assert!(is_denied(&pool.get(record.id, "P").await.expect_err("revoked")));

    let names = audit.names();
    assert!(names.contains(&"memory.sharing_changed".to_string()));
    assert!(names.contains(&"memory.access_denied".to_string()));
}

/// An unreachable membership source fails the call instead of guessing.
#[tokio::test]
async fn membership_outage_fails_closed() {
    let membership: Arc<dyn MembershipSource> = Arc::new(FailingMembership);
    let evaluator = AccessEvaluator::new(membership);
    let record = RecordBuilder::new("D", "use the new color tokens")
        .category("design")
        .policy(SharingPolicy::CategoryShared)
        .build();

    let err = evaluator
        .can_access(AccessTarget::from(&record), "X", Capability::Read)
        .await
        .expect_err("lookup failed");
    assert!(matches!(err, CoreError::StoreUnavailable(_)));

    let owner = evaluator
        .can_access(AccessTarget::from(&record), "D", Capability::Delete)
        .await
        .expect("owner needs no lookup");
    assert!(owner.allowed);
    assert_eq!(owner.reason, AccessReason::Owner);
}
