//! Event bus delivery integration tests.

use agora_rs_config::BusConfig;
use agora_rs_core::{
    AccessEvaluator, CoreError, MemoryPool, SyncBus, WriteOutcome, WritePlan, WriteRequest,
};
use agora_rs_memory::{InMemoryMembership, InMemoryRecordStore, MembershipSource};
use agora_rs_protocol::{
    ChannelScope, EventSink, MemoryRecord, SharingPolicy, SyncEvent, SyncEventType,
};
use agora_rs_test_utils::{RecordBuilder, RecordingSubscriber, UnreachableFor};
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn bus_with(config: BusConfig, membership: Arc<dyn MembershipSource>) -> SyncBus {
    SyncBus::new(AccessEvaluator::new(membership), config)
}

fn quick_config() -> BusConfig {
    BusConfig {
        batch_size: 8,
        batch_interval_ms: 0,
        max_retries: 3,
        retry_backoff_ms: 1,
        delivery_timeout_ms: 1_000,
        queue_capacity: 64,
    }
}

fn event(record: &MemoryRecord, seq: usize) -> SyncEvent {
    SyncEvent::for_record(
        SyncEventType::Updated,
        record,
        record.owner_agent_id.clone(),
        json!({ "seq": seq }),
    )
}

fn sequence(events: &[SyncEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| event.payload["seq"].as_u64())
        .collect()
}

/// Events for one record reach a subscriber in publish order.
#[tokio::test]
async fn events_for_a_record_arrive_in_publish_order() {
    let bus = bus_with(quick_config(), Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let subscriber = Arc::new(RecordingSubscriber::new());
    bus.subscribe("A", ChannelScope::Record(record.id), subscriber.clone());

    for seq in 0..50 {
        let ack = bus.publish(event(&record, seq)).await;
        assert_eq!(ack.recipients, 1);
    }
    let received = subscriber.wait_for(50, WAIT).await;
    assert_eq!(sequence(&received), (0..50).collect::<Vec<u64>>());
}

#[tokio::test]
async fn deliveries_are_coalesced_up_to_the_batch_size() {
    let config = BusConfig {
        batch_size: 4,
        ..quick_config()
    };
    let bus = bus_with(config, Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let subscriber = Arc::new(RecordingSubscriber::new());
    bus.subscribe("A", ChannelScope::Owned, subscriber.clone());

    for seq in 0..10 {
        bus.publish(event(&record, seq)).await;
    }
    let received = subscriber.wait_for(10, WAIT).await;
    assert_eq!(received.len(), 10);
    let sizes = subscriber.batch_sizes();
    assert!(sizes.iter().all(|size| *size <= 4), "batches: {sizes:?}");
    assert_eq!(sizes.iter().sum::<usize>(), 10);
}

/// Subscribers whose agent may not read the record get nothing.
#[tokio::test]
async fn fan_out_respects_read_access() {
    let membership = Arc::new(InMemoryMembership::new());
    membership.join_category("design", "X");
    membership.join_category("design", "Y");
    let bus = bus_with(quick_config(), membership);

    let member = Arc::new(RecordingSubscriber::new());
    let outsider = Arc::new(RecordingSubscriber::new());
    bus.subscribe("X", ChannelScope::Category("design".to_string()), member.clone());
    bus.subscribe("Z", ChannelScope::Category("design".to_string()), outsider.clone());

    let private = RecordBuilder::new("Y", "draft palette").category("design").build();
    let shared = RecordBuilder::new("Y", "final palette")
        .category("design")
        .policy(SharingPolicy::CategoryShared)
        .build();

    let ack = bus.publish(event(&private, 0)).await;
    assert_eq!(ack.recipients, 0);
    let ack = bus.publish(event(&shared, 1)).await;
    assert_eq!(ack.recipients, 1);

    let received = member.wait_for(1, WAIT).await;
    assert_eq!(sequence(&received), vec![1]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(outsider.events().is_empty());
}

#[tokio::test]
async fn failed_deliveries_are_retried() {
    let bus = bus_with(quick_config(), Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let subscriber = Arc::new(RecordingSubscriber::failing(2));
    bus.subscribe("A", ChannelScope::Owned, subscriber.clone());

    bus.publish(event(&record, 7)).await;
    let received = subscriber.wait_for(1, WAIT).await;
    assert_eq!(sequence(&received), vec![7]);
    assert_eq!(subscriber.attempts(), 3);
}

/// After the retry budget a batch is dropped and delivery moves on.
#[tokio::test]
async fn exhausted_retries_drop_the_batch() {
    let config = BusConfig {
        max_retries: 2,
        ..quick_config()
    };
    let bus = bus_with(config, Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let subscriber = Arc::new(RecordingSubscriber::failing(3));
    bus.subscribe("A", ChannelScope::Owned, subscriber.clone());

    bus.publish(event(&record, 1)).await;
    assert_eq!(subscriber.wait_for_attempts(3, WAIT).await, 3);
    bus.publish(event(&record, 2)).await;

    let received = subscriber.wait_for(1, WAIT).await;
    assert_eq!(sequence(&received), vec![2]);
    assert_eq!(bus.subscription_count(), 1);
}

#[tokio::test]
async fn disconnected_subscribers_are_removed() {
    let bus = bus_with(quick_config(), Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let gone = Arc::new(RecordingSubscriber::disconnected());
    let healthy = Arc::new(RecordingSubscriber::new());
    bus.subscribe("A", ChannelScope::Owned, gone.clone());
    bus.subscribe("A", ChannelScope::Owned, healthy.clone());
    assert_eq!(bus.subscription_count(), 2);

    bus.publish(event(&record, 1)).await;
    healthy.wait_for(1, WAIT).await;
    gone.wait_for_attempts(1, WAIT).await;
    tokio::time::timeout(WAIT, async {
        while bus.subscription_count() > 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscription removed");
    assert_eq!(gone.attempts(), 1);
}

/// A subscriber stuck in backoff does not hold up the others.
#[tokio::test]
async fn slow_subscriber_does_not_block_others() {
    let config = BusConfig {
        max_retries: 5,
        retry_backoff_ms: 200,
        ..quick_config()
    };
    let bus = bus_with(config, Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let stuck = Arc::new(RecordingSubscriber::failing(100));
    let healthy = Arc::new(RecordingSubscriber::new());
    bus.subscribe("A", ChannelScope::Owned, stuck.clone());
    bus.subscribe("A", ChannelScope::Owned, healthy.clone());

    for seq in 0..3 {
        bus.publish(event(&record, seq)).await;
    }
    let received = healthy.wait_for(3, Duration::from_millis(150)).await;
    assert_eq!(sequence(&received), vec![0, 1, 2]);
    assert!(stuck.events().is_empty());
}

#[tokio::test]
async fn emitted_events_are_published_in_the_background() {
    let bus = bus_with(quick_config(), Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let subscriber = Arc::new(RecordingSubscriber::new());
    bus.subscribe("A", ChannelScope::Owned, subscriber.clone());

    let sink: &dyn EventSink = &bus;
    sink.emit(event(&record, 3));
    let received = subscriber.wait_for(1, WAIT).await;
    assert_eq!(sequence(&received), vec![3]);
}

/// One agent's failed membership lookup only costs that agent the event.
#[tokio::test]
async fn membership_outage_for_one_subscriber_spares_the_others() {
    let directory = Arc::new(InMemoryMembership::new());
    directory.join_category("design", "steady");
    directory.join_category("design", "flaky");
    let bus = bus_with(quick_config(), Arc::new(UnreachableFor::new("flaky", directory)));

    let owner = Arc::new(RecordingSubscriber::new());
    let steady = Arc::new(RecordingSubscriber::new());
    let flaky = Arc::new(RecordingSubscriber::new());
    bus.subscribe("owner", ChannelScope::Owned, owner.clone());
    bus.subscribe("steady", ChannelScope::Category("design".to_string()), steady.clone());
    bus.subscribe("flaky", ChannelScope::Category("design".to_string()), flaky.clone());

    let record = RecordBuilder::new("owner", "final palette")
        .category("design")
        .policy(SharingPolicy::CategoryShared)
        .build();
    let ack = bus.publish(event(&record, 1)).await;
    assert_eq!(ack.recipients, 2);

    assert_eq!(sequence(&owner.wait_for(1, WAIT).await), vec![1]);
    assert_eq!(sequence(&steady.wait_for(1, WAIT).await), vec![1]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(flaky.events().is_empty());
}

#[tokio::test]
async fn committed_writes_still_announce_when_a_lookup_fails() {
    let directory = Arc::new(InMemoryMembership::new());
    directory.join_category("design", "flaky");
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .membership(Arc::new(UnreachableFor::new("flaky", directory)))
        .build()
        .expect("pool");

    let owner = Arc::new(RecordingSubscriber::new());
    pool.subscribe("owner", ChannelScope::Owned, owner.clone())
        .await
        .expect("owner subscribes");
    let flaky = Arc::new(RecordingSubscriber::new());
    pool.bus()
        .subscribe("flaky", ChannelScope::Category("design".to_string()), flaky.clone());

    pool.write(
        WriteRequest::new("owner", "final palette")
            .category("design")
            .sharing(SharingPolicy::CategoryShared),
        WritePlan::Store,
    )
    .await
    .expect("write");

    let received = owner.wait_for(1, WAIT).await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event_type, SyncEventType::Created);
    assert!(flaky.events().is_empty());
}

/// A delivery that never returns is timed out, retried, then dropped.
#[tokio::test]
async fn hung_deliveries_time_out() {
    let config = BusConfig {
        delivery_timeout_ms: 20,
        max_retries: 1,
        ..quick_config()
    };
    let bus = bus_with(config, Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let hung = Arc::new(RecordingSubscriber::hanging());
    let healthy = Arc::new(RecordingSubscriber::new());
    bus.subscribe("A", ChannelScope::Owned, hung.clone());
    bus.subscribe("A", ChannelScope::Owned, healthy.clone());

    bus.publish(event(&record, 1)).await;
    assert_eq!(sequence(&healthy.wait_for(1, WAIT).await), vec![1]);
    assert_eq!(hung.wait_for_attempts(2, WAIT).await, 2);

    bus.publish(event(&record, 2)).await;
    assert_eq!(hung.wait_for_attempts(4, WAIT).await, 4);
    assert_eq!(sequence(&healthy.wait_for(2, WAIT).await), vec![1, 2]);
    assert!(hung.events().is_empty());
    assert_eq!(bus.subscription_count(), 2);
}

/// A stuck subscriber's queue fills up and sheds events; others are unaffected.
#[tokio::test]
async fn full_queue_sheds_events_for_that_subscriber_only() {
    let config = BusConfig {
        queue_capacity: 2,
        delivery_timeout_ms: 60_000,
        ..quick_config()
    };
    let bus = bus_with(config, Arc::new(InMemoryMembership::new()));
    let record = RecordBuilder::new("A", "order book snapshot").build();
    let stuck = Arc::new(RecordingSubscriber::hanging());
    let healthy = Arc::new(RecordingSubscriber::new());
    bus.subscribe("A", ChannelScope::Owned, stuck.clone());
    bus.subscribe("A", ChannelScope::Owned, healthy.clone());

    assert_eq!(bus.publish(event(&record, 0)).await.recipients, 2);
    assert_eq!(stuck.wait_for_attempts(1, WAIT).await, 1);
    healthy.wait_for(1, WAIT).await;

    let mut recipients = Vec::new();
    for seq in 1..4 {
        recipients.push(bus.publish(event(&record, seq)).await.recipients);
        healthy.wait_for(seq + 1, WAIT).await;
    }
    assert_eq!(recipients, vec![2, 2, 1]);
    assert_eq!(sequence(&healthy.events()), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn only_the_subscribing_agent_can_unsubscribe() {
    let bus = bus_with(quick_config(), Arc::new(InMemoryMembership::new()));
    let handle = bus.subscribe("A", ChannelScope::Owned, Arc::new(RecordingSubscriber::new()));

    let mut forged = handle.clone();
    forged.agent_id = "B".to_string();
    assert!(!bus.unsubscribe(&forged));
    assert_eq!(bus.subscription_count(), 1);
    assert!(bus.unsubscribe(&handle));
    assert!(!bus.unsubscribe(&handle));
    assert_eq!(bus.subscription_count(), 0);
}

/// Pool writes emit one event per transition; subscribing is access checked.
#[tokio::test]
async fn pool_transitions_are_published() {
    let membership = Arc::new(InMemoryMembership::new());
    membership.join_category("markets", "risk-mgmt");
    let pool = MemoryPool::builder(Arc::new(InMemoryRecordStore::new()))
        .membership(membership)
        .build()
        .expect("pool");

    let err = pool
        .subscribe(
            "outsider",
            ChannelScope::Category("markets".to_string()),
            Arc::new(RecordingSubscriber::new()),
        )
        .await
        .expect_err("not a member");
    assert!(matches!(err, CoreError::AuthorizationDenied { .. }));

    let subscriber = Arc::new(RecordingSubscriber::new());
    let handle = pool
        .subscribe(
            "risk-mgmt",
            ChannelScope::Category("markets".to_string()),
            subscriber.clone(),
        )
        .await
        .expect("member subscribes");

    let WriteOutcome::Stored(record) = pool
        .write(
            WriteRequest::new("trading-bot", "AAPL price is 187")
                .category("markets")
                .sharing(SharingPolicy::CategoryShared),
            WritePlan::Store,
        )
        .await
        .expect("write")
    else {
        panic!("expected stored record");
    };
    pool.update_content(record.id, "trading-bot", "AAPL price is 188", Utc::now())
        .await
        .expect("update");
    pool.delete(record.id, "trading-bot").await.expect("delete");

    let received = subscriber.wait_for(3, WAIT).await;
    let kinds: Vec<SyncEventType> = received.iter().map(|event| event.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            SyncEventType::Created,
            SyncEventType::Updated,
            SyncEventType::Deleted
        ]
    );
    assert!(received.iter().all(|event| event.record_id == record.id));
    assert_eq!(received[1].payload["summary"], json!("AAPL price is 188"));
    assert!(pool.unsubscribe(&handle));

    let err = pool
        .subscribe(
            "risk-mgmt",
            ChannelScope::Record(record.id),
            Arc::new(RecordingSubscriber::new()),
        )
        .await
        .expect_err("deleted record");
    assert!(matches!(err, CoreError::AuthorizationDenied { .. }));
}
