use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;

use mule_core::{notification, RecordingNotifier};
use mule_queue::store::memory::MemoryStore;
use mule_queue::store::{ItemDisposition, ItemStore};
use mule_queue::{
    ClaimantId, FailureKind, ItemEvent, ItemStatus, ItemSubmission, QueueAdapter, QueueError,
    QueueSpec, StatusUpdate,
};

const VISIBILITY: Duration = Duration::from_secs(300);
const STALE: Duration = Duration::from_secs(24 * 60 * 60);

/// Test factory functions
fn claimant(name: &str) -> ClaimantId {
    ClaimantId::from(name)
}

async fn store_with_queue(max_retries: u32) -> (Arc<MemoryStore>, mule_queue::QueueId) {
    let store = Arc::new(MemoryStore::new());
    let queue = store
        .create_queue(QueueSpec::new("work").with_max_retries(max_retries))
        .await
        .unwrap();
    (store, queue.id)
}

async fn next_event(
    stream: &mut mule_queue::store::BoxStream<ItemEvent>,
) -> ItemEvent {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("Timeout waiting for event")
        .expect("Stream ended")
}

/// A1. Claim Leases Atomically
#[tokio::test]
async fn test_claim_leases_atomically() {
    let (store, queue_id) = store_with_queue(3).await;
    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"payload".to_vec()))
        .await
        .unwrap();

    // Act: claim
    let claimed = store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();

    // Assert: atomic lease assignment
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, item.id);
    assert_eq!(claimed[0].payload, b"payload".to_vec());

    let record = store.get_item(&item.id).await.unwrap();
    assert_eq!(record.status, ItemStatus::InProgress);
    assert_eq!(record.locked_by, Some(claimant("w1")));
    assert!(record.locked_at.is_some());
}

/// A2. Empty Claim Is A Normal Outcome
#[tokio::test]
async fn test_empty_claim_is_not_an_error() {
    let (store, queue_id) = store_with_queue(3).await;

    let claimed = store
        .claim_batch(&queue_id, &claimant("w1"), 5, VISIBILITY)
        .await
        .unwrap();
    assert!(claimed.is_empty());
}

/// A3. Priority Then FIFO, Capped At Batch Size
#[tokio::test]
async fn test_priority_then_fifo_ordering() {
    let (store, queue_id) = store_with_queue(3).await;

    // Arrange: a low-priority item first, then two high-priority items with
    // distinct ages
    let low = store
        .push_item(
            &queue_id,
            ItemSubmission::new(b"low".to_vec()).with_priority(1),
        )
        .await
        .unwrap();
    let high_old = store
        .push_item(
            &queue_id,
            ItemSubmission::new(b"high-old".to_vec()).with_priority(5),
        )
        .await
        .unwrap();
    let high_new = store
        .push_item(
            &queue_id,
            ItemSubmission::new(b"high-new".to_vec()).with_priority(5),
        )
        .await
        .unwrap();
    store
        .backdate_created(&high_old.id, Duration::from_secs(60))
        .unwrap();

    // Act: claim two of three
    let claimed = store
        .claim_batch(&queue_id, &claimant("w1"), 2, VISIBILITY)
        .await
        .unwrap();

    // Assert: both high-priority items, oldest first, low item untouched
    assert_eq!(claimed.len(), 2);
    assert_eq!(claimed[0].id, high_old.id);
    assert_eq!(claimed[1].id, high_new.id);

    let remaining = store.get_item(&low.id).await.unwrap();
    assert_eq!(remaining.status, ItemStatus::New);
}

/// A4. Unexpired Leases Are Never Reclaimed
#[tokio::test]
async fn test_unexpired_lease_is_not_reclaimed() {
    let (store, queue_id) = store_with_queue(3).await;
    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
        .await
        .unwrap();

    store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();

    // A lease just under the visibility timeout is still owned
    store
        .backdate_lock(&item.id, Duration::from_secs(299))
        .unwrap();
    let empty = store
        .claim_batch(&queue_id, &claimant("w2"), 1, VISIBILITY)
        .await
        .unwrap();
    assert!(empty.is_empty());

    // Once it lapses, the item jumps back into the pool
    store
        .backdate_lock(&item.id, Duration::from_secs(301))
        .unwrap();
    let reclaimed = store
        .claim_batch(&queue_id, &claimant("w2"), 1, VISIBILITY)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, item.id);
}

/// A5. No Double Claim Under Concurrency
#[tokio::test]
async fn test_concurrent_claimants_never_share_an_item() {
    let (store, queue_id) = store_with_queue(3).await;
    for i in 0..4 {
        store
            .push_item(&queue_id, ItemSubmission::new(vec![i as u8]))
            .await
            .unwrap();
    }

    // Act: eight claimants race for four items
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let queue_id = queue_id.clone();
        handles.push(tokio::spawn(async move {
            store
                .claim_batch(
                    &queue_id,
                    &ClaimantId::from(format!("w{}", i)),
                    1,
                    VISIBILITY,
                )
                .await
                .unwrap()
        }));
    }

    let mut seen = std::collections::HashSet::new();
    let mut total = 0;
    for handle in handles {
        for item in handle.await.unwrap() {
            total += 1;
            assert!(seen.insert(item.id.clone()), "item claimed twice");
        }
    }
    assert_eq!(total, 4);
}

/// B1. Only The Lease Holder Can Report
#[tokio::test]
async fn test_only_lease_holder_can_report() {
    let (store, queue_id) = store_with_queue(3).await;
    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
        .await
        .unwrap();
    store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();

    let result = store
        .resolve_item(
            &item.id,
            &claimant("imposter"),
            ItemDisposition::Done { output: None },
            VISIBILITY,
        )
        .await;
    assert!(matches!(result, Err(QueueError::LeaseConflict)));
}

/// B2. Lapsed Lease Report → LeaseConflict
#[tokio::test]
async fn test_lapsed_lease_report_conflicts() {
    let (store, queue_id) = store_with_queue(3).await;
    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
        .await
        .unwrap();
    store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();
    store
        .backdate_lock(&item.id, Duration::from_secs(301))
        .unwrap();

    let result = store
        .resolve_item(
            &item.id,
            &claimant("w1"),
            ItemDisposition::Done { output: None },
            VISIBILITY,
        )
        .await;
    assert!(matches!(result, Err(QueueError::LeaseConflict)));
}

/// B3. Terminal Items Reject Further Reports
#[tokio::test]
async fn test_terminal_item_rejects_reports() {
    let (store, queue_id) = store_with_queue(3).await;
    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
        .await
        .unwrap();
    store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();
    store
        .resolve_item(
            &item.id,
            &claimant("w1"),
            ItemDisposition::Done {
                output: Some(b"result".to_vec()),
            },
            VISIBILITY,
        )
        .await
        .unwrap();

    let again = store
        .resolve_item(
            &item.id,
            &claimant("w1"),
            ItemDisposition::Done { output: None },
            VISIBILITY,
        )
        .await;
    assert!(matches!(again, Err(QueueError::LeaseConflict)));

    let record = store.get_item(&item.id).await.unwrap();
    assert_eq!(record.status, ItemStatus::Done);
    assert_eq!(record.output.as_deref(), Some(b"result".as_ref()));
    assert!(record.completed_at.is_some());
}

/// C1. Retry Exhaustion Scenario (queue "emails", max_retries = 2)
#[tokio::test]
async fn test_retry_exhaustion_scenario() {
    let notifier = RecordingNotifier::new();
    let adapter = QueueAdapter::new(Arc::new(MemoryStore::new()))
        .with_notifier(Arc::new(notifier.clone()));
    let queue = adapter
        .create_queue("ops", QueueSpec::new("emails").with_max_retries(2))
        .await
        .unwrap();
    let item = adapter
        .submit_item(&queue.id, ItemSubmission::new(b"mail-1".to_vec()))
        .await
        .unwrap();
    let worker = claimant("worker-1");

    // First failure: back to the pool
    adapter.claim_next(&queue.id, &worker, 1).await.unwrap();
    let first = adapter
        .update_status(&item.id, &worker, StatusUpdate::failed(None, "smtp down"))
        .await
        .unwrap();
    assert_eq!(first.status, ItemStatus::New);
    assert_eq!(first.retries, 1);

    // Second failure: exhausted, notification fired exactly once
    adapter.claim_next(&queue.id, &worker, 1).await.unwrap();
    let second = adapter
        .update_status(&item.id, &worker, StatusUpdate::failed(None, "smtp down"))
        .await
        .unwrap();
    assert_eq!(second.status, ItemStatus::Failed);
    assert_eq!(second.retries, 2);
    assert_eq!(second.error_kind, Some(FailureKind::Application));
    assert_eq!(notifier.count_of(notification::QUEUE_ITEM_FAILED), 1);
}

/// C2. Business Failure Never Returns To The Pool
#[tokio::test]
async fn test_business_failure_never_requeues() {
    let (store, queue_id) = store_with_queue(10).await;
    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
        .await
        .unwrap();
    store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();

    let failed = store
        .resolve_item(
            &item.id,
            &claimant("w1"),
            ItemDisposition::Failed {
                kind: FailureKind::Business,
                reason: "duplicate invoice".to_string(),
            },
            VISIBILITY,
        )
        .await
        .unwrap();
    assert_eq!(failed.status, ItemStatus::Failed);
    assert_eq!(failed.retries, 10);

    // Nothing left to claim
    let empty = store
        .claim_batch(&queue_id, &claimant("w2"), 1, VISIBILITY)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

/// D1. Abandoned Items Carry No Lease
#[tokio::test]
async fn test_abandoned_items_carry_no_lease() {
    let (store, queue_id) = store_with_queue(3).await;
    let reported = store
        .push_item(&queue_id, ItemSubmission::new(b"a".to_vec()))
        .await
        .unwrap();
    let swept = store
        .push_item(&queue_id, ItemSubmission::new(b"b".to_vec()))
        .await
        .unwrap();
    store
        .claim_batch(&queue_id, &claimant("w1"), 2, VISIBILITY)
        .await
        .unwrap();

    // One abandoned by its claimant, one by the sweeper
    store
        .resolve_item(
            &reported.id,
            &claimant("w1"),
            ItemDisposition::Abandoned {
                reason: "input file missing".to_string(),
            },
            VISIBILITY,
        )
        .await
        .unwrap();
    store
        .backdate_lock(&swept.id, Duration::from_secs(25 * 60 * 60))
        .unwrap();
    store.sweep_stale(Some(&queue_id), STALE).await.unwrap();

    for id in [&reported.id, &swept.id] {
        let record = store.get_item(id).await.unwrap();
        assert_eq!(record.status, ItemStatus::Abandoned);
        assert!(record.locked_by.is_none());
        assert!(record.locked_at.is_none());
        assert!(record.error_reason.is_some());
        assert!(record.error_kind.is_none());
    }
}

/// E1. Unique Reference Conflict
#[tokio::test]
async fn test_unique_reference_rejected_within_queue() {
    let store = MemoryStore::new();
    let queue = store
        .create_queue(QueueSpec::new("orders").with_unique_reference())
        .await
        .unwrap();

    store
        .push_item(
            &queue.id,
            ItemSubmission::new(b"a".to_vec()).with_reference("order-42"),
        )
        .await
        .unwrap();
    let dup = store
        .push_item(
            &queue.id,
            ItemSubmission::new(b"b".to_vec()).with_reference("order-42"),
        )
        .await;
    assert!(matches!(dup, Err(QueueError::DuplicateReference { .. })));

    // The same reference in another queue is fine
    let other = store
        .create_queue(QueueSpec::new("orders-eu").with_unique_reference())
        .await
        .unwrap();
    store
        .push_item(
            &other.id,
            ItemSubmission::new(b"c".to_vec()).with_reference("order-42"),
        )
        .await
        .unwrap();
}

/// F1. Requeue Round Trip
#[tokio::test]
async fn test_requeue_round_trip() {
    let (store, queue_id) = store_with_queue(1).await;
    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
        .await
        .unwrap();

    // Requeue before failure is rejected
    assert!(matches!(
        store.requeue_item(&item.id).await,
        Err(QueueError::Validation(_))
    ));

    store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();
    store
        .resolve_item(
            &item.id,
            &claimant("w1"),
            ItemDisposition::Failed {
                kind: FailureKind::Application,
                reason: "boom".to_string(),
            },
            VISIBILITY,
        )
        .await
        .unwrap();

    let requeued = store.requeue_item(&item.id).await.unwrap();
    assert_eq!(requeued.status, ItemStatus::New);
    assert_eq!(requeued.retries, 0);
    assert!(requeued.locked_by.is_none());
}

/// G1. Lifecycle Events Are Broadcast
#[tokio::test]
async fn test_emits_lifecycle_events() {
    let (store, queue_id) = store_with_queue(3).await;
    let mut events = store.event_stream();

    let item = store
        .push_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
        .await
        .unwrap();
    let created = next_event(&mut events).await;
    assert_eq!(created.event_name(), "created");
    assert_eq!(created.item_id(), &item.id);

    store
        .claim_batch(&queue_id, &claimant("w1"), 1, VISIBILITY)
        .await
        .unwrap();
    let claimed = next_event(&mut events).await;
    assert_eq!(claimed.event_name(), "claimed");

    store
        .resolve_item(
            &item.id,
            &claimant("w1"),
            ItemDisposition::Done { output: None },
            VISIBILITY,
        )
        .await
        .unwrap();
    let completed = next_event(&mut events).await;
    assert_eq!(completed.event_name(), "completed");
}
