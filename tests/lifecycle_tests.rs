//! Delivery lifecycle rules, exercised against the in-memory store

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{at, ManualClock, RecordingNotifier};
use fastfeet::error::AppError;
use fastfeet::lifecycle::{DeliveryLifecycle, LifecyclePolicy, ReassignPolicy};
use fastfeet::models::{Delivery, NewDelivery, NewDeliveryman, NewFile, NewRecipient};
use fastfeet::store::{DeliveryFilter, MemoryStore, Repository};

struct Fixture {
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
    engine: DeliveryLifecycle,
    recipient_id: i64,
    deliveryman_id: i64,
}

async fn fixture_with(policy: LifecyclePolicy, notifier: Arc<RecordingNotifier>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(at(9, 0));

    let recipient = store
        .create_recipient(NewRecipient {
            name: "Ana".to_string(),
            street: "Rua das Flores".to_string(),
            number: "42".to_string(),
            complement: None,
            state: "SP".to_string(),
            city: "Campinas".to_string(),
            zip_code: "13000-000".to_string(),
        })
        .await
        .unwrap();
    let deliveryman = store
        .create_deliveryman(NewDeliveryman {
            name: "Bruno".to_string(),
            email: "bruno@fastfeet.com".to_string(),
            avatar_id: None,
        })
        .await
        .unwrap();

    let engine = DeliveryLifecycle::new(store.clone(), notifier.clone(), clock.clone(), policy);

    Fixture {
        store,
        notifier,
        clock,
        engine,
        recipient_id: recipient.id,
        deliveryman_id: deliveryman.id,
    }
}

async fn fixture() -> Fixture {
    fixture_with(LifecyclePolicy::default(), RecordingNotifier::new()).await
}

impl Fixture {
    fn order(&self, product: &str) -> NewDelivery {
        NewDelivery {
            product: product.to_string(),
            recipient_id: self.recipient_id,
            deliveryman_id: self.deliveryman_id,
        }
    }

    async fn created(&self) -> Delivery {
        self.engine.create(self.order("Widget")).await.unwrap()
    }

    async fn picked_up(&self) -> Delivery {
        let d = self.created().await;
        self.engine.pick_up(d.id).await.unwrap()
    }

    fn signature() -> NewFile {
        NewFile {
            name: "signature.png".to_string(),
            path: "0f1e.png".to_string(),
        }
    }
}

fn assert_transition(result: Result<Delivery, AppError>, message: &str) {
    match result {
        Err(AppError::InvalidTransition(m)) => assert!(
            m.contains(message),
            "expected '{}' in '{}'",
            message,
            m
        ),
        other => panic!("expected InvalidTransition, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_persists_and_notifies() {
    let f = fixture().await;
    assert_eq!(f.recipient_id, 1);
    assert_eq!(f.deliveryman_id, 2);

    let delivery = f
        .engine
        .create(NewDelivery {
            product: "Widget".to_string(),
            recipient_id: 1,
            deliveryman_id: 2,
        })
        .await
        .unwrap();

    let stored = f.store.find_delivery(delivery.id).await.unwrap().unwrap();
    assert_eq!(stored.start_date, None);
    assert_eq!(stored.end_date, None);
    assert_eq!(stored.canceled_at, None);

    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].to.contains("bruno@fastfeet.com"));
    assert!(sent[0].subject.contains("Widget"));
}

#[tokio::test]
async fn test_create_with_missing_recipient_writes_nothing() {
    let f = fixture().await;
    let err = f
        .engine
        .create(NewDelivery {
            product: "Widget".to_string(),
            recipient_id: 999,
            deliveryman_id: f.deliveryman_id,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(f.store.delivery_count().await, 0);
    assert!(f.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_create_with_missing_deliveryman_writes_nothing() {
    let f = fixture().await;
    let err = f
        .engine
        .create(NewDelivery {
            product: "Widget".to_string(),
            recipient_id: f.recipient_id,
            deliveryman_id: 999,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(f.store.delivery_count().await, 0);
    assert!(f.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_create_survives_notification_failure() {
    let f = fixture_with(LifecyclePolicy::default(), RecordingNotifier::failing()).await;
    let delivery = f.created().await;

    assert!(f.store.find_delivery(delivery.id).await.unwrap().is_some());
    assert_eq!(f.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_pick_up_window_edges() {
    let f = fixture().await;

    for (hour, minute, allowed) in [(7, 59, false), (8, 0, true), (17, 59, true), (18, 1, false)] {
        let d = f.created().await;
        let result = f.engine.pick_up_at(d.id, at(hour, minute)).await;
        if allowed {
            assert_eq!(result.unwrap().start_date, Some(at(hour, minute)));
        } else {
            assert_transition(result, "between 08:00 and 18:00");
        }
    }
}

#[tokio::test]
async fn test_pick_up_with_prior_pickups_sets_start_date() {
    let f = fixture().await;
    for hour in [8, 8, 9] {
        let d = f.created().await;
        f.engine.pick_up_at(d.id, at(hour, 30)).await.unwrap();
    }

    let base = f.created().await;
    f.store
        .put_delivery(Delivery { id: 10, ..base })
        .await;

    let started = f.engine.pick_up_at(10, at(9, 0)).await.unwrap();
    assert_eq!(started.start_date, Some(at(9, 0)));
}

#[tokio::test]
async fn test_daily_quota() {
    let f = fixture().await;
    for i in 0..4 {
        let d = f.created().await;
        f.engine.pick_up_at(d.id, at(9, i)).await.unwrap();
    }

    let fifth = f.created().await;
    assert!(f.engine.pick_up_at(fifth.id, at(10, 0)).await.is_ok());

    let sixth = f.created().await;
    assert_transition(
        f.engine.pick_up_at(sixth.id, at(10, 5)).await,
        "5 deliveries per day",
    );
}

#[tokio::test]
async fn test_quota_ignores_previous_day() {
    let f = fixture().await;
    for i in 0..5 {
        let d = f.created().await;
        f.engine
            .pick_up_at(d.id, at(9, i) - Duration::days(1))
            .await
            .unwrap();
    }

    let today = f.created().await;
    assert!(f.engine.pick_up_at(today.id, at(9, 0)).await.is_ok());
}

#[tokio::test]
async fn test_quota_counts_pickups_not_creations() {
    let f = fixture().await;
    // Plenty of deliveries created today, none picked up
    for _ in 0..6 {
        f.created().await;
    }
    let d = f.created().await;
    assert!(f.engine.pick_up_at(d.id, at(11, 0)).await.is_ok());
}

#[tokio::test]
async fn test_pick_up_only_once() {
    let f = fixture().await;
    let d = f.picked_up().await;
    assert_transition(f.engine.pick_up(d.id).await, "already started");
}

#[tokio::test]
async fn test_complete_before_pick_up() {
    let f = fixture().await;
    let d = f.created().await;
    assert_transition(
        f.engine.complete(d.id, Fixture::signature()).await,
        "hasn't started yet",
    );
    let stored = f.store.find_delivery(d.id).await.unwrap().unwrap();
    assert!(stored.end_date.is_none());
    assert_eq!(f.store.file_count().await, 0);
}

#[tokio::test]
async fn test_complete_sets_end_date_and_signature() {
    let f = fixture().await;
    let d = f.picked_up().await;
    f.clock.set(at(15, 0));

    let done = f.engine.complete(d.id, Fixture::signature()).await.unwrap();
    assert_eq!(done.end_date, Some(at(15, 0)));
    let signature = f
        .store
        .find_file(done.signature_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signature.name, "signature.png");

    assert_transition(
        f.engine.complete(d.id, Fixture::signature()).await,
        "already ended",
    );
}

#[tokio::test]
async fn test_cancel_twice() {
    let f = fixture().await;
    let d = f.created().await;

    let canceled = f.engine.cancel(d.id).await.unwrap();
    assert_eq!(canceled.canceled_at, Some(at(9, 0)));
    assert_transition(f.engine.cancel(d.id).await, "already been canceled");
}

#[tokio::test]
async fn test_canceled_delivery_is_terminal() {
    let f = fixture().await;
    let fresh = f.created().await;
    let started = f.picked_up().await;

    for d in [fresh, started] {
        f.engine.cancel(d.id).await.unwrap();
        assert!(matches!(
            f.engine.cancel(d.id).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            f.engine.pick_up(d.id).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            f.engine.complete(d.id, Fixture::signature()).await,
            Err(AppError::InvalidTransition(_))
        ));
    }
}

#[tokio::test]
async fn test_completed_delivery_cannot_be_canceled() {
    let f = fixture().await;
    let d = f.picked_up().await;
    f.engine.complete(d.id, Fixture::signature()).await.unwrap();

    assert_transition(f.engine.cancel(d.id).await, "already ended");
}

#[tokio::test]
async fn test_missing_delivery_is_not_found() {
    let f = fixture().await;
    assert!(matches!(f.engine.pick_up(404).await, Err(AppError::NotFound(_))));
    assert!(matches!(f.engine.cancel(404).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        f.engine.report_problem(404, "lost").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_report_problem_does_not_cancel() {
    let f = fixture().await;
    let d = f.picked_up().await;

    let problem = f.engine.report_problem(d.id, "Box damaged").await.unwrap();
    assert_eq!(problem.delivery_id, d.id);

    let stored = f.store.find_delivery(d.id).await.unwrap().unwrap();
    assert!(stored.canceled_at.is_none());
    assert!(f
        .store
        .list_deliveries(DeliveryFilter::canceled())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_reassign_any_state_by_default() {
    let f = fixture().await;
    let d = f.picked_up().await;

    let changed = f.engine.reassign(d.id, f.order("Gadget")).await.unwrap();
    assert_eq!(changed.product, "Gadget");
    assert_eq!(changed.start_date, d.start_date);
}

#[tokio::test]
async fn test_reassign_before_pickup_policy() {
    let policy = LifecyclePolicy {
        reassign: ReassignPolicy::BeforePickup,
        ..LifecyclePolicy::default()
    };
    let f = fixture_with(policy, RecordingNotifier::new()).await;

    let pending = f.created().await;
    assert!(f.engine.reassign(pending.id, f.order("Gadget")).await.is_ok());

    let started = f.picked_up().await;
    assert_transition(
        f.engine.reassign(started.id, f.order("Gadget")).await,
        "can no longer be reassigned",
    );
}

#[tokio::test]
async fn test_reassign_checks_references() {
    let f = fixture().await;
    let d = f.created().await;

    let err = f
        .engine
        .reassign(
            d.id,
            NewDelivery {
                product: "Widget".to_string(),
                recipient_id: f.recipient_id,
                deliveryman_id: 999,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_pickups_of_one_delivery() {
    let f = Arc::new(fixture().await);
    let d = f.created().await;

    let a = {
        let f = f.clone();
        tokio::spawn(async move { f.engine.pick_up(d.id).await })
    };
    let b = {
        let f = f.clone();
        tokio::spawn(async move { f.engine.pick_up(d.id).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
}

#[tokio::test]
async fn test_concurrent_completions_file_one_signature() {
    let f = Arc::new(fixture().await);
    let d = f.picked_up().await;

    let a = {
        let f = f.clone();
        tokio::spawn(async move { f.engine.complete(d.id, Fixture::signature()).await })
    };
    let b = {
        let f = f.clone();
        tokio::spawn(async move { f.engine.complete(d.id, Fixture::signature()).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(f.store.file_count().await, 1);
}
