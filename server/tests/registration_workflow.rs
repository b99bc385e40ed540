mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use common::*;
use eventhive_server::models::{EventCategory, PaymentMethod};
use eventhive_server::services::{
    CatalogService, EventDraft, HistoryService, PaymentConfirmation, PaymentDetails,
    SimulatedPaymentGateway,
};
use eventhive_server::store::{EventCatalog, InMemoryStore, RegistrationLedger};
use eventhive_server::utils::error::AppError;

async fn ledger_total(store: &InMemoryStore, event_id: Uuid) -> u32 {
    store
        .registrations_for_event(event_id)
        .await
        .iter()
        .map(|registration| registration.tickets_bought)
        .sum()
}

#[tokio::test]
async fn test_repeat_registration_merges_into_one_record() {
    let store = Arc::new(InMemoryStore::new());
    let fee = Decimal::from(100);
    let event_id = seed_event(store.as_ref(), 10, fee).await;
    let service = service(store.clone());

    let first = service.register(request(event_id, "u1", 2, fee)).await.unwrap();
    assert!(first.created);
    assert_eq!(first.tickets_held, 2);

    let second = service.register(request(event_id, "u1", 3, fee)).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.tickets_held, 5);
    assert_eq!(second.registration.payment_amount, Decimal::from(500));
    assert_eq!(second.event_ticket_count, 5);

    let rows = store.registrations_for_event(event_id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tickets_bought, 5);
    assert_eq!(rows[0].registered_at, first.registration.registered_at);

    let event = store.get_event(event_id).await.unwrap();
    assert_eq!(event.registered_users, vec!["u1".to_string()]);
}

#[tokio::test]
async fn test_request_for_exactly_the_remaining_tickets_succeeds() {
    let store = Arc::new(InMemoryStore::new());
    let event_id = seed_event(store.as_ref(), 4, Decimal::ZERO).await;
    let service = service(store.clone());

    let receipt = service
        .register(request(event_id, "u1", 4, Decimal::ZERO))
        .await
        .unwrap();
    assert_eq!(receipt.event_ticket_count, 0);

    let err = service
        .register(request(event_id, "u2", 1, Decimal::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientInventory {
            requested: 1,
            available: 0
        }
    ));
}

#[tokio::test]
async fn test_over_request_leaves_inventory_untouched() {
    let store = Arc::new(InMemoryStore::new());
    let event_id = seed_event(store.as_ref(), 3, Decimal::ZERO).await;
    let service = service(store.clone());

    let err = service
        .register(request(event_id, "u1", 4, Decimal::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientInventory {
            requested: 4,
            available: 3
        }
    ));
    assert_eq!(store.get_event(event_id).await.unwrap().ticket_count, 3);
    assert!(store.find_registration(event_id, "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_any_write() {
    let store = Arc::new(InMemoryStore::new());
    let fee = Decimal::from(50);
    let event_id = seed_event(store.as_ref(), 5, fee).await;
    let service = service(store.clone());

    let err = service.register(request(event_id, "u1", 0, fee)).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let mut unpaid = request(event_id, "u1", 1, fee);
    unpaid.payment.succeeded = false;
    let err = service.register(unpaid).await.unwrap_err();
    assert!(matches!(err, AppError::PaymentNotConfirmed(_)));

    let mut short = request(event_id, "u1", 2, fee);
    short.payment.amount = fee;
    let err = service.register(short).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let mut free_for_paid = request(event_id, "u1", 1, fee);
    free_for_paid.payment = PaymentConfirmation::free();
    let err = service.register(free_for_paid).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = service
        .register(request(Uuid::new_v4(), "u1", 1, fee))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(store.get_event(event_id).await.unwrap().ticket_count, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_race_for_the_last_ticket_has_one_winner() {
    let store = Arc::new(InMemoryStore::new());
    let event_id = seed_event(store.as_ref(), 1, Decimal::ZERO).await;
    let service = service(store.clone());

    let a = tokio::spawn({
        let service = service.clone();
        async move { service.register(request(event_id, "a", 1, Decimal::ZERO)).await }
    });
    let b = tokio::spawn({
        let service = service.clone();
        async move { service.register(request(event_id, "b", 1, Decimal::ZERO)).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        loser,
        AppError::InsufficientInventory { .. } | AppError::ConcurrencyExhausted { .. }
    ));
    assert_eq!(store.get_event(event_id).await.unwrap().ticket_count, 0);
    assert_eq!(ledger_total(&store, event_id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_never_oversell() {
    let capacity = 25;
    let store = Arc::new(InMemoryStore::new().with_max_cas_attempts(50));
    let event_id = seed_event(store.as_ref(), capacity, Decimal::ZERO).await;
    let service = service(store.clone());

    let handles: Vec<_> = (0..40u32)
        .map(|i| {
            let service = service.clone();
            let user_id = format!("user-{}", i % 12);
            let tickets = i % 3 + 1;
            tokio::spawn(async move {
                service
                    .register(request(event_id, &user_id, tickets, Decimal::ZERO))
                    .await
                    .map(|_| tickets)
            })
        })
        .collect();

    let mut sold = 0;
    for handle in handles {
        if let Ok(tickets) = handle.await.unwrap() {
            sold += tickets;
        }
    }

    let remaining = store.get_event(event_id).await.unwrap().ticket_count;
    assert!(sold <= capacity);
    assert_eq!(remaining + sold, capacity);
    assert_eq!(ledger_total(&store, event_id).await, sold);

    let rows = store.registrations_for_event(event_id).await;
    let mut users: Vec<_> = rows.iter().map(|r| r.user_id.clone()).collect();
    users.sort();
    users.dedup();
    assert_eq!(users.len(), rows.len());
}

#[tokio::test]
async fn test_transient_ledger_failures_are_retried() {
    let store = Arc::new(FaultyStore::new(InMemoryStore::new()).fail_upserts(2));
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    let receipt = service
        .register(request(event_id, "u1", 2, Decimal::ZERO))
        .await
        .unwrap();
    assert_eq!(receipt.tickets_held, 2);
    assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.decrement_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_event(event_id).await.unwrap().ticket_count, 3);
}

#[tokio::test]
async fn test_ledger_failure_restores_inventory() {
    let store = Arc::new(FaultyStore::new(InMemoryStore::new()).fail_upserts(10));
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    let err = service
        .register(request(event_id, "u1", 2, Decimal::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StoreUnavailable(_)));
    assert!(err.is_retryable());

    let event = store.get_event(event_id).await.unwrap();
    assert_eq!(event.ticket_count, 5);
    assert_eq!(store.restore_calls.load(Ordering::SeqCst), 1);
    assert!(store.find_registration(event_id, "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_ledger_write_that_landed_is_not_compensated() {
    let store = Arc::new(
        FaultyStore::new(InMemoryStore::new()).lagging_upserts(Duration::from_millis(400)),
    );
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    let receipt = service
        .register(request(event_id, "u1", 2, Decimal::ZERO))
        .await
        .unwrap();
    assert_eq!(receipt.tickets_held, 2);
    assert_eq!(store.restore_calls.load(Ordering::SeqCst), 0);

    let remaining = store.get_event(event_id).await.unwrap().ticket_count;
    let recorded = ledger_total(&store.inner, event_id).await;
    assert_eq!(remaining, 3);
    assert_eq!(recorded, 2);
    assert_eq!(remaining + recorded, 5);
}

#[tokio::test]
async fn test_unknown_ledger_state_keeps_inventory_taken() {
    let store = Arc::new(
        FaultyStore::new(InMemoryStore::new())
            .lagging_upserts(Duration::from_millis(400))
            .fail_finds_after(1),
    );
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    let err = service
        .register(request(event_id, "u1", 2, Decimal::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PartialFailure { tickets: 2, .. }));
    assert_eq!(store.restore_calls.load(Ordering::SeqCst), 0);

    // The ledger holds the claim, so the taken tickets must stay taken.
    let remaining = store.get_event(event_id).await.unwrap().ticket_count;
    assert_eq!(remaining + ledger_total(&store.inner, event_id).await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_submit_compensation_keeps_live_registrant() {
    let store = Arc::new(
        FaultyStore::new(InMemoryStore::new())
            .pair_first_finds()
            .fail_upserts_after(1),
    );
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    let first = tokio::spawn({
        let service = service.clone();
        async move { service.register(request(event_id, "u1", 1, Decimal::ZERO)).await }
    });
    let second = tokio::spawn({
        let service = service.clone();
        async move { service.register(request(event_id, "u1", 1, Decimal::ZERO)).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let event = store.get_event(event_id).await.unwrap();
    let row = store.find_registration(event_id, "u1").await.unwrap().unwrap();
    assert_eq!(row.tickets_bought, 1);
    assert_eq!(event.ticket_count, 4);
    assert!(event.has_registrant("u1"));
}

#[tokio::test]
async fn test_restore_keeps_existing_registrant() {
    let store = Arc::new(FaultyStore::new(InMemoryStore::new()));
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    service
        .register(request(event_id, "u1", 1, Decimal::ZERO))
        .await
        .unwrap();
    store.failing_upserts.store(10, Ordering::SeqCst);
    service
        .register(request(event_id, "u1", 2, Decimal::ZERO))
        .await
        .unwrap_err();

    let event = store.get_event(event_id).await.unwrap();
    assert_eq!(event.ticket_count, 4);
    assert!(event.has_registrant("u1"));
}

#[tokio::test]
async fn test_failed_compensation_is_a_partial_failure() {
    let store = Arc::new(
        FaultyStore::new(InMemoryStore::new())
            .fail_upserts(10)
            .fail_restores(1),
    );
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    let err = service
        .register(request(event_id, "u1", 2, Decimal::ZERO))
        .await
        .unwrap_err();
    match err {
        AppError::PartialFailure {
            event_id: failed_event,
            ref user_id,
            tickets,
            ..
        } => {
            assert_eq!(failed_event, event_id);
            assert_eq!(user_id, "u1");
            assert_eq!(tickets, 2);
        }
        other => panic!("expected PartialFailure, got {:?}", other),
    }
    assert_eq!(store.get_event(event_id).await.unwrap().ticket_count, 3);
}

#[tokio::test]
async fn test_slow_store_surfaces_timeout() {
    let store = Arc::new(
        FaultyStore::new(InMemoryStore::new()).slow_reads(Duration::from_millis(400)),
    );
    let event_id = seed_event(store.as_ref(), 5, Decimal::ZERO).await;
    let service = service(store.clone());

    let err = service
        .register(request(event_id, "u1", 1, Decimal::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout { operation: "get_event", .. }));
    assert!(err.is_retryable());
    assert_eq!(store.decrement_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transactional_store_commits_both_writes() {
    let store = Arc::new(InMemoryStore::new().with_transactions(true));
    let event_id = seed_event(store.as_ref(), 6, Decimal::ZERO).await;
    let service = service(store.clone());

    service
        .register(request(event_id, "u1", 2, Decimal::ZERO))
        .await
        .unwrap();
    let receipt = service
        .register(request(event_id, "u1", 3, Decimal::ZERO))
        .await
        .unwrap();
    assert_eq!(receipt.tickets_held, 5);
    assert_eq!(receipt.event_ticket_count, 1);

    let err = service
        .register(request(event_id, "u2", 2, Decimal::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory { .. }));
    assert_eq!(ledger_total(&store, event_id).await, 5);
}

#[tokio::test]
async fn test_free_conference_from_creation_to_history() {
    let store = Arc::new(InMemoryStore::new());
    let settings = fast_settings();
    let catalog = CatalogService::new(store.clone(), settings.clone());
    let history = HistoryService::new(store.clone(), settings);
    let gateway = SimulatedPaymentGateway::new(Duration::ZERO);
    let organizer = user("organizer");

    let creation_fee = gateway
        .confirm(
            EventCategory::Conference.creation_fee(),
            &PaymentDetails::Upi {
                upi_id: "organizer@upi".to_string(),
            },
        )
        .await
        .unwrap();
    let event = catalog
        .create_event(
            &organizer,
            EventDraft {
                category: EventCategory::Conference,
                title: "RustConf India".to_string(),
                description: "Talks about systems programming".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 12, 5).unwrap(),
                time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                location: "Pune".to_string(),
                ticket_count: 100,
                registration_fee: Decimal::ZERO,
                idempotency_key: "conf-1".to_string(),
            },
            &creation_fee,
        )
        .await
        .unwrap();
    assert_eq!(event.image_url, EventCategory::Conference.default_image());

    let payment = gateway
        .confirm(Decimal::ZERO, &PaymentDetails::Free)
        .await
        .unwrap();
    let receipt = service(store.clone())
        .register(eventhive_server::services::RegistrationRequest {
            event_id: event.id,
            user: user("attendee"),
            requested_tickets: 3,
            payment,
        })
        .await
        .unwrap();
    assert_eq!(receipt.tickets_held, 3);
    assert_eq!(receipt.event_ticket_count, 97);
    assert!(catalog
        .get_event(event.id)
        .await
        .unwrap()
        .has_registrant("attendee"));
    assert_eq!(receipt.registration.payment_method, PaymentMethod::Free);
    assert_eq!(receipt.registration.attendee_phone, "9876543210");

    let registered = history.registered_events("attendee", 10).await.unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].event.id, event.id);
    assert_eq!(registered[0].tickets_bought, 3);

    let organized = history.organized_events("organizer", 10).await.unwrap();
    assert_eq!(organized.len(), 1);
}

#[tokio::test]
async fn test_event_creation_needs_phone_and_exact_fee() {
    let store = Arc::new(InMemoryStore::new());
    let catalog = CatalogService::new(store.clone(), fast_settings());
    let draft = EventDraft {
        category: EventCategory::Wedding,
        title: "Garden wedding".to_string(),
        description: "Ceremony and dinner".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
        time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        location: "Jaipur".to_string(),
        ticket_count: 150,
        registration_fee: Decimal::ZERO,
        idempotency_key: "wedding-1".to_string(),
    };
    let fee = paid(EventCategory::Wedding.creation_fee(), 1);

    let mut no_phone = user("host");
    no_phone.phone_number = None;
    let err = catalog
        .create_event(&no_phone, draft.clone(), &fee)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = catalog
        .create_event(&user("host"), draft.clone(), &paid(Decimal::from(1500), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let first = catalog
        .create_event(&user("host"), draft.clone(), &fee)
        .await
        .unwrap();
    let again = catalog.create_event(&user("host"), draft, &fee).await.unwrap();
    assert_eq!(first.id, again.id);
}
