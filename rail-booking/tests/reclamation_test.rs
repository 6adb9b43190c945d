mod common;

use chrono::Duration;
use common::{fixture, FakeGateway};
use rail_booking::PaymentOutcome;
use rail_catalog::LedgerEntry;
use rail_core::payment::{PaymentAction, TransactionStatus};
use rail_core::repository::{PaymentRepository, TicketRepository};
use rail_core::ticket::{TicketPaymentStatus, TicketStatus};
use rail_core::{BookingError, Principal};
use rail_shared::SeatChange;
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::test]
async fn test_sweep_reclaims_expired_hold() {
    let fx = fixture(72).await;
    let orchestrator = fx.orchestrator(FakeGateway::new());
    let user = Principal::user("u-1");
    let ticket = fx.booking_service().book_ticket(&user, fx.request("A1"), fx.now).await.unwrap();
    let session = orchestrator.initiate_payment(&user, ticket.id, fx.now).await.unwrap();

    // Not yet due
    let report = fx.sweep().run(fx.now + Duration::minutes(5)).await;
    assert!(report.is_empty());

    let (tx, mut rx) = broadcast::channel(16);
    let sweep = fx.sweep().with_events(tx);
    let report = sweep.run(fx.now + Duration::minutes(11)).await;

    assert_eq!(report.expired_count, 1);
    assert_eq!(report.cancelled_transaction_count, 1);
    assert!(report.errors.is_empty());

    let expired = fx.store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(expired.status, TicketStatus::Expired);
    assert_eq!(expired.payment_status, TicketPaymentStatus::Expired);

    let seat = fx.store.get_seat(fx.compartment_id, "A1").await.unwrap().unwrap();
    assert!(seat.is_available);

    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 0);

    let txn = fx.store.get_transaction(session.transaction_id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Cancelled);
    assert_eq!(txn.failure_reason.as_deref(), Some("booking expired due to payment timeout"));
    assert!(txn.completed_at.is_some());

    let logs = fx.store.logs_for_transaction(txn.id).await.unwrap();
    assert_eq!(logs.last().map(|l| l.action), Some(PaymentAction::Expired));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.change, SeatChange::Expired);
    assert!(event.available);

    // Second pass finds nothing
    let report = fx.sweep().run(fx.now + Duration::minutes(12)).await;
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_paid_ticket_is_never_expired() {
    let fx = fixture(72).await;
    let gateway = FakeGateway::new();
    let orchestrator = fx.orchestrator(gateway.clone());
    let user = Principal::user("u-1");
    let ticket = fx.booking_service().book_ticket(&user, fx.request("B1"), fx.now).await.unwrap();
    let session = orchestrator.initiate_payment(&user, ticket.id, fx.now).await.unwrap();
    gateway.approve("VAL-B1", session.transaction_id, 207_600);

    orchestrator.handle_success(session.transaction_id, "VAL-B1", fx.now).await.unwrap();

    let report = fx.sweep().run(fx.now + Duration::hours(1)).await;
    assert_eq!(report.expired_count, 0);

    let ticket = fx.store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Confirmed);
    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 1);
}

#[tokio::test]
async fn test_late_success_after_sweep_is_refused() {
    let fx = fixture(72).await;
    let gateway = FakeGateway::new();
    let orchestrator = fx.orchestrator(gateway.clone());
    let user = Principal::user("u-1");
    let ticket = fx.booking_service().book_ticket(&user, fx.request("C1"), fx.now).await.unwrap();
    let session = orchestrator.initiate_payment(&user, ticket.id, fx.now).await.unwrap();
    gateway.approve("VAL-C1", session.transaction_id, 207_600);

    let later = fx.now + Duration::minutes(15);
    fx.sweep().run(later).await;

    assert!(matches!(
        orchestrator.handle_success(session.transaction_id, "VAL-C1", later).await,
        Err(BookingError::InvalidState(_))
    ));

    let txn = fx.store.get_transaction(session.transaction_id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Cancelled);
    let ticket = fx.store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Expired);
}

#[tokio::test]
async fn test_payment_and_sweep_race_has_one_winner() {
    for round in 0..25 {
        let fx = fixture(72).await;
        let gateway = FakeGateway::new();
        let orchestrator = Arc::new(fx.orchestrator(gateway.clone()));
        let user = Principal::user("u-1");
        let seat = format!("R{}", round);
        let ticket = fx.booking_service().book_ticket(&user, fx.request(&seat), fx.now).await.unwrap();
        let session = orchestrator.initiate_payment(&user, ticket.id, fx.now).await.unwrap();
        gateway.approve("VAL-R", session.transaction_id, 207_600);

        // Past the deadline, before the sweep has run
        let at = ticket.expires_at + Duration::seconds(30);
        let sweep = fx.sweep();
        let payer = orchestrator.clone();
        let txn_id = session.transaction_id;

        let (paid, report) = tokio::join!(
            tokio::spawn(async move { payer.handle_success(txn_id, "VAL-R", at).await }),
            tokio::spawn(async move { sweep.run(at).await }),
        );
        let paid = paid.unwrap();
        let report = report.unwrap();

        let ticket = fx.store.get_ticket(ticket.id).await.unwrap().unwrap();
        let txn = fx.store.get_transaction(txn_id).await.unwrap().unwrap();

        match ticket.status {
            TicketStatus::Confirmed => {
                assert!(matches!(paid, Ok(PaymentOutcome::Completed(_))));
                assert_eq!(txn.status, TransactionStatus::Completed);
                assert_eq!(report.expired_count, 0);
            }
            TicketStatus::Expired => {
                assert!(matches!(paid, Err(BookingError::InvalidState(_))));
                assert_eq!(txn.status, TransactionStatus::Cancelled);
                assert_eq!(report.expired_count, 1);
            }
            other => panic!("ticket ended {}", other),
        }
    }
}

#[tokio::test]
async fn test_sweep_isolates_failures() {
    let fx = fixture(72).await;
    let service = fx.booking_service();
    let user = Principal::user("u-1");

    let first = service.book_ticket(&user, fx.request("D1"), fx.now).await.unwrap();
    let second = service.book_ticket(&user, fx.request("D2"), fx.now + Duration::minutes(1)).await.unwrap();
    let third = service.book_ticket(&user, fx.request("D3"), fx.now + Duration::minutes(2)).await.unwrap();

    // Ledger drifted: only two seats recorded for three holds
    fx.store
        .set_ledger(fx.schedule_id, fx.compartment_id, LedgerEntry { booked_seats: 2, total_seats: 72 })
        .await;

    let report = fx.sweep().run(fx.now + Duration::hours(1)).await;

    // Oldest first: D1 and D2 drain the ledger, D3 underflows
    assert_eq!(report.expired_count, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].ticket_id, Some(third.id));
    assert!(report.errors[0].error.contains("Ledger underflow"));

    for id in [first.id, second.id] {
        let ticket = fx.store.get_ticket(id).await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Expired);
    }
    let stuck = fx.store.get_ticket(third.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, TicketStatus::Pending);
}
