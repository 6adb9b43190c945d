mod common;

use chrono::Duration;
use common::fixture;
use rail_booking::QuoteRequest;
use rail_core::ticket::{TicketPaymentStatus, TicketStatus};
use rail_core::{BookingError, Principal};
use rail_core::repository::TicketRepository;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_delhi_to_mumbai_fare() {
    let fx = fixture(72).await;
    let service = fx.booking_service();

    let quote = service
        .quote_fare(&QuoteRequest {
            schedule_id: fx.schedule_id,
            from_station_id: fx.delhi,
            to_station_id: fx.mumbai,
            compartment_id: fx.compartment_type_id,
        })
        .await
        .unwrap();

    assert_eq!(quote.segment.distance_km, 1384);
    assert_eq!(quote.amount_minor, 207_600);
    assert_eq!(quote.display_amount(), "2076.00");

    // Quoting holds nothing
    assert!(fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_book_ticket_creates_pending_hold() {
    let fx = fixture(72).await;
    let service = fx.booking_service();
    let user = Principal::user("u-1");

    let ticket = service.book_ticket(&user, fx.request("a12"), fx.now).await.unwrap();

    assert_eq!(ticket.status, TicketStatus::Pending);
    assert_eq!(ticket.payment_status, TicketPaymentStatus::Pending);
    assert_eq!(ticket.seat_number, "A12");
    assert_eq!(ticket.fare_minor, 207_600);
    assert_eq!(ticket.expires_at, fx.now + Duration::minutes(10));
    assert!(ticket.ticket_number.starts_with("RJ701-20261020-A12-"));

    let seat = fx.store.get_seat(fx.compartment_id, "A12").await.unwrap().unwrap();
    assert!(!seat.is_available);

    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 1);
    assert_eq!(ledger.total_seats, 72);
}

#[tokio::test]
async fn test_concurrent_bookings_for_one_seat() {
    let fx = fixture(72).await;
    let service = Arc::new(fx.booking_service());

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        let request = fx.request("B7");
        let now = fx.now;
        handles.push(tokio::spawn(async move {
            let user = Principal::user(&format!("u-{}", i));
            service.book_ticket(&user, request, now).await
        }));
    }

    let mut booked = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(BookingError::SeatAlreadyBooked { seat_number }) => {
                assert_eq!(seat_number, "B7");
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(booked, 1);
    assert_eq!(conflicts, 19);
    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 1);
}

#[tokio::test]
async fn test_capacity_rejects_exactly_one_over() {
    let fx = fixture(4).await;
    let service = Arc::new(fx.booking_service());

    let mut handles = Vec::new();
    for seat in ["C1", "C2", "C3", "C4", "C5"] {
        let service = service.clone();
        let request = fx.request(seat);
        let now = fx.now;
        handles.push(tokio::spawn(async move {
            service.book_ticket(&Principal::user("u-1"), request, now).await
        }));
    }

    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => {}
            Err(e @ BookingError::CapacityExceeded { .. }) => {
                assert!(e.is_conflict());
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(rejected, 1);
    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 4);
}

#[tokio::test]
async fn test_booking_validation_order() {
    let fx = fixture(72).await;
    let service = fx.booking_service();
    let user = Principal::user("u-1");

    let mut request = fx.request("D1");
    request.schedule_id = Uuid::new_v4();
    assert!(matches!(
        service.book_ticket(&user, request, fx.now).await,
        Err(BookingError::NotFound { entity: "schedule", .. })
    ));

    // Travelling backwards along the route
    let mut request = fx.request("D1");
    request.from_station_id = fx.mumbai;
    request.to_station_id = fx.kota;
    assert!(matches!(
        service.book_ticket(&user, request, fx.now).await,
        Err(BookingError::InvalidSegment(_))
    ));

    let mut request = fx.request("D1");
    request.compartment_id = Uuid::new_v4();
    assert!(matches!(
        service.book_ticket(&user, request, fx.now).await,
        Err(BookingError::CompartmentUnavailable(_))
    ));

    let mut request = fx.request("D1");
    request.passenger.age = 150;
    assert!(matches!(
        service.book_ticket(&user, request, fx.now).await,
        Err(BookingError::Validation(_))
    ));

    // Nothing was written by any of the failures
    assert!(fx.store.get_seat(fx.compartment_id, "D1").await.unwrap().is_none());
    assert!(fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_partial_segment_fare() {
    let fx = fixture(72).await;
    let service = fx.booking_service();

    let mut request = fx.request("E3");
    request.to_station_id = fx.kota;
    let ticket = service.book_ticket(&Principal::user("u-1"), request, fx.now).await.unwrap();

    assert_eq!(ticket.distance_km, 465);
    assert_eq!(ticket.fare_minor, 69_750);
}

#[tokio::test]
async fn test_departed_schedule_is_not_bookable() {
    let fx = fixture(72).await;
    let service = fx.booking_service();

    let after_departure = fx.departure_at + Duration::minutes(5);
    assert!(matches!(
        service.book_ticket(&Principal::user("u-1"), fx.request("F1"), after_departure).await,
        Err(BookingError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_ticket_lookup_requires_owner_or_admin() {
    let fx = fixture(72).await;
    let service = fx.booking_service();
    let ticket = service.book_ticket(&Principal::user("u-1"), fx.request("G1"), fx.now).await.unwrap();

    assert!(service.get_ticket(&Principal::user("u-1"), ticket.id).await.is_ok());
    assert!(service.get_ticket(&Principal::admin("ops"), ticket.id).await.is_ok());
    assert!(matches!(
        service.get_ticket(&Principal::user("u-2"), ticket.id).await,
        Err(BookingError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_cancel_releases_seat_for_rebooking() {
    let fx = fixture(1).await;
    let service = fx.booking_service();
    let user = Principal::user("u-1");

    let ticket = service.book_ticket(&user, fx.request("H1"), fx.now).await.unwrap();
    let cancelled = service.cancel_ticket(&user, ticket.id, fx.now).await.unwrap();

    assert_eq!(cancelled.status, TicketStatus::Cancelled);
    assert_eq!(cancelled.payment_status, TicketPaymentStatus::Failed);
    assert!(cancelled.cancelled_at.is_some());

    let seat = fx.store.get_seat(fx.compartment_id, "H1").await.unwrap().unwrap();
    assert!(seat.is_available);
    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 0);

    // Same seat, single-seat compartment: both were handed back
    let again = service.book_ticket(&Principal::user("u-2"), fx.request("H1"), fx.now).await.unwrap();
    assert_ne!(again.id, ticket.id);

    // A second cancel of the first ticket is a state error, not a double release
    assert!(matches!(
        service.cancel_ticket(&user, ticket.id, fx.now).await,
        Err(BookingError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_cancellation_window() {
    let fx = fixture(72).await;
    let service = fx.booking_service();
    let user = Principal::user("u-1");
    let ticket = service.book_ticket(&user, fx.request("J1"), fx.now).await.unwrap();

    let too_late = fx.departure_at - Duration::minutes(90);
    assert!(matches!(
        service.cancel_ticket(&user, ticket.id, too_late).await,
        Err(BookingError::CancellationWindowClosed { cutoff_hours: 2 })
    ));

    assert!(matches!(
        service.cancel_ticket(&Principal::user("u-2"), ticket.id, fx.now).await,
        Err(BookingError::Unauthorized(_))
    ));

    let stored = fx.store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Pending);
}
