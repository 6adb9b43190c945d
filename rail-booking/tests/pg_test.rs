//! Concurrency checks against a real Postgres.
//!
//! Ignored by default. Point `DATABASE_URL` at a scratch database and run:
//! ```bash
//! DATABASE_URL=postgres://localhost/rail_test cargo test -p rail-booking --test pg_test -- --ignored
//! ```
//! Every test seeds its own stations, train and schedule under fresh codes, so
//! runs can share one database.

mod common;

use chrono::{DateTime, Duration, DurationRound, Utc};
use common::FakeGateway;
use rail_booking::{BookingConfig, BookingRequest, BookingService, CallbackUrls, PaymentOrchestrator, PaymentOutcome};
use rail_core::payment::TransactionStatus;
use rail_core::repository::{ExpiryOutcome, PaymentRepository, TicketRepository};
use rail_core::ticket::{Gender, Passenger, TicketStatus};
use rail_core::{BookingError, BookingStore, Principal};
use rail_store::{DbClient, PgBookingStore};
use std::sync::Arc;
use uuid::Uuid;

struct PgFixture {
    store: Arc<PgBookingStore>,
    schedule_id: Uuid,
    from: Uuid,
    to: Uuid,
    compartment_type_id: Uuid,
    compartment_id: Uuid,
    now: DateTime<Utc>,
}

impl PgFixture {
    fn dyn_store(&self) -> Arc<dyn BookingStore> {
        self.store.clone()
    }

    fn booking_service(&self) -> BookingService {
        BookingService::new(self.dyn_store(), BookingConfig::default())
    }

    fn orchestrator(&self, gateway: Arc<FakeGateway>) -> PaymentOrchestrator {
        PaymentOrchestrator::new(self.dyn_store(), gateway, CallbackUrls::under("http://rail.test"))
    }

    fn request(&self, seat_number: &str) -> BookingRequest {
        BookingRequest {
            schedule_id: self.schedule_id,
            from_station_id: self.from,
            to_station_id: self.to,
            compartment_id: self.compartment_type_id,
            seat_number: seat_number.to_string(),
            passenger: Passenger::new("Meera Iyer", 34, Gender::Female),
        }
    }
}

fn unique_code(prefix: &str) -> String {
    format!("{}{}", prefix, &Uuid::new_v4().simple().to_string()[..10])
}

/// Two-stop run of 1384 km at 1.50 per km, departing in two days.
async fn pg_fixture(total_seats: i32) -> PgFixture {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for Postgres tests");
    let db = DbClient::new(&url, 30).await.expect("connect");
    db.migrate().await.expect("migrate");
    let pool = db.pool.clone();

    // Postgres keeps microseconds
    let now = Utc::now().duration_trunc(Duration::microseconds(1)).unwrap();
    let (from, to) = (Uuid::new_v4(), Uuid::new_v4());
    for (id, name) in [(from, "New Delhi"), (to, "Mumbai Central")] {
        sqlx::query("INSERT INTO stations (id, name, code) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name)
            .bind(unique_code("ST"))
            .execute(&pool)
            .await
            .unwrap();
    }

    let route_id = Uuid::new_v4();
    sqlx::query("INSERT INTO routes (id, name) VALUES ($1, 'Delhi - Mumbai')")
        .bind(route_id)
        .execute(&pool)
        .await
        .unwrap();
    for (station_id, km) in [(from, 0), (to, 1384)] {
        sqlx::query(
            "INSERT INTO route_stops (id, route_id, station_id, distance_from_start_km) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(route_id)
        .bind(station_id)
        .bind(km)
        .execute(&pool)
        .await
        .unwrap();
    }

    let train_id = Uuid::new_v4();
    sqlx::query("INSERT INTO trains (id, code, name) VALUES ($1, $2, 'Rajdhani')")
        .bind(train_id)
        .bind(unique_code("RJ"))
        .execute(&pool)
        .await
        .unwrap();

    let compartment_type_id = Uuid::new_v4();
    sqlx::query("INSERT INTO compartment_types (id, name) VALUES ($1, $2)")
        .bind(compartment_type_id)
        .bind(unique_code("AC Chair "))
        .execute(&pool)
        .await
        .unwrap();

    let compartment_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO compartment_instances
            (id, train_id, compartment_type_id, label, total_seats, pricing_model, price_minor)
        VALUES ($1, $2, $3, 'C1', $4, 'PER_KILOMETRE', 150)
        "#,
    )
    .bind(compartment_id)
    .bind(train_id)
    .bind(compartment_type_id)
    .bind(total_seats)
    .execute(&pool)
    .await
    .unwrap();

    let schedule_id = Uuid::new_v4();
    sqlx::query("INSERT INTO train_schedules (id, train_id, route_id, departure_at) VALUES ($1, $2, $3, $4)")
        .bind(schedule_id)
        .bind(train_id)
        .bind(route_id)
        .bind(now + Duration::days(2))
        .execute(&pool)
        .await
        .unwrap();

    PgFixture {
        store: Arc::new(PgBookingStore::new(pool)),
        schedule_id,
        from,
        to,
        compartment_type_id,
        compartment_id,
        now,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_concurrent_bookings_for_one_seat() {
    let fx = pg_fixture(72).await;
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
            Err(BookingError::SeatAlreadyBooked { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(booked, 1);
    assert_eq!(conflicts, 19);
    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_capacity_rejects_exactly_one_over() {
    let fx = pg_fixture(4).await;
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
            Err(BookingError::CapacityExceeded { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(rejected, 1);
    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, 4);
    assert_eq!(ledger.total_seats, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_concurrent_initiations_open_one_transaction() {
    let fx = pg_fixture(72).await;
    let orchestrator = Arc::new(fx.orchestrator(FakeGateway::new()));
    let user = Principal::user("u-1");
    let ticket = fx.booking_service().book_ticket(&user, fx.request("P1"), fx.now).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = orchestrator.clone();
        let user = user.clone();
        let (ticket_id, now) = (ticket.id, fx.now);
        handles.push(tokio::spawn(async move { orchestrator.initiate_payment(&user, ticket_id, now).await }));
    }

    let mut opened = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(BookingError::InvalidState(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(opened, 1);
    assert_eq!(fx.store.transactions_for_ticket(ticket.id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_payment_and_expiry_race_has_one_winner() {
    let fx = pg_fixture(72).await;

    for round in 0..10 {
        let gateway = FakeGateway::new();
        let orchestrator = Arc::new(fx.orchestrator(gateway.clone()));
        let user = Principal::user("u-1");
        let seat = format!("R{}", round);
        let ticket = fx.booking_service().book_ticket(&user, fx.request(&seat), fx.now).await.unwrap();
        let session = orchestrator.initiate_payment(&user, ticket.id, fx.now).await.unwrap();
        gateway.approve("VAL-R", session.transaction_id, 207_600);

        // Past the deadline, before the sweep has reached the ticket
        let at = ticket.expires_at + Duration::seconds(30);
        let store = fx.store.clone();
        let payer = orchestrator.clone();
        let (ticket_id, txn_id) = (ticket.id, session.transaction_id);

        let (paid, expired) = tokio::join!(
            tokio::spawn(async move { payer.handle_success(txn_id, "VAL-R", at).await }),
            tokio::spawn(async move { store.expire_ticket(ticket_id, at).await }),
        );
        let paid = paid.unwrap();
        let expired = expired.unwrap().unwrap();

        let ticket = fx.store.get_ticket(ticket_id).await.unwrap().unwrap();
        let txn = fx.store.get_transaction(txn_id).await.unwrap().unwrap();

        match ticket.status {
            TicketStatus::Confirmed => {
                assert!(matches!(paid, Ok(PaymentOutcome::Completed(_))));
                assert!(matches!(expired, ExpiryOutcome::Skipped));
                assert_eq!(txn.status, TransactionStatus::Completed);
            }
            TicketStatus::Expired => {
                assert!(matches!(paid, Err(BookingError::InvalidState(_))));
                assert!(matches!(expired, ExpiryOutcome::Expired { cancelled_transactions: 1, .. }));
                assert_eq!(txn.status, TransactionStatus::Cancelled);
            }
            other => panic!("ticket ended {}", other),
        }
    }

    // Expired holds gave their capacity back; confirmed ones kept it
    let confirmed = {
        let mut n = 0;
        for round in 0..10 {
            let seat = fx.store.get_seat(fx.compartment_id, &format!("R{}", round)).await.unwrap();
            if seat.map(|s| !s.is_available).unwrap_or(false) {
                n += 1;
            }
        }
        n
    };
    let ledger = fx.store.ledger_snapshot(fx.schedule_id, fx.compartment_id).await.unwrap().unwrap();
    assert_eq!(ledger.booked_seats, confirmed);
}
