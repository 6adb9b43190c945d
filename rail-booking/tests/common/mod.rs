#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rail_booking::{BookingConfig, BookingRequest, BookingService, CallbackUrls, PaymentOrchestrator, ReclamationSweep};
use rail_catalog::{CompartmentPricing, Route, RouteStop};
use rail_core::payment::{
    GatewayError, GatewaySession, PaymentGateway, SessionRequest, ValidatedPayment, ValidationStatus,
};
use rail_core::schedule::{CompartmentInstance, TrainSchedule};
use rail_core::ticket::{Gender, Passenger};
use rail_core::BookingStore;
use rail_store::InMemoryStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub schedule_id: Uuid,
    pub train_id: Uuid,
    pub delhi: Uuid,
    pub kota: Uuid,
    pub mumbai: Uuid,
    pub compartment_type_id: Uuid,
    pub compartment_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl Fixture {
    pub fn dyn_store(&self) -> Arc<dyn BookingStore> {
        self.store.clone()
    }

    pub fn booking_service(&self) -> BookingService {
        BookingService::new(self.dyn_store(), BookingConfig::default())
    }

    pub fn orchestrator(&self, gateway: Arc<FakeGateway>) -> PaymentOrchestrator {
        PaymentOrchestrator::new(self.dyn_store(), gateway, CallbackUrls::under("http://rail.test"))
    }

    pub fn sweep(&self) -> ReclamationSweep {
        ReclamationSweep::new(self.dyn_store(), 100)
    }

    /// Delhi to Mumbai in the fixture's compartment.
    pub fn request(&self, seat_number: &str) -> BookingRequest {
        BookingRequest {
            schedule_id: self.schedule_id,
            from_station_id: self.delhi,
            to_station_id: self.mumbai,
            compartment_id: self.compartment_type_id,
            seat_number: seat_number.to_string(),
            passenger: Passenger::new("Meera Iyer", 34, Gender::Female),
        }
    }
}

/// Rajdhani-style run: Delhi (0 km), Kota (465 km), Mumbai (1384 km), at
/// 1.50 per km, departing two days after `now`.
pub async fn fixture(total_seats: i32) -> Fixture {
    let store = Arc::new(InMemoryStore::new());

    let delhi = Uuid::new_v4();
    let kota = Uuid::new_v4();
    let mumbai = Uuid::new_v4();
    let route = Route::new(
        Uuid::new_v4(),
        vec![
            RouteStop::new(delhi, "New Delhi", 0),
            RouteStop::new(kota, "Kota Junction", 465),
            RouteStop::new(mumbai, "Mumbai Central", 1384),
        ],
    )
    .unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
    let departure_at = now + Duration::days(2);

    let train_id = Uuid::new_v4();
    let schedule = TrainSchedule {
        id: Uuid::new_v4(),
        train_id,
        train_code: "RJ701".to_string(),
        route_id: route.id,
        departure_at,
    };

    let compartment_type_id = Uuid::new_v4();
    let compartment = CompartmentInstance {
        id: Uuid::new_v4(),
        train_id,
        compartment_type_id,
        label: "AC Chair".to_string(),
        total_seats,
        pricing: CompartmentPricing::PerKilometre { rate_minor: 150 },
    };

    let fixture = Fixture {
        store: store.clone(),
        schedule_id: schedule.id,
        train_id,
        delhi,
        kota,
        mumbai,
        compartment_type_id,
        compartment_id: compartment.id,
        departure_at,
        now,
    };

    store.add_route(route).await;
    store.add_schedule(schedule).await;
    store.add_compartment(compartment).await;

    fixture
}

/// Scripted gateway. Validation ids answer with whatever was registered
/// through `approve` / `respond`; unknown ids come back invalid.
#[derive(Default)]
pub struct FakeGateway {
    validations: Mutex<HashMap<String, ValidatedPayment>>,
    pub reject_sessions: AtomicBool,
    pub session_calls: AtomicUsize,
    pub validate_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, validation_id: &str, status: ValidationStatus, transaction_id: Uuid, amount_minor: i64) {
        self.validations.lock().unwrap().insert(
            validation_id.to_string(),
            ValidatedPayment {
                status,
                validation_id: validation_id.to_string(),
                transaction_id: Some(transaction_id),
                amount_minor: Some(amount_minor),
                currency: Some("BDT".to_string()),
                bank_transaction_id: Some(format!("BANK-{}", validation_id)),
                card_type: Some("VISA-Dutch Bangla".to_string()),
                card_brand: Some("VISA".to_string()),
            },
        );
    }

    pub fn approve(&self, validation_id: &str, transaction_id: Uuid, amount_minor: i64) {
        self.respond(validation_id, ValidationStatus::Valid, transaction_id, amount_minor);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<GatewaySession, GatewayError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_sessions.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("Store Credential Error".to_string()));
        }
        Ok(GatewaySession {
            session_key: format!("SESSION-{}", request.transaction_id.simple()),
            gateway_url: format!("https://gateway.test/pay/{}", request.transaction_id),
        })
    }

    async fn validate(&self, validation_id: &str) -> Result<ValidatedPayment, GatewayError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .validations
            .lock()
            .unwrap()
            .get(validation_id)
            .cloned()
            .unwrap_or(ValidatedPayment {
                status: ValidationStatus::Invalid,
                validation_id: validation_id.to_string(),
                transaction_id: None,
                amount_minor: None,
                currency: None,
                bank_transaction_id: None,
                card_type: None,
                card_brand: None,
            }))
    }
}
