use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_catalog::{CompartmentPricing, Route, RouteStop};
use rail_core::repository::CatalogRepository;
use rail_core::schedule::{CompartmentInstance, TrainSchedule};
use rail_core::{BookingError, BookingResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::rows::db_err;

/// Postgres-backed implementation of every booking repository.
#[derive(Clone)]
pub struct PgBookingStore {
    pub(crate) pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    train_id: Uuid,
    train_code: String,
    route_id: Uuid,
    departure_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct StopRow {
    station_id: Uuid,
    station_name: String,
    distance_from_start_km: i32,
}

#[derive(sqlx::FromRow)]
struct CompartmentRow {
    id: Uuid,
    train_id: Uuid,
    compartment_type_id: Uuid,
    label: String,
    total_seats: i32,
    pricing_model: String,
    price_minor: i64,
}

#[async_trait]
impl CatalogRepository for PgBookingStore {
    async fn get_schedule(&self, id: Uuid) -> BookingResult<Option<TrainSchedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.train_id, t.code AS train_code, s.route_id, s.departure_at
            FROM train_schedules s
            JOIN trains t ON t.id = s.train_id
            WHERE s.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| TrainSchedule {
            id: r.id,
            train_id: r.train_id,
            train_code: r.train_code,
            route_id: r.route_id,
            departure_at: r.departure_at,
        }))
    }

    async fn get_route(&self, id: Uuid) -> BookingResult<Option<Route>> {
        let rows: Vec<StopRow> = sqlx::query_as(
            r#"
            SELECT rs.station_id, st.name AS station_name, rs.distance_from_start_km
            FROM route_stops rs
            JOIN stations st ON st.id = rs.station_id
            WHERE rs.route_id = $1
            ORDER BY rs.distance_from_start_km
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let stops = rows
            .into_iter()
            .map(|r| RouteStop::new(r.station_id, &r.station_name, r.distance_from_start_km))
            .collect();

        Ok(Some(Route::new(id, stops).map_err(BookingError::from)?))
    }

    async fn find_compartment(
        &self,
        train_id: Uuid,
        compartment_type_id: Uuid,
    ) -> BookingResult<Option<CompartmentInstance>> {
        let row: Option<CompartmentRow> = sqlx::query_as(
            r#"
            SELECT id, train_id, compartment_type_id, label, total_seats, pricing_model, price_minor
            FROM compartment_instances
            WHERE train_id = $1 AND compartment_type_id = $2
            "#,
        )
        .bind(train_id)
        .bind(compartment_type_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| -> BookingResult<CompartmentInstance> {
            let pricing = CompartmentPricing::from_parts(&r.pricing_model, r.price_minor)?;
            Ok(CompartmentInstance {
                id: r.id,
                train_id: r.train_id,
                compartment_type_id: r.compartment_type_id,
                label: r.label,
                total_seats: r.total_seats,
                pricing,
            })
        })
        .transpose()
    }
}
