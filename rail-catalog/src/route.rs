use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::CatalogError;

/// A station on a route together with its cumulative distance from the origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteStop {
    pub station_id: Uuid,
    pub station_name: String,
    pub distance_from_start_km: i32,
}

impl RouteStop {
    pub fn new(station_id: Uuid, station_name: &str, distance_from_start_km: i32) -> Self {
        Self {
            station_id,
            station_name: station_name.to_string(),
            distance_from_start_km,
        }
    }
}

/// The travelled part of a route between two of its stations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub from_station_id: Uuid,
    pub from_station_name: String,
    pub to_station_id: Uuid,
    pub to_station_name: String,
    pub distance_km: i32,
}

/// Ordered station sequence. Distances strictly increase along the stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    stops: Vec<RouteStop>,
}

impl Route {
    /// Build a route from stops already sorted by distance.
    ///
    /// Rejects routes with fewer than two stops, a negative distance, a station visited
    /// twice, or distances that do not strictly increase.
    pub fn new(id: Uuid, stops: Vec<RouteStop>) -> Result<Self, CatalogError> {
        if stops.len() < 2 {
            return Err(CatalogError::InvalidRoute(format!(
                "route {} has {} stop(s), at least 2 required",
                id,
                stops.len()
            )));
        }

        if stops[0].distance_from_start_km < 0 {
            return Err(CatalogError::InvalidRoute(format!(
                "route {} starts at a negative distance",
                id
            )));
        }

        let mut seen = HashSet::new();
        for stop in &stops {
            if !seen.insert(stop.station_id) {
                return Err(CatalogError::InvalidRoute(format!(
                    "station {} appears more than once on route {}",
                    stop.station_id, id
                )));
            }
        }

        for pair in stops.windows(2) {
            if pair[1].distance_from_start_km <= pair[0].distance_from_start_km {
                return Err(CatalogError::InvalidRoute(format!(
                    "distance to {} ({} km) does not exceed distance to {} ({} km)",
                    pair[1].station_name,
                    pair[1].distance_from_start_km,
                    pair[0].station_name,
                    pair[0].distance_from_start_km
                )));
            }
        }

        Ok(Self { id, stops })
    }

    pub fn stops(&self) -> &[RouteStop] {
        &self.stops
    }

    pub fn stop(&self, station_id: Uuid) -> Option<&RouteStop> {
        self.stops.iter().find(|s| s.station_id == station_id)
    }

    pub fn total_distance_km(&self) -> i32 {
        let first = self.stops.first().map(|s| s.distance_from_start_km).unwrap_or(0);
        let last = self.stops.last().map(|s| s.distance_from_start_km).unwrap_or(0);
        last - first
    }

    /// Resolve a `(from, to)` pair into a segment.
    ///
    /// Direction is decided by cumulative distance: `to` must lie strictly further
    /// along the route than `from`.
    pub fn segment(&self, from_station_id: Uuid, to_station_id: Uuid) -> Result<Segment, CatalogError> {
        let from = self.stop(from_station_id).ok_or_else(|| {
            CatalogError::InvalidSegment(format!("station {} is not on route {}", from_station_id, self.id))
        })?;
        let to = self.stop(to_station_id).ok_or_else(|| {
            CatalogError::InvalidSegment(format!("station {} is not on route {}", to_station_id, self.id))
        })?;

        if to.distance_from_start_km <= from.distance_from_start_km {
            return Err(CatalogError::InvalidSegment(format!(
                "{} does not come after {} on route {}",
                to.station_name, from.station_name, self.id
            )));
        }

        Ok(Segment {
            from_station_id: from.station_id,
            from_station_name: from.station_name.clone(),
            to_station_id: to.station_id,
            to_station_name: to.station_name.clone(),
            distance_km: to.distance_from_start_km - from.distance_from_start_km,
        })
    }
}
