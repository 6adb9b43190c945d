use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::CatalogError;

/// Capacity counter for one compartment on one schedule.
///
/// Invariant: `0 <= booked_seats <= total_seats`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub booked_seats: i32,
    pub total_seats: i32,
}

impl LedgerEntry {
    pub fn seeded(total_seats: i32) -> Self {
        Self {
            booked_seats: 0,
            total_seats,
        }
    }

    pub fn remaining(&self) -> i32 {
        self.total_seats - self.booked_seats
    }

    /// Take one seat. Leaves the entry untouched when full.
    pub fn reserve(&mut self) -> Result<(), CatalogError> {
        if self.booked_seats >= self.total_seats {
            return Err(CatalogError::CapacityExceeded {
                booked: self.booked_seats,
                total: self.total_seats,
            });
        }
        self.booked_seats += 1;
        Ok(())
    }

    /// Hand one seat back. Returns `false` and leaves the entry untouched when
    /// nothing is booked: a decrement was lost or doubled somewhere.
    pub fn release(&mut self) -> bool {
        if self.booked_seats <= 0 {
            return false;
        }
        self.booked_seats -= 1;
        true
    }
}

/// Ledger keyed by `(schedule, compartment)`, for callers that keep state in memory.
#[derive(Debug, Clone, Default)]
pub struct SeatLedger {
    entries: HashMap<(Uuid, Uuid), LedgerEntry>,
}

impl SeatLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, schedule_id: Uuid, compartment_id: Uuid) -> Option<&LedgerEntry> {
        self.entries.get(&(schedule_id, compartment_id))
    }

    /// Reserve a seat, creating the entry from `total_seats` on first use.
    pub fn reserve(&mut self, schedule_id: Uuid, compartment_id: Uuid, total_seats: i32) -> Result<LedgerEntry, CatalogError> {
        let entry = self
            .entries
            .entry((schedule_id, compartment_id))
            .or_insert_with(|| LedgerEntry::seeded(total_seats));
        entry.reserve()?;
        Ok(*entry)
    }

    /// Release one seat; underflow is reported rather than clamped.
    pub fn release(&mut self, schedule_id: Uuid, compartment_id: Uuid) -> Result<LedgerEntry, CatalogError> {
        if let Some(entry) = self.entries.get_mut(&(schedule_id, compartment_id)) {
            if entry.release() {
                return Ok(*entry);
            }
        }
        Err(CatalogError::LedgerUnderflow {
            schedule_id,
            compartment_id,
        })
    }

    /// Overwrite an entry. Used when loading or repairing state.
    pub fn set(&mut self, schedule_id: Uuid, compartment_id: Uuid, entry: LedgerEntry) {
        self.entries.insert((schedule_id, compartment_id), entry);
    }
}
