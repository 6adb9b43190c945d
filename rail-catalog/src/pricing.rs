use serde::{Deserialize, Serialize};

use crate::{CatalogError, Segment};

/// How a compartment turns a travelled distance into a fare.
///
/// Amounts are in minor currency units (paisa, cents).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "model", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompartmentPricing {
    /// Fare grows linearly with distance.
    PerKilometre { rate_minor: i64 },
    /// Same fare for any segment.
    Flat { amount_minor: i64 },
}

impl CompartmentPricing {
    pub fn price_minor(&self) -> i64 {
        match self {
            CompartmentPricing::PerKilometre { rate_minor } => *rate_minor,
            CompartmentPricing::Flat { amount_minor } => *amount_minor,
        }
    }

    /// Rebuild a pricing model from its stored `(model, price)` columns.
    pub fn from_parts(model: &str, price_minor: i64) -> Result<Self, CatalogError> {
        let pricing = match model {
            "PER_KILOMETRE" => CompartmentPricing::PerKilometre { rate_minor: price_minor },
            "FLAT" => CompartmentPricing::Flat { amount_minor: price_minor },
            other => return Err(CatalogError::InvalidPricing(format!("unknown pricing model {}", other))),
        };
        if price_minor <= 0 {
            return Err(CatalogError::InvalidPricing(format!("{} price must be positive", model)));
        }
        Ok(pricing)
    }

    pub fn fare_for(&self, distance_km: i32) -> Result<i64, CatalogError> {
        if distance_km <= 0 {
            return Err(CatalogError::InvalidSegment(format!(
                "segment distance must be positive, got {} km",
                distance_km
            )));
        }

        let fare = match self {
            CompartmentPricing::PerKilometre { rate_minor } => (distance_km as i64)
                .checked_mul(*rate_minor)
                .ok_or_else(|| CatalogError::InvalidPricing("fare overflow".to_string()))?,
            CompartmentPricing::Flat { amount_minor } => *amount_minor,
        };

        if fare <= 0 {
            return Err(CatalogError::InvalidPricing(format!("non-positive fare {}", fare)));
        }
        Ok(fare)
    }
}

/// Price for travelling a segment in a given compartment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareQuote {
    pub segment: Segment,
    pub pricing: CompartmentPricing,
    pub amount_minor: i64,
    pub currency: String,
}

impl FareQuote {
    pub fn new(segment: Segment, pricing: CompartmentPricing, currency: &str) -> Result<Self, CatalogError> {
        let amount_minor = pricing.fare_for(segment.distance_km)?;
        Ok(Self {
            segment,
            pricing,
            amount_minor,
            currency: currency.to_string(),
        })
    }

    pub fn display_amount(&self) -> String {
        format_major(self.amount_minor)
    }
}

/// `207600` -> `"2076.00"`
pub fn format_major(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// `"2076.00"` -> `207600`. Accepts at most two decimals.
pub fn parse_major(amount: &str) -> Option<i64> {
    let amount = amount.trim();
    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() || fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    if whole < 0 {
        return None;
    }
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(cents)
}
