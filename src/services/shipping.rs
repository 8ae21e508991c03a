//! Transportation-tier shipping cost model.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::AppConfig;
use crate::models::{round_money, CartLine, QuoteConfidence, TransportationTier};
use crate::services::cart;

/// A priced shipping charge together with how much to trust it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingCharge {
    pub amount: Decimal,
    pub confidence: QuoteConfidence,
}

/// Maps cart composition and distance to a shipping cost.
///
/// The whole order is priced at the highest tier any line requires; an order
/// is never split into per-vehicle shipments.
#[derive(Debug, Clone)]
pub struct ShippingPricer {
    per_km_rate: Decimal,
    bike_base_fee: Decimal,
    motorbike_base_fee: Decimal,
    car_base_fee: Decimal,
    fallback_rate: Decimal,
}

impl Default for ShippingPricer {
    fn default() -> Self {
        Self {
            per_km_rate: dec!(5),
            bike_base_fee: dec!(30),
            motorbike_base_fee: dec!(50),
            car_base_fee: dec!(70),
            fallback_rate: dec!(0.10),
        }
    }
}

impl ShippingPricer {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            per_km_rate: config.per_km_rate,
            bike_base_fee: config.bike_base_fee,
            motorbike_base_fee: config.motorbike_base_fee,
            car_base_fee: config.car_base_fee,
            fallback_rate: config.fallback_rate,
        }
    }

    /// The tier the whole order must be delivered at: the maximum tier any
    /// line requests. `None` for an empty cart or a cart with no tagged
    /// lines.
    pub fn required_tier(cart: &[CartLine]) -> Option<TransportationTier> {
        cart.iter().filter_map(|line| line.transportation_type).max()
    }

    /// Base fee for a tier; an unrecognised or missing tier is charged the
    /// motorbike fee.
    pub fn base_fee(&self, tier: Option<TransportationTier>) -> Decimal {
        match tier {
            Some(TransportationTier::Bike) => self.bike_base_fee,
            Some(TransportationTier::Motorbike) => self.motorbike_base_fee,
            Some(TransportationTier::Car) => self.car_base_fee,
            None => self.motorbike_base_fee,
        }
    }

    /// Prices the shipment. A known distance yields `base + distance × rate`
    /// at full confidence; an unknown distance falls back to a flat share of
    /// the subtotal at degraded confidence.
    pub fn price(&self, lines: &[CartLine], distance_km: Option<f64>) -> ShippingCharge {
        match distance_km {
            Some(distance) => {
                let base = self.base_fee(Self::required_tier(lines));
                let distance = Decimal::from_f64(distance).unwrap_or(Decimal::ZERO);
                ShippingCharge {
                    amount: round_money(base + distance * self.per_km_rate),
                    confidence: QuoteConfidence::Resolved,
                }
            }
            None => ShippingCharge {
                amount: round_money(cart::subtotal(lines) * self.fallback_rate),
                confidence: QuoteConfidence::Fallback,
            },
        }
    }
}
