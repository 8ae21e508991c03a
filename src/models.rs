use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Rounds a monetary value to 2 decimal places, midpoint away from zero.
///
/// Applied at every boundary crossing (computation, publication, submission)
/// so floating-point drift never accumulates across repeated renders.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Required delivery vehicle class, ordered by escalation.
///
/// The derived ordering is the pricing escalation: `Bike < Motorbike < Car`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportationTier {
    Bike,
    Motorbike,
    Car,
}

/// Shop reference as it arrives from the cart: either a raw identifier or an
/// embedded shop object. Normalised to a canonical id string before grouping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ShopRef {
    Id(String),
    Embedded(EmbeddedShop),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedShop {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ShopRef {
    /// Canonical shop id, or `None` when the reference is absent or blank.
    pub fn canonical_id(&self) -> Option<&str> {
        let id = match self {
            ShopRef::Id(id) => id.as_str(),
            ShopRef::Embedded(shop) => shop.id.as_str(),
        };
        let id = id.trim();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }
}

/// One line of the shopping cart. Owned by the cart/session state; read-only
/// to this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    #[serde(rename = "shopId", default, skip_serializing_if = "Option::is_none")]
    pub shop: Option<ShopRef>,
    pub quantity: u32,
    pub unit_discount_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transportation_type: Option<TransportationTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_color: Option<String>,
    #[serde(default)]
    pub is_event: bool,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_discount_price * Decimal::from(self.quantity)
    }
}

/// Free-text delivery address, alive for the duration of the checkout
/// session. Never persisted by this crate itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub country: String,
    pub city: String,
    pub address_line: String,
    pub phone_number: String,
}

impl Address {
    /// All three location fields present — enough to attempt geocoding.
    pub fn is_complete(&self) -> bool {
        !self.country.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.address_line.trim().is_empty()
    }

    /// Complete and with a phone number — enough to submit an order.
    pub fn is_submittable(&self) -> bool {
        self.is_complete() && !self.phone_number.trim().is_empty()
    }

    /// The query string sent to the geocoding service.
    pub fn geocode_query(&self) -> String {
        format!("{}, {}, {}", self.address_line, self.city, self.country)
    }
}

/// A geographic coordinate pair. Produced only by the geocoding boundary;
/// construction is checked so non-finite or out-of-range values never enter
/// the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}

/// One match from the geocoding service, as it appears on the wire.
/// `lat`/`lon` arrive as strings and are parsed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub lat: String,
    pub lon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<serde_json::Value>,
}

impl GeocodeHit {
    /// Parses and range-checks the coordinate pair. `None` means the service
    /// returned something malformed and the caller should fall back.
    pub fn coordinates(&self) -> Option<Coordinates> {
        let latitude = self.lat.trim().parse::<f64>().ok()?;
        let longitude = self.lon.trim().parse::<f64>().ok()?;
        Coordinates::checked(latitude, longitude)
    }
}

/// One match from the reverse-geocoding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseGeocodeHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<serde_json::Value>,
}

/// Address-field prefill derived from the device's reported position.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DeviceAddress {
    pub country: Option<String>,
    pub city: Option<String>,
    pub address_line: Option<String>,
}

/// How much trust to place in a shipping quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteConfidence {
    /// Priced from a resolved coordinate and a real distance.
    Resolved,
    /// Degraded flat-percentage estimate; the address did not resolve.
    Fallback,
}

/// Why a quote settled in degraded mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteFallbackReason {
    EmptyCart,
    IncompleteAddress,
    AddressNotFound,
    CoordinatesInvalid,
    GeocodeFailed,
}

impl QuoteFallbackReason {
    /// The notice shown to the shopper for this outcome.
    pub fn notice(&self) -> &'static str {
        match self {
            Self::EmptyCart => "Your cart is empty",
            Self::IncompleteAddress => "Please fill in country, city and address",
            Self::AddressNotFound => "We could not find that address",
            Self::CoordinatesInvalid => "The address resolved to an invalid location",
            Self::GeocodeFailed => "Address lookup is temporarily unavailable",
        }
    }
}

/// The live shipping estimate shown during address entry. Exactly one quote
/// is live at a time; a newer resolution replaces it wholesale.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShippingQuote {
    pub amount_owed: Decimal,
    pub distance_km: Option<f64>,
    pub route: Vec<Coordinates>,
    pub confidence: QuoteConfidence,
    pub computed_at: DateTime<Utc>,
}

/// A successfully validated coupon, held until replaced or cleared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: String,
    pub name: String,
    pub percent_value: Decimal,
    pub discount_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_shop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_product_id: Option<String>,
}

/// Per-shop view of the cart: the shop's lines and their subtotal.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ShopBreakdown {
    pub subtotal: Decimal,
    pub lines: Vec<CartLine>,
}

/// The finalized order payload, created once at submission time and staged
/// for the payment step. Field names are the committed contract the
/// downstream order-creation collaborator depends on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDraft {
    pub cart: Vec<CartLine>,
    #[serde(rename = "subTotalPrice")]
    pub sub_total_price: Decimal,
    pub shipping: Decimal,
    #[serde(rename = "discountPrice")]
    pub discount_price: Decimal,
    #[serde(rename = "totalPrice")]
    pub total_price: Decimal,
    #[serde(rename = "shippingAddress")]
    pub shipping_address: Address,
    pub user: serde_json::Value,
    #[serde(rename = "couponCode", skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(rename = "couponData", skip_serializing_if = "Option::is_none")]
    pub coupon_data: Option<AppliedCoupon>,
    #[serde(rename = "transportationType")]
    pub transportation_type: Option<TransportationTier>,
    pub timestamp: DateTime<Utc>,
}
