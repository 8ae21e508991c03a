#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wiremock::MockServer;

use storefront_checkout::config::AppConfig;
use storefront_checkout::events::Event;
use storefront_checkout::models::{Address, CartLine, ShopRef, TransportationTier};
use storefront_checkout::services::distance::EARTH_RADIUS_KM;
use storefront_checkout::services::orders::AddressBook;
use storefront_checkout::Checkout;

pub const TEST_DEBOUNCE_MS: u64 = 60;
pub const TEST_COOLDOWN_MS: u64 = 200;

/// A checkout session wired against a wiremock collaborator, with the
/// warehouse origin pinned to (0, 0) so test distances are easy to state.
pub struct TestCheckout {
    pub server: MockServer,
    pub checkout: Checkout,
    pub events: mpsc::Receiver<Event>,
}

pub fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        geocode_base_url: base_url.to_string(),
        coupon_base_url: base_url.to_string(),
        debounce_ms: TEST_DEBOUNCE_MS,
        submit_cooldown_ms: TEST_COOLDOWN_MS,
        geocode_backoff_ms: 10,
        geocode_timeout_secs: 2,
        warehouse_latitude: 0.0,
        warehouse_longitude: 0.0,
        ..AppConfig::default()
    }
}

pub async fn start(address_book: Option<Arc<dyn AddressBook>>) -> TestCheckout {
    let server = MockServer::start().await;
    let (checkout, events) = Checkout::new(test_config(&server.uri()), address_book)
        .expect("failed to wire up checkout session");
    TestCheckout {
        server,
        checkout,
        events,
    }
}

/// Like [`start`], but lets the test adjust the config before wiring.
pub async fn start_with(
    address_book: Option<Arc<dyn AddressBook>>,
    tweak: impl FnOnce(&mut AppConfig),
) -> TestCheckout {
    let server = MockServer::start().await;
    let mut config = test_config(&server.uri());
    tweak(&mut config);
    let (checkout, events) =
        Checkout::new(config, address_book).expect("failed to wire up checkout session");
    TestCheckout {
        server,
        checkout,
        events,
    }
}

pub fn line(
    product: &str,
    shop: &str,
    qty: u32,
    price: Decimal,
    tier: Option<TransportationTier>,
) -> CartLine {
    CartLine {
        product_id: product.to_string(),
        shop: Some(ShopRef::Id(shop.to_string())),
        quantity: qty,
        unit_discount_price: price,
        transportation_type: tier,
        variant_size: None,
        variant_color: None,
        is_event: false,
    }
}

/// The §8 reference cart: 2 × 100.00 at motorbike tier.
pub fn motorbike_cart() -> Vec<CartLine> {
    vec![line(
        "p1",
        "s1",
        2,
        Decimal::from(100),
        Some(TransportationTier::Motorbike),
    )]
}

pub fn delivery_address() -> Address {
    Address {
        country: "Vietnam".to_string(),
        city: "Ho Chi Minh City".to_string(),
        address_line: "12 Nguyen Hue".to_string(),
        phone_number: "0901234567".to_string(),
    }
}

/// Latitude (on the prime meridian) exactly `km` kilometres from the
/// (0, 0) warehouse origin.
pub fn latitude_for_km(km: f64) -> f64 {
    (km / EARTH_RADIUS_KM).to_degrees()
}

/// Geocode response body placing the address `km` kilometres due north of
/// the warehouse.
pub fn geocode_hits_at_km(km: f64) -> serde_json::Value {
    json!([{
        "lat": latitude_for_km(km).to_string(),
        "lon": "0.0",
        "display_name": "12 Nguyen Hue, Ho Chi Minh City, Vietnam",
        "address": {"country": "Vietnam", "city": "Ho Chi Minh City"}
    }])
}

pub async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for a checkout event")
        .expect("event channel closed")
}
