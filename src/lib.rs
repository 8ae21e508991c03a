//! Storefront checkout pipeline
//!
//! Shipping-cost estimation and order preparation for the storefront:
//! debounced address-to-coordinates resolution, tier-aware shipping pricing
//! over geodesic distance, coupon discount eligibility, and guarded order
//! assembly with a staged, read-once order draft.
//!
//! The rendering layer is a pure consumer of the state published here: it
//! subscribes to quote updates and notification events, and calls the
//! operation methods. All sequencing — debouncing, stale-result
//! suppression, submission locking — lives inside the service objects.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;
pub mod staging;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::ShippingQuote;
use crate::services::coupons::CouponEngine;
use crate::services::geocoding::GeocodingService;
use crate::services::orders::{AddressBook, OrderAssembler};
use crate::services::quote_engine::AddressQuoteEngine;
use crate::staging::OrderStaging;

/// One shopper's checkout session: the wired-up pipeline plus the staging
/// slot the payment step consumes.
///
/// All mutable state is owned by this object's services and scoped to the
/// session; [`Checkout::teardown`] cancels pending work and discards any
/// staged draft.
pub struct Checkout {
    config: Arc<AppConfig>,
    session_id: String,
    geocoder: Arc<GeocodingService>,
    quote_engine: AddressQuoteEngine,
    coupons: CouponEngine,
    orders: OrderAssembler,
    staging: Arc<OrderStaging>,
}

impl Checkout {
    /// Wires up the pipeline. Returns the session object and the receiving
    /// half of the notification channel for the rendering layer.
    pub fn new(
        config: AppConfig,
        address_book: Option<Arc<dyn AddressBook>>,
    ) -> Result<(Self, mpsc::Receiver<Event>), ServiceError> {
        let config = Arc::new(config);
        let session_id = Uuid::new_v4().to_string();
        let (events, event_rx) = EventSender::channel();

        let geocoder = Arc::new(GeocodingService::from_config(&config)?);
        let staging = Arc::new(OrderStaging::new());

        let quote_engine =
            AddressQuoteEngine::new(Arc::clone(&geocoder), &config, events.clone());
        let coupons = CouponEngine::from_config(&config, events.clone())?;
        let orders = OrderAssembler::new(
            Arc::clone(&geocoder),
            &config,
            Arc::clone(&staging),
            events,
            session_id.clone(),
            address_book,
        );

        Ok((
            Self {
                config,
                session_id,
                geocoder,
                quote_engine,
                coupons,
                orders,
                staging,
            },
            event_rx,
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The geocoding client, for address prefill from the device position.
    pub fn geocoder(&self) -> &GeocodingService {
        &self.geocoder
    }

    pub fn quote_engine(&self) -> &AddressQuoteEngine {
        &self.quote_engine
    }

    pub fn coupons(&self) -> &CouponEngine {
        &self.coupons
    }

    pub fn orders(&self) -> &OrderAssembler {
        &self.orders
    }

    /// The staging handoff the payment step takes the order draft from.
    pub fn staging(&self) -> &Arc<OrderStaging> {
        &self.staging
    }

    /// Live quote subscription for the rendering layer.
    pub fn subscribe_quotes(&self) -> watch::Receiver<Option<ShippingQuote>> {
        self.quote_engine.subscribe()
    }

    /// Ends the session: cancels pending quote work and discards any staged
    /// draft. Call when the shopper navigates away from checkout.
    pub fn teardown(&self) {
        self.quote_engine.shutdown();
        self.staging.clear(&self.session_id);
    }
}
