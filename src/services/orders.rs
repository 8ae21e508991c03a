//! Guarded order assembly and staging for the payment step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    round_money, Address, AppliedCoupon, CartLine, Coordinates, GeocodeHit, OrderDraft,
};
use crate::services::cart;
use crate::services::distance::great_circle_km;
use crate::services::geocoding::GeocodingService;
use crate::services::shipping::ShippingPricer;
use crate::staging::OrderStaging;

/// External collaborator persisting a shopper's default address.
/// Invoked fire-and-forget: its failure never blocks order submission.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn save_default_address(&self, address: Address) -> Result<(), ServiceError>;
}

/// Everything an order submission needs, captured at the moment the shopper
/// confirms.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub cart: Vec<CartLine>,
    pub address: Address,
    /// Opaque session/user payload forwarded into the order contract.
    pub user: serde_json::Value,
    pub coupon: Option<AppliedCoupon>,
    /// Persist this address as the shopper's default after submission.
    pub save_address: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Holds the at-most-one-concurrent-submission slot. Dropping the slot — on
/// success, validation failure, or an unexpected error — records the
/// completion time and releases the flag, so a stuck "submitting" state
/// cannot leak.
struct SubmissionSlot {
    flag: Arc<AtomicBool>,
    finished: Arc<Mutex<Option<Instant>>>,
}

impl Drop for SubmissionSlot {
    fn drop(&mut self) {
        *lock(&self.finished) = Some(Instant::now());
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Builds the final, immutable order payload on explicit submission.
///
/// The address is re-resolved independently of the live quote — the quote
/// may be stale relative to the submit moment — and every guard
/// short-circuits with its own user-facing message.
pub struct OrderAssembler {
    geocoder: Arc<GeocodingService>,
    pricer: ShippingPricer,
    origin: Coordinates,
    cooldown: Duration,
    staging: Arc<OrderStaging>,
    events: EventSender,
    address_book: Option<Arc<dyn AddressBook>>,
    session_id: String,
    submitting: Arc<AtomicBool>,
    last_completed: Arc<Mutex<Option<Instant>>>,
}

impl OrderAssembler {
    pub fn new(
        geocoder: Arc<GeocodingService>,
        config: &AppConfig,
        staging: Arc<OrderStaging>,
        events: EventSender,
        session_id: impl Into<String>,
        address_book: Option<Arc<dyn AddressBook>>,
    ) -> Self {
        Self {
            geocoder,
            pricer: ShippingPricer::from_config(config),
            origin: config.warehouse_origin(),
            cooldown: config.submit_cooldown(),
            staging,
            events,
            address_book,
            session_id: session_id.into(),
            submitting: Arc::new(AtomicBool::new(false)),
            last_completed: Arc::new(Mutex::new(None)),
        }
    }

    /// Validates the checkout state and assembles the order draft.
    ///
    /// Guards run in order, each with a distinct rejection: duplicate
    /// submission, unresolvable address, empty cart, missing fields,
    /// non-positive shipping. On success the draft is staged for the
    /// payment step and returned.
    #[instrument(skip(self, request))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<OrderDraft, ServiceError> {
        let _slot = self.acquire_submission_slot()?;
        self.submit_inner(request).await
    }

    fn acquire_submission_slot(&self) -> Result<SubmissionSlot, ServiceError> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ServiceError::InvalidOperation(
                "An order submission is already in progress".to_string(),
            ));
        }

        let within_cooldown = lock(&self.last_completed)
            .map(|finished| finished.elapsed() < self.cooldown)
            .unwrap_or(false);
        if within_cooldown {
            self.submitting.store(false, Ordering::SeqCst);
            return Err(ServiceError::InvalidOperation(
                "Please wait a moment before submitting again".to_string(),
            ));
        }

        Ok(SubmissionSlot {
            flag: Arc::clone(&self.submitting),
            finished: Arc::clone(&self.last_completed),
        })
    }

    async fn submit_inner(&self, request: SubmitRequest) -> Result<OrderDraft, ServiceError> {
        // Fresh resolution, never the live quote: the shopper may have kept
        // editing after the last published estimate.
        let hits = self
            .geocoder
            .resolve(&request.address.geocode_query())
            .await?;
        let destination = hits
            .first()
            .and_then(GeocodeHit::coordinates)
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "The delivery address could not be resolved".to_string(),
                )
            })?;

        if request.cart.is_empty() {
            return Err(ServiceError::ValidationError(
                "Your cart is empty".to_string(),
            ));
        }

        if !request.address.is_submittable() {
            return Err(ServiceError::ValidationError(
                "Delivery address and phone number are required".to_string(),
            ));
        }

        let distance = great_circle_km(self.origin, destination);
        let charge = self.pricer.price(&request.cart, Some(distance));
        if charge.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidOperation(
                "Shipping cost could not be determined for this order".to_string(),
            ));
        }

        let sub_total = cart::subtotal(&request.cart);
        let discount = request
            .coupon
            .as_ref()
            .map(|coupon| coupon.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let total = round_money(sub_total + charge.amount - discount);

        let draft = OrderDraft {
            cart: request.cart.clone(),
            sub_total_price: sub_total,
            shipping: charge.amount,
            discount_price: round_money(discount),
            total_price: total,
            shipping_address: request.address.clone(),
            user: request.user.clone(),
            coupon_code: request.coupon.as_ref().map(|c| c.code.clone()),
            coupon_data: request.coupon.clone(),
            transportation_type: ShippingPricer::required_tier(&request.cart),
            timestamp: Utc::now(),
        };

        self.staging.stage(&self.session_id, draft.clone());
        self.events
            .send_or_log(Event::OrderStaged {
                session_id: self.session_id.clone(),
                total,
            })
            .await;

        if request.save_address {
            self.save_address_in_background(request.address.clone());
        }

        info!(
            session_id = %self.session_id,
            total = %total,
            "order draft staged for payment"
        );
        Ok(draft)
    }

    /// Fire-and-forget handoff to the address persistence collaborator.
    fn save_address_in_background(&self, address: Address) {
        let Some(book) = self.address_book.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = book.save_default_address(address).await {
                warn!("failed to save default address: {}", err);
            }
        });
    }
}
