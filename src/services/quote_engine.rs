//! Debounced, supersession-safe shipping quote orchestration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::events::{Event, EventSender};
use crate::models::{
    Address, CartLine, Coordinates, QuoteFallbackReason, ShippingQuote,
};
use crate::services::distance::great_circle_km;
use crate::services::geocoding::GeocodingService;
use crate::services::shipping::ShippingPricer;

/// Snapshot of everything a quote depends on, captured at edit time.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteInput {
    pub address: Address,
    pub cart: Vec<CartLine>,
}

/// Where the engine currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Debouncing,
    Resolving,
    /// Priced from a resolved coordinate.
    Resolved,
    /// Degraded pricing after a failed resolution attempt.
    Fallback,
    /// Preconditions failed; resolution was never attempted.
    Unresolvable,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Orchestrates the live shipping quote during address entry.
///
/// Any address, cart, or tier change re-enters the state machine through
/// [`AddressQuoteEngine::touch`]: the previous debounce timer is cancelled,
/// and only the most recently initiated resolution is allowed to publish.
/// Every settled transition emits exactly one notification event.
///
/// All mutable state is owned by the engine instance and scoped to the
/// checkout session; [`AddressQuoteEngine::shutdown`] tears it down.
pub struct AddressQuoteEngine {
    inner: Arc<Inner>,
}

struct Inner {
    geocoder: Arc<GeocodingService>,
    pricer: ShippingPricer,
    origin: Coordinates,
    debounce: Duration,
    events: EventSender,
    /// Monotonic request ordering: a resolution may only publish while its
    /// generation is still the latest.
    generation: AtomicU64,
    shut_down: AtomicBool,
    phase: Mutex<EnginePhase>,
    pending: Mutex<Option<JoinHandle<()>>>,
    quote_tx: watch::Sender<Option<ShippingQuote>>,
}

impl AddressQuoteEngine {
    pub fn new(
        geocoder: Arc<GeocodingService>,
        config: &AppConfig,
        events: EventSender,
    ) -> Self {
        let (quote_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                geocoder,
                pricer: ShippingPricer::from_config(config),
                origin: config.warehouse_origin(),
                debounce: config.debounce_window(),
                events,
                generation: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
                phase: Mutex::new(EnginePhase::Idle),
                pending: Mutex::new(None),
                quote_tx,
            }),
        }
    }

    /// Registers an address/cart change and restarts the settling window.
    ///
    /// Cancels any pending debounce timer; an in-flight resolution that the
    /// cancellation misses is discarded when it tries to publish.
    pub fn touch(&self, input: QuoteInput) {
        let inner = Arc::clone(&self.inner);
        if inner.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&inner.phase) = EnginePhase::Debouncing;

        let task_inner = Arc::clone(&inner);
        let handle = tokio::spawn(async move {
            sleep(task_inner.debounce).await;
            if !task_inner.is_current(generation) {
                return;
            }
            task_inner.run_pipeline(generation, input).await;
        });

        let mut pending = lock(&inner.pending);
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Latest published quote, if any resolution has settled yet.
    pub fn current_quote(&self) -> Option<ShippingQuote> {
        self.inner.quote_tx.borrow().clone()
    }

    /// Subscription for the rendering layer; yields every published quote.
    pub fn subscribe(&self) -> watch::Receiver<Option<ShippingQuote>> {
        self.inner.quote_tx.subscribe()
    }

    pub fn phase(&self) -> EnginePhase {
        *lock(&self.inner.phase)
    }

    /// Tears the engine down: cancels the pending timer and invalidates all
    /// in-flight resolutions. Nothing publishes after shutdown.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = lock(&self.inner.pending).take() {
            handle.abort();
        }
        debug!("address quote engine shut down");
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        !self.shut_down.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Atomically re-checks currency and publishes. Returns false when the
    /// result belongs to a superseded request and was discarded.
    fn publish_if_current(
        &self,
        generation: u64,
        phase: EnginePhase,
        quote: ShippingQuote,
    ) -> bool {
        let mut guard = lock(&self.phase);
        if !self.is_current(generation) {
            debug!(generation, "discarding superseded quote result");
            return false;
        }
        *guard = phase;
        self.quote_tx.send_replace(Some(quote));
        true
    }

    fn set_phase_if_current(&self, generation: u64, phase: EnginePhase) {
        let mut guard = lock(&self.phase);
        if self.is_current(generation) {
            *guard = phase;
        }
    }

    async fn run_pipeline(self: Arc<Self>, generation: u64, input: QuoteInput) {
        if input.cart.is_empty() {
            self.settle_fallback(
                generation,
                EnginePhase::Unresolvable,
                QuoteFallbackReason::EmptyCart,
                &input.cart,
                None,
            )
            .await;
            return;
        }
        if !input.address.is_complete() {
            self.settle_fallback(
                generation,
                EnginePhase::Unresolvable,
                QuoteFallbackReason::IncompleteAddress,
                &input.cart,
                None,
            )
            .await;
            return;
        }

        self.set_phase_if_current(generation, EnginePhase::Resolving);

        let query = input.address.geocode_query();
        match self.geocoder.resolve(&query).await {
            Err(err) => {
                error!("address resolution failed: {}", err);
                self.settle_fallback(
                    generation,
                    EnginePhase::Fallback,
                    QuoteFallbackReason::GeocodeFailed,
                    &input.cart,
                    Some(err.to_string()),
                )
                .await;
            }
            Ok(hits) => match hits.first() {
                None => {
                    self.settle_fallback(
                        generation,
                        EnginePhase::Fallback,
                        QuoteFallbackReason::AddressNotFound,
                        &input.cart,
                        None,
                    )
                    .await;
                }
                Some(hit) => match hit.coordinates() {
                    None => {
                        self.settle_fallback(
                            generation,
                            EnginePhase::Fallback,
                            QuoteFallbackReason::CoordinatesInvalid,
                            &input.cart,
                            None,
                        )
                        .await;
                    }
                    Some(destination) => {
                        self.settle_resolved(generation, &input.cart, destination).await;
                    }
                },
            },
        }
    }

    async fn settle_resolved(
        &self,
        generation: u64,
        cart: &[CartLine],
        destination: Coordinates,
    ) {
        let distance = great_circle_km(self.origin, destination);
        let charge = self.pricer.price(cart, Some(distance));
        let quote = ShippingQuote {
            amount_owed: charge.amount,
            distance_km: Some(distance),
            route: vec![self.origin, destination],
            confidence: charge.confidence,
            computed_at: Utc::now(),
        };

        if !self.publish_if_current(generation, EnginePhase::Resolved, quote.clone()) {
            return;
        }

        info!(
            distance_km = distance,
            amount = %quote.amount_owed,
            "shipping quote resolved"
        );
        self.events
            .send_or_log(Event::QuoteResolved {
                amount: quote.amount_owed,
                distance_km: distance,
            })
            .await;
    }

    async fn settle_fallback(
        &self,
        generation: u64,
        phase: EnginePhase,
        reason: QuoteFallbackReason,
        cart: &[CartLine],
        detail: Option<String>,
    ) {
        let charge = self.pricer.price(cart, None);
        let quote = ShippingQuote {
            amount_owed: charge.amount,
            distance_km: None,
            route: Vec::new(),
            confidence: charge.confidence,
            computed_at: Utc::now(),
        };

        if !self.publish_if_current(generation, phase, quote.clone()) {
            return;
        }

        info!(
            ?reason,
            amount = %quote.amount_owed,
            "shipping quote settled in degraded mode"
        );
        self.events
            .send_or_log(Event::QuoteFallback {
                reason,
                notice: reason.notice().to_string(),
                amount: quote.amount_owed,
                detail,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuoteConfidence, ShopRef, TransportationTier};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn cart_line() -> CartLine {
        CartLine {
            product_id: "p1".to_string(),
            shop: Some(ShopRef::Id("s1".to_string())),
            quantity: 2,
            unit_discount_price: dec!(100),
            transportation_type: Some(TransportationTier::Motorbike),
            variant_size: None,
            variant_color: None,
            is_event: false,
        }
    }

    fn complete_address() -> Address {
        Address {
            country: "Vietnam".to_string(),
            city: "Ho Chi Minh City".to_string(),
            address_line: "12 Nguyen Hue".to_string(),
            phone_number: "0901234567".to_string(),
        }
    }

    fn engine(base_url: &str) -> (AddressQuoteEngine, mpsc::Receiver<Event>) {
        let config = AppConfig {
            geocode_base_url: base_url.to_string(),
            debounce_ms: 40,
            geocode_backoff_ms: 10,
            ..AppConfig::default()
        };
        let (events, rx) = EventSender::channel();
        let geocoder = Arc::new(GeocodingService::from_config(&config).unwrap());
        (AddressQuoteEngine::new(geocoder, &config, events), rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a checkout event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn empty_cart_settles_unresolvable_without_a_network_call() {
        let (engine, mut rx) = engine("http://127.0.0.1:9");
        engine.touch(QuoteInput {
            address: complete_address(),
            cart: vec![],
        });

        let event = next_event(&mut rx).await;
        assert!(matches!(
            event,
            Event::QuoteFallback {
                reason: QuoteFallbackReason::EmptyCart,
                ..
            }
        ));
        assert_eq!(engine.phase(), EnginePhase::Unresolvable);

        let quote = engine.current_quote().unwrap();
        assert_eq!(quote.amount_owed, dec!(0.00));
        assert_eq!(quote.confidence, QuoteConfidence::Fallback);
        assert!(quote.route.is_empty());
    }

    #[tokio::test]
    async fn incomplete_address_settles_unresolvable() {
        let (engine, mut rx) = engine("http://127.0.0.1:9");
        engine.touch(QuoteInput {
            address: Address {
                city: String::new(),
                ..complete_address()
            },
            cart: vec![cart_line()],
        });

        let event = next_event(&mut rx).await;
        assert!(matches!(
            event,
            Event::QuoteFallback {
                reason: QuoteFallbackReason::IncompleteAddress,
                ..
            }
        ));

        // Flat 10% of the 200.00 subtotal.
        assert_eq!(engine.current_quote().unwrap().amount_owed, dec!(20.00));
    }

    #[tokio::test]
    async fn touch_after_shutdown_is_ignored() {
        let (engine, mut rx) = engine("http://127.0.0.1:9");
        engine.shutdown();
        engine.touch(QuoteInput {
            address: complete_address(),
            cart: vec![cart_line()],
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(engine.current_quote().is_none());
        assert!(rx.try_recv().is_err());
    }
}
