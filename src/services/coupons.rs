//! Coupon validation and discount computation.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{round_money, AppliedCoupon, CartLine};

const COUPON_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cart summary line sent to the coupon validation service.
#[derive(Debug, Serialize)]
struct CouponCartLine<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(rename = "shopId", skip_serializing_if = "Option::is_none")]
    shop_id: Option<&'a str>,
    qty: u32,
    #[serde(rename = "discountPrice")]
    discount_price: Decimal,
}

#[derive(Debug, Serialize)]
struct CouponRequest<'a> {
    cart: Vec<CouponCartLine<'a>>,
}

#[derive(Debug, Deserialize)]
struct CouponValueResponse {
    success: bool,
    #[serde(rename = "couponCode", default)]
    coupon: Option<CouponCodePayload>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CouponCodePayload {
    name: String,
    value: Decimal,
    #[serde(rename = "shopId", default)]
    shop_id: Option<String>,
    #[serde(rename = "selectedProduct", default)]
    selected_product: Option<String>,
}

/// The cart value a coupon can discount: lines matching the coupon's target
/// product, or — for shop-wide coupons — lines from the target shop. A
/// coupon with no target applies to nothing.
fn eligible_price(
    target_product: Option<&str>,
    target_shop: Option<&str>,
    cart: &[CartLine],
) -> Decimal {
    let matches = |line: &CartLine| match (target_product, target_shop) {
        (Some(product), _) => line.product_id == product,
        (None, Some(shop)) => line
            .shop
            .as_ref()
            .and_then(|s| s.canonical_id())
            .is_some_and(|id| id == shop),
        (None, None) => false,
    };

    cart.iter()
        .filter(|line| matches(line))
        .map(CartLine::line_total)
        .sum()
}

fn compute_discount(eligible_price: Decimal, percent_value: Decimal) -> Decimal {
    round_money(eligible_price * percent_value / Decimal::from(100))
}

/// Validates coupon codes against the external service and holds the single
/// applied coupon for the checkout session.
///
/// Server validation checks the coupon's existence and targeting rules, but
/// not the current cart — the client-side eligibility re-check runs after
/// every server validation. Applying a different code replaces the prior
/// coupon wholesale; coupons never stack.
pub struct CouponEngine {
    client: Client,
    base_url: String,
    state: Mutex<Option<AppliedCoupon>>,
    events: EventSender,
}

impl CouponEngine {
    pub fn from_config(config: &AppConfig, events: EventSender) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(COUPON_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to construct coupon client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.coupon_base_url.trim_end_matches('/').to_string(),
            state: Mutex::new(None),
            events,
        })
    }

    /// The currently applied coupon, if any.
    pub fn current(&self) -> Option<AppliedCoupon> {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drops the applied coupon, notifying if one was held.
    pub async fn clear(&self) {
        let cleared = {
            let mut guard = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };
        if let Some(coupon) = cleared {
            self.events
                .send_or_log(Event::CouponCleared { code: coupon.code })
                .await;
        }
    }

    /// Validates a code against the coupon service and applies it to the
    /// cart. Empty codes are rejected locally without a network call; any
    /// validation failure clears a previously applied coupon.
    #[instrument(skip(self, cart))]
    pub async fn apply(
        &self,
        code: &str,
        cart: &[CartLine],
    ) -> Result<AppliedCoupon, ServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Coupon code is required".to_string(),
            ));
        }

        let request = CouponRequest {
            cart: cart
                .iter()
                .map(|line| CouponCartLine {
                    id: &line.product_id,
                    shop_id: line.shop.as_ref().and_then(|s| s.canonical_id()),
                    qty: line.quantity,
                    discount_price: line.unit_discount_price,
                })
                .collect(),
        };

        let url = format!("{}/coupon/get-coupon-value/{}", self.base_url, code);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!(
                    "failed to reach coupon service: {}",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "coupon service returned status {}",
                response.status()
            )));
        }

        let payload: CouponValueResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("failed to parse coupon response: {}", e))
        })?;

        if !payload.success {
            let reason = payload
                .message
                .unwrap_or_else(|| "Coupon code is not valid".to_string());
            warn!(code, "coupon rejected by the validation service");
            self.clear().await;
            return Err(ServiceError::CouponRejected(reason));
        }

        let coupon = payload.coupon.ok_or_else(|| {
            ServiceError::ExternalServiceError(
                "coupon service accepted the code but returned no coupon data".to_string(),
            )
        })?;

        let eligible = eligible_price(
            coupon.selected_product.as_deref(),
            coupon.shop_id.as_deref(),
            cart,
        );
        if eligible.is_zero() {
            self.clear().await;
            return Err(ServiceError::CouponRejected(
                "This coupon is not applicable to your current cart".to_string(),
            ));
        }

        let applied = AppliedCoupon {
            code: code.to_string(),
            name: coupon.name,
            percent_value: coupon.value,
            discount_amount: compute_discount(eligible, coupon.value),
            eligible_shop_id: coupon.shop_id,
            eligible_product_id: coupon.selected_product,
        };

        {
            let mut guard = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Some(applied.clone());
        }

        info!(
            code,
            discount = %applied.discount_amount,
            "coupon applied"
        );
        self.events
            .send_or_log(Event::CouponApplied {
                code: applied.code.clone(),
                discount: applied.discount_amount,
            })
            .await;

        Ok(applied)
    }
}
