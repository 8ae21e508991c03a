mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use storefront_checkout::events::Event;
use storefront_checkout::models::{QuoteConfidence, TransportationTier};
use storefront_checkout::services::orders::SubmitRequest;
use storefront_checkout::services::quote_engine::QuoteInput;

/// §8 reference scenario: a motorbike cart delivered 10.5 km from the
/// warehouse quotes 50 + 10.5 × 5 = 102.50 over a 200.00 subtotal.
#[tokio::test]
async fn motorbike_cart_quotes_and_submits_end_to_end() {
    let mut harness = common::start(None).await;
    // One resolution for the live quote, one fresh resolution at submit.
    Mock::given(method("GET"))
        .and(path("/order/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::geocode_hits_at_km(10.5)))
        .expect(2)
        .mount(&harness.server)
        .await;

    let engine = harness.checkout.quote_engine();
    engine.touch(QuoteInput {
        address: common::delivery_address(),
        cart: common::motorbike_cart(),
    });

    let event = common::next_event(&mut harness.events).await;
    assert_matches!(event, Event::QuoteResolved { amount, .. } if amount == dec!(102.50));

    let draft = harness
        .checkout
        .orders()
        .submit(SubmitRequest {
            cart: common::motorbike_cart(),
            address: common::delivery_address(),
            user: json!({"_id": "user-1"}),
            coupon: None,
            save_address: false,
        })
        .await
        .unwrap();

    assert_eq!(draft.sub_total_price, dec!(200.00));
    assert_eq!(draft.shipping, dec!(102.50));
    assert_eq!(draft.discount_price, dec!(0.00));
    assert_eq!(draft.total_price, dec!(302.50));
    assert_eq!(draft.transportation_type, Some(TransportationTier::Motorbike));

    assert_matches!(
        common::next_event(&mut harness.events).await,
        Event::OrderStaged { total, .. } if total == dec!(302.50)
    );
}

/// §8 fallback scenario: geocoding finds nothing, shipping degrades to a
/// flat 10% of the 200.00 subtotal.
#[tokio::test]
async fn unresolved_address_quotes_flat_ten_percent() {
    let mut harness = common::start(None).await;
    Mock::given(method("GET"))
        .and(path("/order/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.server)
        .await;

    harness.checkout.quote_engine().touch(QuoteInput {
        address: common::delivery_address(),
        cart: common::motorbike_cart(),
    });

    common::next_event(&mut harness.events).await;
    let quote = harness.checkout.quote_engine().current_quote().unwrap();
    assert_eq!(quote.amount_owed, dec!(20.00));
    assert_eq!(quote.distance_km, None);
    assert_eq!(quote.confidence, QuoteConfidence::Fallback);
}

#[tokio::test]
async fn coupon_discount_flows_into_the_order_totals() {
    let mut harness = common::start(None).await;
    Mock::given(method("GET"))
        .and(path("/order/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::geocode_hits_at_km(10.5)))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/coupon/get-coupon-value/SPRING10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "couponCode": {
                "name": "Spring sale",
                "value": 10,
                "shopId": "s1",
                "selectedProduct": "p1"
            }
        })))
        .mount(&harness.server)
        .await;

    let cart = common::motorbike_cart();
    let applied = harness
        .checkout
        .coupons()
        .apply("SPRING10", &cart)
        .await
        .unwrap();
    assert_eq!(applied.discount_amount, dec!(20.00));
    assert_matches!(
        common::next_event(&mut harness.events).await,
        Event::CouponApplied { discount, .. } if discount == dec!(20.00)
    );

    let draft = harness
        .checkout
        .orders()
        .submit(SubmitRequest {
            cart,
            address: common::delivery_address(),
            user: json!({"_id": "user-1"}),
            coupon: Some(applied),
            save_address: false,
        })
        .await
        .unwrap();

    // total = subtotal + shipping - discount, rounded at the boundary.
    assert_eq!(draft.total_price, dec!(282.50));
    assert_eq!(draft.coupon_code.as_deref(), Some("SPRING10"));
    assert!(draft.coupon_data.is_some());
}

#[tokio::test]
async fn staged_draft_is_consumed_exactly_once_by_the_payment_step() {
    let harness = common::start(None).await;
    Mock::given(method("GET"))
        .and(path("/order/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::geocode_hits_at_km(10.5)))
        .mount(&harness.server)
        .await;

    harness
        .checkout
        .orders()
        .submit(SubmitRequest {
            cart: common::motorbike_cart(),
            address: common::delivery_address(),
            user: json!({"_id": "user-1"}),
            coupon: None,
            save_address: false,
        })
        .await
        .unwrap();

    let session_id = harness.checkout.session_id().to_string();
    let staged = harness.checkout.staging().take(&session_id);
    assert!(staged.is_some());
    assert_eq!(staged.unwrap().total_price, dec!(302.50));

    // Read-once: the slot is empty for any later consumer.
    assert!(harness.checkout.staging().take(&session_id).is_none());
}
