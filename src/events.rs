use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::QuoteFallbackReason;

/// Default depth of the notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Checkout notifications published to the rendering layer.
///
/// Every settled state transition in the pipeline emits exactly one event —
/// a success, a reason-coded warning, or an error. There are no silent
/// outcomes.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    /// A fresh quote was priced from a resolved coordinate.
    QuoteResolved {
        amount: Decimal,
        distance_km: f64,
    },
    /// The quote settled in degraded mode; `detail` carries diagnostics for
    /// service failures, `notice` is the shopper-facing message.
    QuoteFallback {
        reason: QuoteFallbackReason,
        notice: String,
        amount: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    CouponApplied {
        code: String,
        discount: Decimal,
    },
    CouponCleared {
        code: String,
    },
    /// An order draft was built and staged for the payment step.
    OrderStaged {
        session_id: String,
        total: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded notification channel and its sending half.
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self::new(tx), rx)
    }

    /// Sends an event, failing if the receiving side is gone.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a closed channel is logged, never propagated.
    /// Notification delivery must not fail the business operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("Dropping checkout event: {}", err);
        }
    }
}
