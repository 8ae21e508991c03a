use dashmap::DashMap;
use tracing::debug;

use crate::models::OrderDraft;

/// Short-lived handoff between order assembly and the payment step.
///
/// One slot per checkout session, last-write-wins. The payment step takes
/// the draft exactly once; abandoning checkout clears the slot.
#[derive(Debug, Default)]
pub struct OrderStaging {
    slots: DashMap<String, OrderDraft>,
}

impl OrderStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a draft for the given session, replacing any prior draft.
    pub fn stage(&self, session_id: &str, draft: OrderDraft) {
        if self.slots.insert(session_id.to_string(), draft).is_some() {
            debug!(session_id, "replaced a previously staged order draft");
        }
    }

    /// Removes and returns the staged draft. Read-once: a second take for
    /// the same session yields `None` until something is staged again.
    pub fn take(&self, session_id: &str) -> Option<OrderDraft> {
        self.slots.remove(session_id).map(|(_, draft)| draft)
    }

    /// Drops the staged draft without consuming it (checkout abandoned).
    pub fn clear(&self, session_id: &str) {
        self.slots.remove(session_id);
    }
}
