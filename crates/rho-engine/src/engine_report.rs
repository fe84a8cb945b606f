//! Best-effort diagnostic reporting to the operator's own chat.

use std::sync::{Arc, RwLock};

use crate::engine_wire::{OutboundPayload, WireClient};

/// Formats failures and delivers them to the authenticated identity's own
/// chat. Delivery failures are logged locally and never escalated, so a
/// broken transport cannot cause recursive reporting.
#[derive(Clone, Default)]
pub struct ErrorReporter {
    client: Arc<RwLock<Option<Arc<dyn WireClient>>>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the client used for delivery; rebinding on reconnect replaces
    /// the previous handle.
    pub fn bind_client(&self, client: Arc<dyn WireClient>) {
        if let Ok(mut slot) = self.client.write() {
            *slot = Some(client);
        }
    }

    pub async fn report(&self, detail: &str, category: &str) {
        eprintln!("rho {category}: {detail}");

        let client = self
            .client
            .read()
            .ok()
            .and_then(|slot| slot.clone());
        let Some(client) = client else {
            return;
        };
        let Some(own_chat) = client.own_identity() else {
            return;
        };
        let body = format!("```rho {category}:\n{detail}```");
        if let Err(error) = client
            .send_message(&own_chat, OutboundPayload::text(body))
            .await
        {
            eprintln!("error report delivery failed: category={category} error={error:#}");
        }
    }
}
