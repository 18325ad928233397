use std::sync::Arc;

use accord_core::{Clock, Notification, NotificationRecord, NotificationSink, Timestamp};
use accord_ledger::TokenLedger;

/// Collaborators shared by every protocol component.
#[derive(Clone)]
pub struct Services {
    pub ledger: Arc<dyn TokenLedger>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn NotificationSink>,
}

impl Services {
    pub fn new(
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            ledger,
            clock,
            sink,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Stamp `notification` with the current time and hand it to the sink.
    pub fn notify(&self, component: &str, notification: Notification) {
        self.sink
            .notify(NotificationRecord::new(component, self.clock.now(), notification));
    }
}
