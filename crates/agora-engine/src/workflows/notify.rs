//! Outbound notification intents.
//!
//! Delivery is fire-and-forget with at-least-once semantics: duplicate
//! notifications are acceptable, lost enrollments are not, so callers log
//! sink failures and never roll back the triggering write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The event classes the engine announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    NewParticipant,
    EnrollmentConfirmed,
    PurchaseConfirmed,
    ReadyForPaidTier,
    ProgramAlmostFull,
    SponsorBudgetLow,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::NewParticipant => "new_participant",
            NotificationKind::EnrollmentConfirmed => "enrollment_confirmed",
            NotificationKind::PurchaseConfirmed => "purchase_confirmed",
            NotificationKind::ReadyForPaidTier => "ready_for_paid_tier",
            NotificationKind::ProgramAlmostFull => "program_almost_full",
            NotificationKind::SponsorBudgetLow => "sponsor_budget_low",
        }
    }
}

/// A single outbound intent handed to the delivery sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: BTreeMap<String, String>,
}

/// Trait describing the delivery transport (push, e-mail, in-app inbox).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Queued outbound intents.
///
/// The core ledger write commits first; enqueueing never fails, and delivery
/// happens in a later drain pass that can retry. Failed deliveries are
/// requeued, so a flaky transport produces duplicates rather than drops.
#[derive(Default)]
pub struct NotificationOutbox {
    queue: std::sync::Mutex<std::collections::VecDeque<Notification>>,
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub requeued: usize,
}

impl NotificationOutbox {
    pub fn pending(&self) -> usize {
        self.queue.lock().expect("outbox mutex poisoned").len()
    }

    /// Push every queued intent through `transport`, requeueing failures for
    /// the next pass.
    pub fn drain(&self, transport: &dyn NotificationSink) -> DrainReport {
        let batch: Vec<Notification> = {
            let mut guard = self.queue.lock().expect("outbox mutex poisoned");
            guard.drain(..).collect()
        };

        let mut report = DrainReport {
            delivered: 0,
            requeued: 0,
        };
        for notification in batch {
            match transport.notify(notification.clone()) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    self.queue
                        .lock()
                        .expect("outbox mutex poisoned")
                        .push_back(notification);
                    report.requeued += 1;
                }
            }
        }
        report
    }
}

impl NotificationSink for NotificationOutbox {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.queue
            .lock()
            .expect("outbox mutex poisoned")
            .push_back(notification);
        Ok(())
    }
}
