use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{AccessType, EnrollmentRecord, Program, ProgramId, UserId};
use super::repository::EnrollmentStore;
use super::service::{RETRY_BACKOFF, WRITE_RETRIES};
use crate::workflows::notify::{Notification, NotificationKind, NotificationSink};
use crate::workflows::nudges::NudgeTrigger;
use crate::workflows::sponsorship::{QuotaError, QuotaLedger, RuleStore, SponsorshipQuote};
use crate::workflows::store::StoreError;

/// Platform share of every paid enrollment.
pub const PLATFORM_FEE_RATE: f64 = 0.20;

/// Opaque handle issued by the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckoutReference(pub String);

/// Checkout request handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCheckout {
    pub amount: u32,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

/// Redirect handle returned by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutHandle {
    pub reference: CheckoutReference,
    pub redirect_url: String,
}

/// Trait describing the external payment processor.
pub trait PaymentGateway: Send + Sync {
    fn create_checkout(&self, checkout: GatewayCheckout) -> Result<CheckoutHandle, GatewayError>;
}

/// Payment processor failure.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
}

/// Exact 80/20 revenue split. Rounding is applied only to the fee so the two
/// parts always sum to the settled amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSplit {
    pub creator_amount: u32,
    pub platform_fee: u32,
}

pub fn split_revenue(amount: u32) -> RevenueSplit {
    let platform_fee = ((amount as f64) * PLATFORM_FEE_RATE).round() as u32;
    RevenueSplit {
        creator_amount: amount - platform_fee,
        platform_fee,
    }
}

/// Money movement for one checkout, created pending before the member is
/// redirected and finalized by the processor's confirmation callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub reference: CheckoutReference,
    pub program_id: ProgramId,
    pub user_id: UserId,
    pub amount: u32,
    pub currency: String,
    pub sponsor_amount: u32,
    pub creator_amount: u32,
    pub platform_fee: u32,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Completed,
    Failed,
}

impl SettlementStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Completed => "completed",
            SettlementStatus::Failed => "failed",
        }
    }
}

/// Storage abstraction for settlements, keyed by the processor reference.
pub trait SettlementStore: Send + Sync {
    fn insert_settlement(&self, settlement: Settlement) -> Result<Settlement, StoreError>;
    fn fetch_settlement(
        &self,
        reference: &CheckoutReference,
    ) -> Result<Option<Settlement>, StoreError>;
    fn complete_settlement(&self, reference: &CheckoutReference) -> Result<(), StoreError>;
    fn fail_settlement(&self, reference: &CheckoutReference) -> Result<(), StoreError>;
}

/// Error raised by the payment settlement component.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("program not found")]
    ProgramNotFound,
    #[error("program is not open for enrollment")]
    ProgramNotPublished,
    #[error("already enrolled in this program")]
    AlreadyEnrolled,
    #[error("nothing to charge for this enrollment")]
    NothingToCharge,
    #[error("unknown checkout reference")]
    UnknownReference,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettlementError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            SettlementError::ProgramNotFound => "not_found",
            SettlementError::ProgramNotPublished => "not_published",
            SettlementError::AlreadyEnrolled => "already_enrolled",
            SettlementError::NothingToCharge => "nothing_to_charge",
            SettlementError::UnknownReference => "unknown_reference",
            SettlementError::Gateway(_) => "payment_unavailable",
            SettlementError::Quota(_) => "sponsorship_unavailable",
            SettlementError::Store(_) => "store_error",
        }
    }
}

/// Service settling paid enrollments through the external processor.
pub struct CheckoutService<S, R, N> {
    store: Arc<S>,
    quota: Arc<QuotaLedger<R, N>>,
    gateway: Box<dyn PaymentGateway>,
    notifications: Arc<N>,
    nudges: Arc<dyn NudgeTrigger>,
}

impl<S, R, N> CheckoutService<S, R, N>
where
    S: EnrollmentStore + SettlementStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        quota: Arc<QuotaLedger<R, N>>,
        gateway: Box<dyn PaymentGateway>,
        notifications: Arc<N>,
        nudges: Arc<dyn NudgeTrigger>,
    ) -> Self {
        Self {
            store,
            quota,
            gateway,
            notifications,
            nudges,
        }
    }

    /// Request a redirect handle from the processor and record a pending
    /// settlement. No enrollment record is created here; an abandoned
    /// checkout simply expires with nothing to roll back.
    pub fn start_checkout(
        &self,
        program_id: &ProgramId,
        user: &UserId,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutHandle, SettlementError> {
        let program = self
            .store
            .fetch_program(program_id)?
            .ok_or(SettlementError::ProgramNotFound)?;

        if !program.is_open_for_enrollment() {
            return Err(SettlementError::ProgramNotPublished);
        }

        // Idempotency guard against double purchase.
        if self.store.fetch_enrollment(program_id, user)?.is_some() {
            return Err(SettlementError::AlreadyEnrolled);
        }

        let quote = self.quota.quote(&program, Utc::now())?;
        let sponsor_amount = quote.as_ref().map(|q| q.sponsor_debit).unwrap_or(0);
        let amount = quote
            .as_ref()
            .map(|q| q.member_owes)
            .unwrap_or(program.price);
        if amount == 0 {
            return Err(SettlementError::NothingToCharge);
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("program_id".to_string(), program.id.0.clone());
        metadata.insert("user_id".to_string(), user.0.clone());

        let handle = self.gateway.create_checkout(GatewayCheckout {
            amount,
            currency: program.currency.clone(),
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            metadata,
        })?;

        let split = split_revenue(amount);
        let settlement = Settlement {
            reference: handle.reference.clone(),
            program_id: program.id.clone(),
            user_id: user.clone(),
            amount,
            currency: program.currency.clone(),
            sponsor_amount,
            creator_amount: split.creator_amount,
            platform_fee: split.platform_fee,
            status: SettlementStatus::Pending,
            created_at: Utc::now(),
        };
        self.store.insert_settlement(settlement)?;

        Ok(handle)
    }

    /// Finalize a checkout from the processor's asynchronous confirmation.
    ///
    /// Confirmation delivery is at-least-once, so this is an
    /// upsert-by-natural-key: an existing enrollment record for the pair is
    /// returned unchanged and the sponsorship budget is debited at most once.
    pub fn finalize(
        &self,
        reference: &CheckoutReference,
    ) -> Result<EnrollmentRecord, SettlementError> {
        let settlement = self
            .store
            .fetch_settlement(reference)?
            .ok_or(SettlementError::UnknownReference)?;

        if let Some(existing) = self
            .store
            .fetch_enrollment(&settlement.program_id, &settlement.user_id)?
        {
            self.mark_completed(reference);
            return Ok(existing);
        }

        let program = self
            .store
            .fetch_program(&settlement.program_id)?
            .ok_or(SettlementError::ProgramNotFound)?;

        let mut access = AccessType::Paid;
        let mut reserved: Option<SponsorshipQuote> = None;
        if settlement.sponsor_amount > 0 {
            if let Some(quote) = self.quota.quote(&program, Utc::now())? {
                match self.quota.reserve(&quote) {
                    Ok(_) => {
                        access = AccessType::Sponsored;
                        reserved = Some(quote);
                    }
                    Err(QuotaError::Exhausted) => {
                        warn!(
                            program = %program.id.0,
                            "sponsorship exhausted before settlement; recording paid access"
                        );
                    }
                    Err(other) => return Err(other.into()),
                }
            }
        }

        let record = EnrollmentRecord {
            program_id: settlement.program_id.clone(),
            user_id: settlement.user_id.clone(),
            access,
            amount_paid: settlement.amount,
            enrolled_at: Utc::now(),
        };

        let stored = match self.store.insert_enrollment(record) {
            Ok(stored) => stored,
            Err(StoreError::Conflict) => {
                // A concurrent redelivery won the insert; return its record.
                if let Some(quote) = &reserved {
                    if let Err(err) = self.quota.release(quote) {
                        warn!(
                            program = %program.id.0,
                            error = %err,
                            "sponsorship release after duplicate settlement failed"
                        );
                    }
                }
                self.mark_completed(reference);
                return self
                    .store
                    .fetch_enrollment(&settlement.program_id, &settlement.user_id)?
                    .ok_or(SettlementError::Store(StoreError::NotFound));
            }
            Err(other) => {
                if let Some(quote) = &reserved {
                    if let Err(err) = self.quota.release(quote) {
                        warn!(
                            program = %program.id.0,
                            error = %err,
                            "sponsorship release after failed settlement insert failed"
                        );
                    }
                }
                return Err(other.into());
            }
        };

        self.mark_completed(reference);
        self.bump_participants(&program.id);
        self.announce(&program, &stored, &settlement);
        self.nudges.evaluate(&program.creator);
        Ok(stored)
    }

    /// Record a processor-reported failure. Completed settlements are left
    /// untouched.
    pub fn fail(&self, reference: &CheckoutReference) -> Result<(), SettlementError> {
        let settlement = self
            .store
            .fetch_settlement(reference)?
            .ok_or(SettlementError::UnknownReference)?;
        if settlement.status == SettlementStatus::Pending {
            self.store.fail_settlement(reference)?;
        }
        Ok(())
    }

    fn mark_completed(&self, reference: &CheckoutReference) {
        if let Err(err) = self.store.complete_settlement(reference) {
            warn!(reference = %reference.0, error = %err, "settlement completion update failed");
        }
    }

    /// The record insert is the uniqueness gate on this path; the counter
    /// update is commutative and retried, then logged if the store still
    /// refuses it.
    fn bump_participants(&self, program_id: &ProgramId) {
        let mut attempts = 0;
        loop {
            match self.store.increment_participants(program_id) {
                Ok(_) => return,
                Err(StoreError::WriteConflict) if attempts < WRITE_RETRIES => {
                    attempts += 1;
                    thread::sleep(RETRY_BACKOFF);
                }
                Err(err) => {
                    warn!(
                        program = %program_id.0,
                        error = %err,
                        "participant counter update after settlement failed"
                    );
                    return;
                }
            }
        }
    }

    fn announce(&self, program: &Program, record: &EnrollmentRecord, settlement: &Settlement) {
        let mut data = BTreeMap::new();
        data.insert("program_id".to_string(), program.id.0.clone());
        data.insert("user_id".to_string(), record.user_id.0.clone());
        data.insert("amount".to_string(), settlement.amount.to_string());
        data.insert(
            "creator_amount".to_string(),
            settlement.creator_amount.to_string(),
        );
        data.insert(
            "platform_fee".to_string(),
            settlement.platform_fee.to_string(),
        );
        if settlement.sponsor_amount > 0 {
            data.insert(
                "sponsor_amount".to_string(),
                settlement.sponsor_amount.to_string(),
            );
        }

        let owner = Notification {
            recipient: program.creator.0.clone(),
            kind: NotificationKind::PurchaseConfirmed,
            title: "Program purchased".to_string(),
            message: format!(
                "{} purchased {} for {} {} (your share {}, platform fee {})",
                record.user_id.0,
                program.title,
                settlement.amount,
                settlement.currency,
                settlement.creator_amount,
                settlement.platform_fee
            ),
            data: data.clone(),
        };
        let member = Notification {
            recipient: record.user_id.0.clone(),
            kind: NotificationKind::PurchaseConfirmed,
            title: "Purchase confirmed".to_string(),
            message: format!(
                "Payment of {} {} received. You are enrolled in {}.",
                settlement.amount, settlement.currency, program.title
            ),
            data,
        };

        for notification in [owner, member] {
            if let Err(err) = self.notifications.notify(notification) {
                warn!(program = %program.id.0, error = %err, "settlement notification failed");
            }
        }
    }
}
