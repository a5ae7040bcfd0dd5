use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use super::domain::{
    AccessType, EnrollmentDecision, EnrollmentRecord, Program, ProgramId, Treatment, UserId,
};
use super::repository::EnrollmentStore;
use crate::workflows::notify::{Notification, NotificationKind, NotificationSink};
use crate::workflows::nudges::NudgeTrigger;
use crate::workflows::sponsorship::{
    PriceBreakdown, QuotaError, QuotaLedger, RuleStore, SponsorshipQuote,
};
use crate::workflows::store::StoreError;

/// Transient write conflicts are retried this many times before surfacing.
pub(crate) const WRITE_RETRIES: usize = 1;
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Error raised by the enrollment decision component. Every variant maps to a
/// stable reason code so the shell can render a short, specific message.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("program not found")]
    ProgramNotFound,
    #[error("program is not open for enrollment")]
    ProgramNotPublished,
    #[error("program is full")]
    CapacityExceeded,
    #[error("already enrolled in this program")]
    AlreadyEnrolled,
    #[error("payment of {amount} required to enroll")]
    PaymentRequired { amount: u32 },
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrollmentError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            EnrollmentError::ProgramNotFound => "not_found",
            EnrollmentError::ProgramNotPublished => "not_published",
            EnrollmentError::CapacityExceeded => "full",
            EnrollmentError::AlreadyEnrolled => "already_enrolled",
            EnrollmentError::PaymentRequired { .. } => "payment_required",
            EnrollmentError::Quota(_) => "sponsorship_unavailable",
            EnrollmentError::Store(StoreError::WriteConflict) => "write_conflict",
            EnrollmentError::Store(_) => "store_error",
        }
    }
}

/// Service deciding eligibility and treatment for enrollments and admitting
/// members onto free and fully-sponsored seats.
pub struct EnrollmentService<S, R, N> {
    store: Arc<S>,
    quota: Arc<QuotaLedger<R, N>>,
    notifications: Arc<N>,
    nudges: Arc<dyn NudgeTrigger>,
}

impl<S, R, N> EnrollmentService<S, R, N>
where
    S: EnrollmentStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        quota: Arc<QuotaLedger<R, N>>,
        notifications: Arc<N>,
        nudges: Arc<dyn NudgeTrigger>,
    ) -> Self {
        Self {
            store,
            quota,
            notifications,
            nudges,
        }
    }

    /// Eligibility and treatment for one (program, member) pair.
    ///
    /// Check order: existing record, then visibility, then capacity, then
    /// treatment selection with sponsorship as a best-effort override.
    pub fn decide(
        &self,
        program: &Program,
        user: &UserId,
    ) -> Result<EnrollmentDecision, EnrollmentError> {
        self.decide_with_quote(program, user)
            .map(|(decision, _)| decision)
    }

    pub fn decide_by_id(
        &self,
        program_id: &ProgramId,
        user: &UserId,
    ) -> Result<EnrollmentDecision, EnrollmentError> {
        let program = self
            .store
            .fetch_program(program_id)?
            .ok_or(EnrollmentError::ProgramNotFound)?;
        self.decide(&program, user)
    }

    /// Decision plus the price composition for display.
    pub fn options(
        &self,
        program_id: &ProgramId,
        user: &UserId,
    ) -> Result<(EnrollmentDecision, PriceBreakdown), EnrollmentError> {
        let program = self
            .store
            .fetch_program(program_id)?
            .ok_or(EnrollmentError::ProgramNotFound)?;
        let (decision, quote) = self.decide_with_quote(&program, user)?;
        let breakdown = QuotaLedger::<R, N>::price_breakdown(&program, quote.as_ref());
        Ok((decision, breakdown))
    }

    /// Enroll a member at no charge, on a free program or a fully-sponsored
    /// seat. Re-validates eligibility, claims a seat, and performs the
    /// conditional record insert; a pre-existing record yields
    /// [`EnrollmentError::AlreadyEnrolled`] with no surviving writes.
    pub fn enroll_free(
        &self,
        program_id: &ProgramId,
        user: &UserId,
    ) -> Result<EnrollmentRecord, EnrollmentError> {
        let program = self
            .store
            .fetch_program(program_id)?
            .ok_or(EnrollmentError::ProgramNotFound)?;
        let (decision, quote) = self.decide_with_quote(&program, user)?;

        match decision.treatment {
            Treatment::Open => return Err(EnrollmentError::AlreadyEnrolled),
            Treatment::Unavailable => return Err(EnrollmentError::ProgramNotPublished),
            Treatment::Full => return Err(EnrollmentError::CapacityExceeded),
            Treatment::Paid { price } => {
                return Err(EnrollmentError::PaymentRequired { amount: price })
            }
            Treatment::Sponsored { member_owes, .. } if member_owes > 0 => {
                return Err(EnrollmentError::PaymentRequired {
                    amount: member_owes,
                })
            }
            Treatment::Free | Treatment::Sponsored { .. } => {}
        }

        let access = if quote.is_some() {
            AccessType::Sponsored
        } else {
            AccessType::Free
        };
        self.admit(&program, user, access, 0, quote)
    }

    fn decide_with_quote(
        &self,
        program: &Program,
        user: &UserId,
    ) -> Result<(EnrollmentDecision, Option<SponsorshipQuote>), EnrollmentError> {
        if self.store.fetch_enrollment(&program.id, user)?.is_some() {
            return Ok((
                EnrollmentDecision::blocked(Treatment::Open, "already_enrolled"),
                None,
            ));
        }

        if !program.is_open_for_enrollment() {
            return Ok((
                EnrollmentDecision::blocked(Treatment::Unavailable, "not_published"),
                None,
            ));
        }

        if !program.has_free_seat() {
            return Ok((EnrollmentDecision::blocked(Treatment::Full, "full"), None));
        }

        if let Some(quote) = self.quota.quote(program, Utc::now())? {
            let decision = EnrollmentDecision::eligible(Treatment::Sponsored {
                sponsor: quote.sponsor_label.clone(),
                member_owes: quote.member_owes,
            });
            return Ok((decision, Some(quote)));
        }

        if program.is_free() {
            return Ok((EnrollmentDecision::eligible(Treatment::Free), None));
        }

        Ok((
            EnrollmentDecision::eligible(Treatment::Paid {
                price: program.price,
            }),
            None,
        ))
    }

    /// Seat claim, optional sponsor debit, and the conditional record insert.
    ///
    /// The bounded increment is the capacity gate and the insert is the
    /// uniqueness gate; a loss at either point unwinds the other with its
    /// commutative inverse so no interleaving leaves a seat or a debit
    /// without a record.
    fn admit(
        &self,
        program: &Program,
        user: &UserId,
        access: AccessType,
        amount_paid: u32,
        quote: Option<SponsorshipQuote>,
    ) -> Result<EnrollmentRecord, EnrollmentError> {
        self.claim_seat(&program.id)?;

        if let Some(quote) = &quote {
            match self.quota.reserve(quote) {
                Ok(_) => {}
                Err(QuotaError::Exhausted) => {
                    // Lost the race for the last sponsored seat; fall back to
                    // the standard treatment.
                    self.return_seat(&program.id);
                    if program.is_free() {
                        return self.admit(program, user, AccessType::Free, 0, None);
                    }
                    return Err(EnrollmentError::PaymentRequired {
                        amount: program.price,
                    });
                }
                Err(other) => {
                    self.return_seat(&program.id);
                    return Err(other.into());
                }
            }
        }

        let record = EnrollmentRecord {
            program_id: program.id.clone(),
            user_id: user.clone(),
            access,
            amount_paid,
            enrolled_at: Utc::now(),
        };

        match self.store.insert_enrollment(record) {
            Ok(stored) => {
                self.announce(program, &stored);
                self.nudges.evaluate(&program.creator);
                Ok(stored)
            }
            Err(err) => {
                if let Some(quote) = &quote {
                    if let Err(release_err) = self.quota.release(quote) {
                        warn!(
                            program = %program.id.0,
                            error = %release_err,
                            "sponsorship release after failed insert failed"
                        );
                    }
                }
                self.return_seat(&program.id);
                match err {
                    StoreError::Conflict => Err(EnrollmentError::AlreadyEnrolled),
                    other => Err(other.into()),
                }
            }
        }
    }

    fn claim_seat(&self, program_id: &ProgramId) -> Result<(), EnrollmentError> {
        let mut attempts = 0;
        loop {
            match self.store.increment_participants(program_id) {
                Ok(_) => return Ok(()),
                Err(StoreError::CapacityExceeded) => {
                    return Err(EnrollmentError::CapacityExceeded)
                }
                Err(StoreError::WriteConflict) if attempts < WRITE_RETRIES => {
                    attempts += 1;
                    thread::sleep(RETRY_BACKOFF);
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn return_seat(&self, program_id: &ProgramId) {
        let mut attempts = 0;
        loop {
            match self.store.release_participant(program_id) {
                Ok(()) => return,
                Err(StoreError::WriteConflict) if attempts < WRITE_RETRIES => {
                    attempts += 1;
                    thread::sleep(RETRY_BACKOFF);
                }
                Err(err) => {
                    warn!(program = %program_id.0, error = %err, "seat release failed");
                    return;
                }
            }
        }
    }

    /// Fire-and-forget notification intents to the content owner and the
    /// enrollee. Delivery failure never rolls back the enrollment.
    fn announce(&self, program: &Program, record: &EnrollmentRecord) {
        let mut data = BTreeMap::new();
        data.insert("program_id".to_string(), program.id.0.clone());
        data.insert("user_id".to_string(), record.user_id.0.clone());
        data.insert("access".to_string(), record.access.label().to_string());

        let owner = Notification {
            recipient: program.creator.0.clone(),
            kind: NotificationKind::NewParticipant,
            title: "New participant".to_string(),
            message: format!("{} joined {}", record.user_id.0, program.title),
            data: data.clone(),
        };
        let member = Notification {
            recipient: record.user_id.0.clone(),
            kind: NotificationKind::EnrollmentConfirmed,
            title: "Enrollment confirmed".to_string(),
            message: format!("You are enrolled in {}", program.title),
            data,
        };

        for notification in [owner, member] {
            if let Err(err) = self.notifications.notify(notification) {
                warn!(program = %program.id.0, error = %err, "enrollment notification failed");
            }
        }
    }
}
