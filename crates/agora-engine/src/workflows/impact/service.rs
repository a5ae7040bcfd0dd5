use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::warn;

use super::domain::{
    ChallengeCompletion, ChallengeDefinition, ChallengeId, CompletionId, CompletionReport,
    EvidenceTier, ImpactRecord, ValidationOutcome, ValidationStatus,
};
use super::handprint::{self, Handprint};
use super::scoring;
use crate::workflows::enrollment::domain::UserId;
use crate::workflows::nudges::NudgeTrigger;
use crate::workflows::store::StoreError;

/// Completions scoring above this confidence are validated outright; the
/// rest queue for manual review.
const VALIDATION_THRESHOLD: f64 = 0.7;

/// Storage abstraction for challenge definitions, completions, and the
/// derived impact records. `monthly_records` returns only records dated
/// inside the given calendar month.
pub trait CompletionStore: Send + Sync {
    fn fetch_challenge(&self, id: &ChallengeId) -> Result<Option<ChallengeDefinition>, StoreError>;
    fn insert_completion(
        &self,
        completion: ChallengeCompletion,
    ) -> Result<ChallengeCompletion, StoreError>;
    fn insert_impact_record(&self, record: ImpactRecord) -> Result<(), StoreError>;
    fn monthly_records(
        &self,
        user: &UserId,
        year: i32,
        month: u32,
    ) -> Result<Vec<ImpactRecord>, StoreError>;
}

/// Context handed to the external feedback-text service.
#[derive(Debug, Clone)]
pub struct TipContext<'a> {
    pub challenge_title: &'a str,
    pub category: &'a str,
    pub evidence: EvidenceTier,
    pub impact_amount: f64,
    pub notes: Option<&'a str>,
}

/// Trait describing the opaque text-generation service. Implementations are
/// expected to bound the call with a timeout; the pipeline degrades to its
/// deterministic feedback on any error.
pub trait TipGenerator: Send + Sync {
    fn generate_tip(&self, context: &TipContext<'_>) -> Result<String, TipError>;
}

/// Feedback-text service failure. Never fatal to a validation.
#[derive(Debug, thiserror::Error)]
pub enum TipError {
    #[error("tip generation timed out")]
    Timeout,
    #[error("tip service unavailable: {0}")]
    Unavailable(String),
}

/// Error raised by the impact validation component.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("challenge not found")]
    ChallengeNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

static COMPLETION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_completion_id() -> CompletionId {
    let id = COMPLETION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CompletionId(format!("cmp-{id:06}"))
}

/// Service turning completion reports into confidence-weighted impact.
pub struct ImpactValidationService<S> {
    store: Arc<S>,
    tips: Box<dyn TipGenerator>,
    nudges: Arc<dyn NudgeTrigger>,
}

impl<S> ImpactValidationService<S>
where
    S: CompletionStore + 'static,
{
    pub fn new(store: Arc<S>, tips: Box<dyn TipGenerator>, nudges: Arc<dyn NudgeTrigger>) -> Self {
        Self {
            store,
            tips,
            nudges,
        }
    }

    /// Run the scoring pipeline for one reported completion and persist the
    /// attempt. Every attempt creates a new record; validated attempts also
    /// produce the denormalized impact record the handprint reads.
    pub fn validate(
        &self,
        report: CompletionReport,
    ) -> Result<ValidationOutcome, ValidationError> {
        let definition = self
            .store
            .fetch_challenge(&report.challenge_id)?
            .ok_or(ValidationError::ChallengeNotFound)?;

        let breakdown = scoring::score_completion(&definition, &report);
        let status = if breakdown.validation_score > VALIDATION_THRESHOLD {
            ValidationStatus::Validated
        } else {
            ValidationStatus::Pending
        };

        let completion = ChallengeCompletion {
            id: next_completion_id(),
            user_id: report.user_id.clone(),
            challenge_id: report.challenge_id.clone(),
            evidence: report.evidence,
            impact_amount: breakdown.impact_amount,
            validation_score: breakdown.validation_score,
            points_earned: breakdown.points_earned,
            status,
            completed_at: Utc::now(),
        };
        let stored = self.store.insert_completion(completion)?;

        if status == ValidationStatus::Validated {
            self.store.insert_impact_record(ImpactRecord {
                user_id: stored.user_id.clone(),
                category: definition.category,
                amount: stored.impact_amount,
                points: stored.points_earned,
                confidence: stored.validation_score,
                recorded_on: stored.completed_at.date_naive(),
            })?;
        }

        let mut feedback = breakdown.feedback;
        if report.notes.is_some() {
            let context = TipContext {
                challenge_title: &definition.title,
                category: definition.category.label(),
                evidence: report.evidence,
                impact_amount: stored.impact_amount,
                notes: report.notes.as_deref(),
            };
            match self.tips.generate_tip(&context) {
                Ok(tip) => {
                    feedback.push_str(" 💡 ");
                    feedback.push_str(&tip);
                }
                Err(err) => {
                    warn!(
                        challenge = %report.challenge_id.0,
                        error = %err,
                        "tip generation failed; keeping deterministic feedback"
                    );
                }
            }
        }

        self.nudges.evaluate(&definition.creator);

        Ok(ValidationOutcome {
            completion: stored,
            feedback,
        })
    }

    /// Current-calendar-month handprint for a member.
    pub fn monthly_handprint(
        &self,
        user: &UserId,
        today: NaiveDate,
    ) -> Result<Handprint, ValidationError> {
        let records = self
            .store
            .monthly_records(user, today.year(), today.month())?;
        Ok(handprint::assemble(&records))
    }
}
