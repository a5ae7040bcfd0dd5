use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use agora_engine::workflows::enrollment::{
    CheckoutHandle, CheckoutReference, CreatorId, EnrollmentRecord, EnrollmentStore,
    GatewayCheckout, GatewayError, PaymentGateway, Program, ProgramId, ProgramStatus, Settlement,
    SettlementStatus, SettlementStore, UserId,
};
use agora_engine::workflows::impact::{
    ChallengeCompletion, ChallengeDefinition, ChallengeId, CompletionStore, ImpactRecord,
    TipContext, TipError, TipGenerator,
};
use agora_engine::workflows::notify::{Notification, NotificationError, NotificationSink};
use agora_engine::workflows::nudges::{CreatorActivitySource, CreatorStats, NudgeKey};
use agora_engine::workflows::sponsorship::{
    CreditLedgerEntry, RuleId, RuleStatus, RuleStore, SponsorId, SponsorshipRule,
    SponsorshipScope,
};
use agora_engine::workflows::store::StoreError;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory rendition of the relational ledger store: programs, enrollment
/// records, settlements, challenge data, and the nudge guard table.
#[derive(Default)]
pub(crate) struct InMemoryLedger {
    programs: Mutex<HashMap<ProgramId, Program>>,
    enrollments: Mutex<HashMap<(ProgramId, UserId), EnrollmentRecord>>,
    settlements: Mutex<HashMap<CheckoutReference, Settlement>>,
    challenges: Mutex<HashMap<ChallengeId, ChallengeDefinition>>,
    completions: Mutex<Vec<ChallengeCompletion>>,
    impact_records: Mutex<Vec<ImpactRecord>>,
    ratings: Mutex<HashMap<CreatorId, f64>>,
    nudged: Mutex<HashSet<NudgeKey>>,
}

impl InMemoryLedger {
    pub(crate) fn seed_program(&self, program: Program) {
        self.programs
            .lock()
            .expect("program mutex poisoned")
            .insert(program.id.clone(), program);
    }

    pub(crate) fn seed_challenge(&self, challenge: ChallengeDefinition) {
        self.challenges
            .lock()
            .expect("challenge mutex poisoned")
            .insert(challenge.id.clone(), challenge);
    }

    pub(crate) fn seed_rating(&self, creator: CreatorId, rating: f64) {
        self.ratings
            .lock()
            .expect("rating mutex poisoned")
            .insert(creator, rating);
    }

    pub(crate) fn program(&self, id: &ProgramId) -> Option<Program> {
        self.programs
            .lock()
            .expect("program mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl EnrollmentStore for InMemoryLedger {
    fn fetch_program(&self, id: &ProgramId) -> Result<Option<Program>, StoreError> {
        Ok(self
            .programs
            .lock()
            .expect("program mutex poisoned")
            .get(id)
            .cloned())
    }

    fn fetch_enrollment(
        &self,
        program: &ProgramId,
        user: &UserId,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        Ok(self
            .enrollments
            .lock()
            .expect("enrollment mutex poisoned")
            .get(&(program.clone(), user.clone()))
            .cloned())
    }

    fn insert_enrollment(
        &self,
        record: EnrollmentRecord,
    ) -> Result<EnrollmentRecord, StoreError> {
        let mut guard = self.enrollments.lock().expect("enrollment mutex poisoned");
        let key = (record.program_id.clone(), record.user_id.clone());
        if guard.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        guard.insert(key, record.clone());
        Ok(record)
    }

    fn increment_participants(&self, id: &ProgramId) -> Result<u32, StoreError> {
        let mut guard = self.programs.lock().expect("program mutex poisoned");
        let program = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        if program.status == ProgramStatus::Full {
            return Err(StoreError::CapacityExceeded);
        }
        if let Some(capacity) = program.capacity {
            if program.current_participants >= capacity {
                return Err(StoreError::CapacityExceeded);
            }
        }
        program.current_participants += 1;
        Ok(program.current_participants)
    }

    fn release_participant(&self, id: &ProgramId) -> Result<(), StoreError> {
        let mut guard = self.programs.lock().expect("program mutex poisoned");
        let program = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        program.current_participants = program.current_participants.saturating_sub(1);
        Ok(())
    }
}

impl SettlementStore for InMemoryLedger {
    fn insert_settlement(&self, settlement: Settlement) -> Result<Settlement, StoreError> {
        let mut guard = self.settlements.lock().expect("settlement mutex poisoned");
        if guard.contains_key(&settlement.reference) {
            return Err(StoreError::Conflict);
        }
        guard.insert(settlement.reference.clone(), settlement.clone());
        Ok(settlement)
    }

    fn fetch_settlement(
        &self,
        reference: &CheckoutReference,
    ) -> Result<Option<Settlement>, StoreError> {
        Ok(self
            .settlements
            .lock()
            .expect("settlement mutex poisoned")
            .get(reference)
            .cloned())
    }

    fn complete_settlement(&self, reference: &CheckoutReference) -> Result<(), StoreError> {
        let mut guard = self.settlements.lock().expect("settlement mutex poisoned");
        let settlement = guard.get_mut(reference).ok_or(StoreError::NotFound)?;
        settlement.status = SettlementStatus::Completed;
        Ok(())
    }

    fn fail_settlement(&self, reference: &CheckoutReference) -> Result<(), StoreError> {
        let mut guard = self.settlements.lock().expect("settlement mutex poisoned");
        let settlement = guard.get_mut(reference).ok_or(StoreError::NotFound)?;
        settlement.status = SettlementStatus::Failed;
        Ok(())
    }
}

impl CompletionStore for InMemoryLedger {
    fn fetch_challenge(
        &self,
        id: &ChallengeId,
    ) -> Result<Option<ChallengeDefinition>, StoreError> {
        Ok(self
            .challenges
            .lock()
            .expect("challenge mutex poisoned")
            .get(id)
            .cloned())
    }

    fn insert_completion(
        &self,
        completion: ChallengeCompletion,
    ) -> Result<ChallengeCompletion, StoreError> {
        self.completions
            .lock()
            .expect("completion mutex poisoned")
            .push(completion.clone());
        Ok(completion)
    }

    fn insert_impact_record(&self, record: ImpactRecord) -> Result<(), StoreError> {
        self.impact_records
            .lock()
            .expect("impact mutex poisoned")
            .push(record);
        Ok(())
    }

    fn monthly_records(
        &self,
        user: &UserId,
        year: i32,
        month: u32,
    ) -> Result<Vec<ImpactRecord>, StoreError> {
        let guard = self.impact_records.lock().expect("impact mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| {
                record.user_id == *user
                    && record.recorded_on.year() == year
                    && record.recorded_on.month() == month
            })
            .cloned()
            .collect())
    }
}

impl CreatorActivitySource for InMemoryLedger {
    fn creator_stats(&self, creator: &CreatorId) -> Result<CreatorStats, StoreError> {
        let programs = self.programs.lock().expect("program mutex poisoned");
        let owned: Vec<_> = programs
            .values()
            .filter(|program| program.creator == *creator)
            .collect();
        let average_rating = self
            .ratings
            .lock()
            .expect("rating mutex poisoned")
            .get(creator)
            .copied()
            .unwrap_or(0.0);

        Ok(CreatorStats {
            published_programs: owned.iter().filter(|p| p.published).count() as u32,
            total_participants: owned.iter().map(|p| p.current_participants).sum(),
            average_rating,
            has_paid_program: owned.iter().any(|p| p.price > 0),
        })
    }

    fn capacity_bounded_programs(&self, creator: &CreatorId) -> Result<Vec<Program>, StoreError> {
        let programs = self.programs.lock().expect("program mutex poisoned");
        Ok(programs
            .values()
            .filter(|program| program.creator == *creator && program.capacity.is_some())
            .cloned()
            .collect())
    }

    fn mark_nudged(&self, key: &NudgeKey) -> Result<bool, StoreError> {
        let mut guard = self.nudged.lock().expect("nudge mutex poisoned");
        Ok(guard.insert(key.clone()))
    }
}

/// In-memory sponsorship rule and credit ledger store.
#[derive(Default)]
pub(crate) struct InMemoryRuleStore {
    rules: Mutex<HashMap<RuleId, SponsorshipRule>>,
    credits: Mutex<HashMap<SponsorId, CreditLedgerEntry>>,
    alerted: Mutex<HashSet<RuleId>>,
}

impl InMemoryRuleStore {
    pub(crate) fn seed_rule(&self, rule: SponsorshipRule) {
        self.rules
            .lock()
            .expect("rule mutex poisoned")
            .insert(rule.id.clone(), rule);
    }

    pub(crate) fn seed_credit(&self, entry: CreditLedgerEntry) {
        self.credits
            .lock()
            .expect("credit mutex poisoned")
            .insert(entry.sponsor.clone(), entry);
    }
}

impl RuleStore for InMemoryRuleStore {
    fn eligible_rule(
        &self,
        program: &Program,
        now: DateTime<Utc>,
    ) -> Result<Option<SponsorshipRule>, StoreError> {
        let guard = self.rules.lock().expect("rule mutex poisoned");
        let mut candidates: Vec<_> = guard
            .values()
            .filter(|rule| rule.is_live(now) && rule.currency == program.currency)
            .filter(|rule| match &rule.scope {
                SponsorshipScope::Program(id) => *id == program.id,
                SponsorshipScope::Creator(id) => *id == program.creator,
                // Category and event scopes need catalog metadata the
                // in-memory ledger does not model.
                SponsorshipScope::Category(_) | SponsorshipScope::Event(_) => false,
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.contribution.cmp(&a.contribution));
        Ok(candidates.into_iter().next())
    }

    fn fetch_rule(&self, id: &RuleId) -> Result<Option<SponsorshipRule>, StoreError> {
        Ok(self
            .rules
            .lock()
            .expect("rule mutex poisoned")
            .get(id)
            .cloned())
    }

    fn insert_rule(&self, rule: SponsorshipRule) -> Result<SponsorshipRule, StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        if guard.contains_key(&rule.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    fn debit(&self, id: &RuleId, amount: u32) -> Result<SponsorshipRule, StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        let rule = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        if rule.status != RuleStatus::Active {
            return Err(StoreError::QuotaExhausted);
        }
        if rule.budget_spent + amount > rule.budget_total {
            return Err(StoreError::QuotaExhausted);
        }
        if let Some(max) = rule.max_participants {
            if rule.participants_used >= max {
                return Err(StoreError::QuotaExhausted);
            }
        }
        rule.budget_spent += amount;
        rule.participants_used += 1;
        Ok(rule.clone())
    }

    fn refund(&self, id: &RuleId, amount: u32) -> Result<(), StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        let rule = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        rule.budget_spent = rule.budget_spent.saturating_sub(amount);
        rule.participants_used = rule.participants_used.saturating_sub(1);
        Ok(())
    }

    fn update_status(&self, id: &RuleId, status: RuleStatus) -> Result<(), StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        let rule = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        rule.status = status;
        Ok(())
    }

    fn mark_low_budget_alerted(&self, id: &RuleId) -> Result<bool, StoreError> {
        let mut guard = self.alerted.lock().expect("alert mutex poisoned");
        Ok(guard.insert(id.clone()))
    }

    fn credit_entry(&self, sponsor: &SponsorId) -> Result<Option<CreditLedgerEntry>, StoreError> {
        Ok(self
            .credits
            .lock()
            .expect("credit mutex poisoned")
            .get(sponsor)
            .cloned())
    }

    fn credit_use(&self, sponsor: &SponsorId, amount: u32) -> Result<(), StoreError> {
        let mut guard = self.credits.lock().expect("credit mutex poisoned");
        let entry = guard
            .entry(sponsor.clone())
            .or_insert_with(|| CreditLedgerEntry {
                sponsor: sponsor.clone(),
                total: 0,
                used: 0,
            });
        entry.used += amount;
        Ok(())
    }

    fn credit_release(&self, sponsor: &SponsorId, amount: u32) -> Result<(), StoreError> {
        let mut guard = self.credits.lock().expect("credit mutex poisoned");
        if let Some(entry) = guard.get_mut(sponsor) {
            entry.used = entry.used.saturating_sub(amount);
        }
        Ok(())
    }
}

/// Notification sink that logs deliveries and keeps them for inspection.
#[derive(Default)]
pub(crate) struct InMemoryNotificationSink {
    events: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub(crate) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            recipient = %notification.recipient,
            kind = notification.kind.label(),
            "{}",
            notification.message
        );
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Stand-in payment processor issuing deterministic checkout references.
#[derive(Default)]
pub(crate) struct MockPaymentGateway {
    counter: AtomicU64,
}

impl PaymentGateway for MockPaymentGateway {
    fn create_checkout(&self, checkout: GatewayCheckout) -> Result<CheckoutHandle, GatewayError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let reference = format!("demo-cs-{id:06}");
        info!(
            amount = checkout.amount,
            currency = %checkout.currency,
            reference = %reference,
            "mock checkout session created"
        );
        Ok(CheckoutHandle {
            reference: CheckoutReference(reference.clone()),
            redirect_url: format!("https://pay.agora.example/checkout/{reference}"),
        })
    }
}

/// Deterministic stand-in for the external feedback-text service.
pub(crate) struct CannedTipGenerator;

impl TipGenerator for CannedTipGenerator {
    fn generate_tip(&self, context: &TipContext<'_>) -> Result<String, TipError> {
        let tip = match context.category {
            "transport" => "Chain short errands into one bike trip to keep the streak going.",
            "energy" => "Unplug chargers overnight; standby draw adds up over a month.",
            "water" => "A shower timer makes the next liter easier to save.",
            "waste" => "Keep a repair kit handy before replacing broken items.",
            _ => "Invite a friend along next time; shared habits stick better.",
        };
        Ok(tip.to_string())
    }
}
