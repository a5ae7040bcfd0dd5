//! Shared in-memory doubles and fixtures for the integration scenarios.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};

use agora_engine::workflows::enrollment::{
    CheckoutHandle, CheckoutReference, CheckoutService, CreatorId, EnrollmentRecord,
    EnrollmentService, EnrollmentStore, GatewayCheckout, GatewayError, PaymentGateway, Program,
    ProgramId, ProgramStatus, Settlement, SettlementStatus, SettlementStore, UserId,
};
use agora_engine::workflows::impact::{
    ChallengeCompletion, ChallengeDefinition, ChallengeId, CompletionStore,
    ImpactRecord, ImpactValidationService, TipContext, TipError, TipGenerator,
};
use agora_engine::workflows::notify::{Notification, NotificationError, NotificationSink};
use agora_engine::workflows::nudges::NudgeTrigger;
use agora_engine::workflows::sponsorship::{
    CreditLedgerEntry, QuotaLedger, RuleId, RuleStatus, RuleStore, SponsorId, SponsorshipRule,
    SponsorshipScope,
};
use agora_engine::workflows::store::StoreError;

pub fn member(name: &str) -> UserId {
    UserId(name.to_string())
}

pub fn creator() -> CreatorId {
    CreatorId("creator-1".to_string())
}

pub fn free_program() -> Program {
    Program {
        id: ProgramId("prog-1".to_string()),
        title: "Urban gardening basics".to_string(),
        creator: creator(),
        price: 0,
        currency: "HUF".to_string(),
        capacity: None,
        current_participants: 0,
        published: true,
        status: ProgramStatus::Published,
        sponsor_name: None,
    }
}

pub fn paid_program(price: u32) -> Program {
    Program {
        price,
        ..free_program()
    }
}

pub fn capacity_program(capacity: u32) -> Program {
    Program {
        capacity: Some(capacity),
        ..free_program()
    }
}

pub fn program_rule(
    contribution: u32,
    budget_total: u32,
    max_participants: Option<u32>,
) -> SponsorshipRule {
    SponsorshipRule {
        id: RuleId("rule-1".to_string()),
        sponsor: SponsorId("sponsor-1".to_string()),
        scope: SponsorshipScope::Program(ProgramId("prog-1".to_string())),
        contribution,
        currency: "HUF".to_string(),
        budget_total,
        budget_spent: 0,
        max_participants,
        participants_used: 0,
        window: None,
        status: RuleStatus::Active,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    programs: Mutex<HashMap<ProgramId, Program>>,
    enrollments: Mutex<HashMap<(ProgramId, UserId), EnrollmentRecord>>,
    settlements: Mutex<HashMap<CheckoutReference, Settlement>>,
}

impl MemoryStore {
    pub fn seed_program(&self, program: Program) {
        self.programs
            .lock()
            .expect("program mutex poisoned")
            .insert(program.id.clone(), program);
    }

    pub fn program(&self, id: &ProgramId) -> Option<Program> {
        self.programs
            .lock()
            .expect("program mutex poisoned")
            .get(id)
            .cloned()
    }

    pub fn enrollment_count(&self) -> usize {
        self.enrollments
            .lock()
            .expect("enrollment mutex poisoned")
            .len()
    }

    pub fn settlement(&self, reference: &CheckoutReference) -> Option<Settlement> {
        self.settlements
            .lock()
            .expect("settlement mutex poisoned")
            .get(reference)
            .cloned()
    }
}

impl EnrollmentStore for MemoryStore {
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

impl SettlementStore for MemoryStore {
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

#[derive(Default)]
pub struct MemoryRules {
    rules: Mutex<HashMap<RuleId, SponsorshipRule>>,
    credits: Mutex<HashMap<SponsorId, CreditLedgerEntry>>,
    alerted: Mutex<HashSet<RuleId>>,
}

impl MemoryRules {
    pub fn seed_rule(&self, rule: SponsorshipRule) {
        self.rules
            .lock()
            .expect("rule mutex poisoned")
            .insert(rule.id.clone(), rule);
    }

    pub fn rule(&self, id: &RuleId) -> Option<SponsorshipRule> {
        self.rules
            .lock()
            .expect("rule mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl RuleStore for MemoryRules {
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

#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNudges {
    evaluated: Mutex<Vec<CreatorId>>,
}

impl RecordingNudges {
    pub fn evaluated(&self) -> Vec<CreatorId> {
        self.evaluated.lock().expect("nudge mutex poisoned").clone()
    }
}

impl NudgeTrigger for RecordingNudges {
    fn evaluate(&self, creator: &CreatorId) {
        self.evaluated
            .lock()
            .expect("nudge mutex poisoned")
            .push(creator.clone());
    }
}

#[derive(Default)]
pub struct MemoryGateway {
    counter: AtomicU64,
    requests: Mutex<Vec<GatewayCheckout>>,
}

impl MemoryGateway {
    pub fn requests(&self) -> Vec<GatewayCheckout> {
        self.requests
            .lock()
            .expect("gateway mutex poisoned")
            .clone()
    }

    fn issue(&self, checkout: GatewayCheckout) -> Result<CheckoutHandle, GatewayError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.requests
            .lock()
            .expect("gateway mutex poisoned")
            .push(checkout);
        Ok(CheckoutHandle {
            reference: CheckoutReference(format!("cs-{id:06}")),
            redirect_url: format!("https://pay.example/cs-{id:06}"),
        })
    }
}

pub struct SharedGateway(pub Arc<MemoryGateway>);

impl PaymentGateway for SharedGateway {
    fn create_checkout(&self, checkout: GatewayCheckout) -> Result<CheckoutHandle, GatewayError> {
        self.0.issue(checkout)
    }
}

#[derive(Default)]
pub struct MemoryCompletions {
    challenges: Mutex<HashMap<ChallengeId, ChallengeDefinition>>,
    completions: Mutex<Vec<ChallengeCompletion>>,
    impact_records: Mutex<Vec<ImpactRecord>>,
}

impl MemoryCompletions {
    pub fn seed_challenge(&self, challenge: ChallengeDefinition) {
        self.challenges
            .lock()
            .expect("challenge mutex poisoned")
            .insert(challenge.id.clone(), challenge);
    }

    pub fn completions(&self) -> Vec<ChallengeCompletion> {
        self.completions
            .lock()
            .expect("completion mutex poisoned")
            .clone()
    }

    pub fn impact_records(&self) -> Vec<ImpactRecord> {
        self.impact_records
            .lock()
            .expect("impact mutex poisoned")
            .clone()
    }
}

impl CompletionStore for MemoryCompletions {
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

pub struct CannedTips(pub &'static str);

impl TipGenerator for CannedTips {
    fn generate_tip(&self, _context: &TipContext<'_>) -> Result<String, TipError> {
        Ok(self.0.to_string())
    }
}

pub struct Harness {
    pub enrollments: Arc<EnrollmentService<MemoryStore, MemoryRules, MemorySink>>,
    pub checkout: Arc<CheckoutService<MemoryStore, MemoryRules, MemorySink>>,
    pub store: Arc<MemoryStore>,
    pub rules: Arc<MemoryRules>,
    pub sink: Arc<MemorySink>,
    pub nudges: Arc<RecordingNudges>,
    pub gateway: Arc<MemoryGateway>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let rules = Arc::new(MemoryRules::default());
    let sink = Arc::new(MemorySink::default());
    let nudges = Arc::new(RecordingNudges::default());
    let gateway = Arc::new(MemoryGateway::default());
    let quota = Arc::new(QuotaLedger::new(rules.clone(), sink.clone()));

    let enrollments = Arc::new(EnrollmentService::new(
        store.clone(),
        quota.clone(),
        sink.clone(),
        nudges.clone(),
    ));
    let checkout = Arc::new(CheckoutService::new(
        store.clone(),
        quota,
        Box::new(SharedGateway(gateway.clone())),
        sink.clone(),
        nudges.clone(),
    ));

    Harness {
        enrollments,
        checkout,
        store,
        rules,
        sink,
        nudges,
        gateway,
    }
}

pub fn impact_service(
    store: Arc<MemoryCompletions>,
) -> (Arc<ImpactValidationService<MemoryCompletions>>, Arc<RecordingNudges>) {
    let nudges = Arc::new(RecordingNudges::default());
    (
        Arc::new(ImpactValidationService::new(
            store,
            Box::new(CannedTips("keep the streak going")),
            nudges.clone(),
        )),
        nudges,
    )
}
