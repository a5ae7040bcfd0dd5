use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::workflows::enrollment::checkout::{
    CheckoutHandle, CheckoutReference, CheckoutService, GatewayCheckout, GatewayError,
    PaymentGateway, Settlement, SettlementStatus, SettlementStore,
};
use crate::workflows::enrollment::domain::{
    CreatorId, EnrollmentRecord, Program, ProgramId, ProgramStatus, UserId,
};
use crate::workflows::enrollment::repository::EnrollmentStore;
use crate::workflows::enrollment::service::EnrollmentService;
use crate::workflows::notify::{Notification, NotificationError, NotificationSink};
use crate::workflows::nudges::NudgeTrigger;
use crate::workflows::sponsorship::{
    CreditLedgerEntry, QuotaLedger, RuleId, RuleStatus, RuleStore, SponsorId, SponsorshipRule,
    SponsorshipScope,
};
use crate::workflows::store::StoreError;

pub(super) fn member() -> UserId {
    UserId("member-1".to_string())
}

pub(super) fn creator() -> CreatorId {
    CreatorId("creator-1".to_string())
}

pub(super) fn free_program() -> Program {
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

pub(super) fn paid_program(price: u32) -> Program {
    Program {
        price,
        ..free_program()
    }
}

pub(super) fn capacity_program(capacity: u32) -> Program {
    Program {
        capacity: Some(capacity),
        ..free_program()
    }
}

pub(super) fn draft_program() -> Program {
    Program {
        published: false,
        status: ProgramStatus::Draft,
        ..free_program()
    }
}

pub(super) fn program_rule(
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

pub(super) fn creator_rule(contribution: u32, budget_total: u32) -> SponsorshipRule {
    SponsorshipRule {
        scope: SponsorshipScope::Creator(creator()),
        ..program_rule(contribution, budget_total, None)
    }
}

#[derive(Default)]
pub(super) struct MemoryStore {
    programs: Mutex<HashMap<ProgramId, Program>>,
    enrollments: Mutex<HashMap<(ProgramId, UserId), EnrollmentRecord>>,
    settlements: Mutex<HashMap<CheckoutReference, Settlement>>,
}

impl MemoryStore {
    pub(super) fn seed_program(&self, program: Program) {
        self.programs
            .lock()
            .expect("program mutex poisoned")
            .insert(program.id.clone(), program);
    }

    pub(super) fn program(&self, id: &ProgramId) -> Option<Program> {
        self.programs
            .lock()
            .expect("program mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn enrollment_count(&self) -> usize {
        self.enrollments
            .lock()
            .expect("enrollment mutex poisoned")
            .len()
    }

    pub(super) fn settlement(&self, reference: &CheckoutReference) -> Option<Settlement> {
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

/// Store decorator injecting a bounded number of write conflicts into the
/// participant counter.
pub(super) struct FlakySeats {
    pub(super) inner: Arc<MemoryStore>,
    pub(super) conflicts_left: AtomicUsize,
}

impl EnrollmentStore for FlakySeats {
    fn fetch_program(&self, id: &ProgramId) -> Result<Option<Program>, StoreError> {
        self.inner.fetch_program(id)
    }

    fn fetch_enrollment(
        &self,
        program: &ProgramId,
        user: &UserId,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        self.inner.fetch_enrollment(program, user)
    }

    fn insert_enrollment(
        &self,
        record: EnrollmentRecord,
    ) -> Result<EnrollmentRecord, StoreError> {
        self.inner.insert_enrollment(record)
    }

    fn increment_participants(&self, id: &ProgramId) -> Result<u32, StoreError> {
        if self
            .conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
        {
            return Err(StoreError::WriteConflict);
        }
        self.inner.increment_participants(id)
    }

    fn release_participant(&self, id: &ProgramId) -> Result<(), StoreError> {
        self.inner.release_participant(id)
    }
}

impl SettlementStore for FlakySeats {
    fn insert_settlement(&self, settlement: Settlement) -> Result<Settlement, StoreError> {
        self.inner.insert_settlement(settlement)
    }

    fn fetch_settlement(
        &self,
        reference: &CheckoutReference,
    ) -> Result<Option<Settlement>, StoreError> {
        self.inner.fetch_settlement(reference)
    }

    fn complete_settlement(&self, reference: &CheckoutReference) -> Result<(), StoreError> {
        self.inner.complete_settlement(reference)
    }

    fn fail_settlement(&self, reference: &CheckoutReference) -> Result<(), StoreError> {
        self.inner.fail_settlement(reference)
    }
}

#[derive(Default)]
pub(super) struct MemoryRules {
    rules: Mutex<HashMap<RuleId, SponsorshipRule>>,
    credits: Mutex<HashMap<SponsorId, CreditLedgerEntry>>,
    alerted: Mutex<Vec<RuleId>>,
}

impl MemoryRules {
    pub(super) fn seed_rule(&self, rule: SponsorshipRule) {
        self.rules
            .lock()
            .expect("rule mutex poisoned")
            .insert(rule.id.clone(), rule);
    }

    pub(super) fn rule(&self, id: &RuleId) -> Option<SponsorshipRule> {
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
        if guard.contains(id) {
            return Ok(false);
        }
        guard.push(id.clone());
        Ok(true)
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
pub(super) struct MemorySink {
    events: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub(super) fn events(&self) -> Vec<Notification> {
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
pub(super) struct RecordingNudges {
    evaluated: Mutex<Vec<CreatorId>>,
}

impl RecordingNudges {
    pub(super) fn evaluated(&self) -> Vec<CreatorId> {
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
pub(super) struct MemoryGateway {
    counter: AtomicU64,
    requests: Mutex<Vec<GatewayCheckout>>,
}

impl MemoryGateway {
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

    pub(super) fn requests(&self) -> Vec<GatewayCheckout> {
        self.requests
            .lock()
            .expect("gateway mutex poisoned")
            .clone()
    }
}

pub(super) struct SharedGateway(pub(super) Arc<MemoryGateway>);

impl PaymentGateway for SharedGateway {
    fn create_checkout(&self, checkout: GatewayCheckout) -> Result<CheckoutHandle, GatewayError> {
        self.0.issue(checkout)
    }
}

pub(super) struct OfflineGateway;

impl PaymentGateway for OfflineGateway {
    fn create_checkout(&self, _checkout: GatewayCheckout) -> Result<CheckoutHandle, GatewayError> {
        Err(GatewayError::Unavailable("processor offline".to_string()))
    }
}

pub(super) struct TestHarness {
    pub(super) enrollments: Arc<EnrollmentService<MemoryStore, MemoryRules, MemorySink>>,
    pub(super) checkout: Arc<CheckoutService<MemoryStore, MemoryRules, MemorySink>>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) rules: Arc<MemoryRules>,
    pub(super) sink: Arc<MemorySink>,
    pub(super) nudges: Arc<RecordingNudges>,
    pub(super) gateway: Arc<MemoryGateway>,
}

pub(super) fn harness() -> TestHarness {
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

    TestHarness {
        enrollments,
        checkout,
        store,
        rules,
        sink,
        nudges,
        gateway,
    }
}
