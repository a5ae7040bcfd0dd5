use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use clap::Args;

use agora_engine::error::AppError;
use agora_engine::workflows::enrollment::{
    CheckoutService, CreatorId, EnrollmentError, EnrollmentService, Program, ProgramId,
    ProgramStatus, SettlementStore, UserId,
};
use agora_engine::workflows::impact::{
    CalculationMethod, ChallengeDefinition, ChallengeId, CompletionReport, EvidenceTier,
    ImpactCategory, ImpactValidationService, MeasurementInput,
};
use agora_engine::workflows::notify::NotificationOutbox;
use agora_engine::workflows::nudges::{NudgeEngine, NudgeThresholds, NudgeTrigger};
use agora_engine::workflows::sponsorship::{
    CreditLedgerEntry, QuotaLedger, RuleId, RuleStatus, SponsorId, SponsorshipRule,
    SponsorshipScope,
};

use crate::infra::{
    CannedTipGenerator, InMemoryLedger, InMemoryNotificationSink, InMemoryRuleStore,
    MockPaymentGateway,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Member identifier used for every demo enrollment
    #[arg(long, default_value = "anna")]
    pub(crate) member: String,
}

struct DemoStack {
    ledger: Arc<InMemoryLedger>,
    rules: Arc<InMemoryRuleStore>,
    sink: Arc<InMemoryNotificationSink>,
    outbox: Arc<NotificationOutbox>,
    enrollments: Arc<EnrollmentService<InMemoryLedger, InMemoryRuleStore, NotificationOutbox>>,
    checkout: Arc<CheckoutService<InMemoryLedger, InMemoryRuleStore, NotificationOutbox>>,
    impact: Arc<ImpactValidationService<InMemoryLedger>>,
    quota: Arc<QuotaLedger<InMemoryRuleStore, NotificationOutbox>>,
}

fn build_stack() -> DemoStack {
    let ledger = Arc::new(InMemoryLedger::default());
    let rules = Arc::new(InMemoryRuleStore::default());
    let sink = Arc::new(InMemoryNotificationSink::default());
    let outbox = Arc::new(NotificationOutbox::default());
    let quota = Arc::new(QuotaLedger::new(rules.clone(), outbox.clone()));
    let nudges: Arc<dyn NudgeTrigger> = Arc::new(NudgeEngine::new(
        ledger.clone(),
        outbox.clone(),
        NudgeThresholds::default(),
    ));

    let enrollments = Arc::new(EnrollmentService::new(
        ledger.clone(),
        quota.clone(),
        outbox.clone(),
        nudges.clone(),
    ));
    let checkout = Arc::new(CheckoutService::new(
        ledger.clone(),
        quota.clone(),
        Box::new(MockPaymentGateway::default()),
        outbox.clone(),
        nudges.clone(),
    ));
    let impact = Arc::new(ImpactValidationService::new(
        ledger.clone(),
        Box::new(CannedTipGenerator),
        nudges,
    ));

    DemoStack {
        ledger,
        rules,
        sink,
        outbox,
        enrollments,
        checkout,
        impact,
        quota,
    }
}

fn seed_catalog(stack: &DemoStack) {
    let creator = CreatorId("marta".to_string());

    stack.ledger.seed_program(Program {
        id: ProgramId("composting-basics".to_string()),
        title: "Composting basics".to_string(),
        creator: creator.clone(),
        price: 0,
        currency: "HUF".to_string(),
        capacity: Some(12),
        current_participants: 0,
        published: true,
        status: ProgramStatus::Published,
        sponsor_name: None,
    });
    stack.ledger.seed_program(Program {
        id: ProgramId("workshop-secrets".to_string()),
        title: "Workshop secrets".to_string(),
        creator: creator.clone(),
        price: 5000,
        currency: "HUF".to_string(),
        capacity: None,
        current_participants: 0,
        published: true,
        status: ProgramStatus::Published,
        sponsor_name: None,
    });
    stack.ledger.seed_program(Program {
        id: ProgramId("river-cleanup".to_string()),
        title: "River cleanup training".to_string(),
        creator: creator.clone(),
        price: 4000,
        currency: "HUF".to_string(),
        capacity: Some(30),
        current_participants: 0,
        published: true,
        status: ProgramStatus::Sponsored,
        sponsor_name: Some("Green Mill Kft.".to_string()),
    });
    stack.ledger.seed_rating(creator, 4.6);

    stack.rules.seed_rule(SponsorshipRule {
        id: RuleId("green-mill-river".to_string()),
        sponsor: SponsorId("green-mill".to_string()),
        scope: SponsorshipScope::Program(ProgramId("river-cleanup".to_string())),
        contribution: 2000,
        currency: "HUF".to_string(),
        budget_total: 10_000,
        budget_spent: 0,
        max_participants: Some(4),
        participants_used: 0,
        window: None,
        status: RuleStatus::Active,
    });
    stack.rules.seed_credit(CreditLedgerEntry {
        sponsor: SponsorId("green-mill".to_string()),
        total: 50_000,
        used: 0,
    });

    let mut tier_multipliers = BTreeMap::new();
    tier_multipliers.insert(EvidenceTier::Photo, 1.2);
    stack.ledger.seed_challenge(ChallengeDefinition {
        id: ChallengeId("bike-to-work".to_string()),
        title: "Bike to work".to_string(),
        creator: CreatorId("marta".to_string()),
        category: ImpactCategory::Transport,
        method: CalculationMethod::Distance { co2_per_km: 0.21 },
        base_points: 100,
        tier_multipliers,
    });
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let stack = build_stack();
    seed_catalog(&stack);
    let member = UserId(args.member);

    println!("=== Enrollment decisions ===");
    for program_id in ["composting-basics", "workshop-secrets", "river-cleanup"] {
        let id = ProgramId(program_id.to_string());
        let (decision, breakdown) = stack.enrollments.options(&id, &member)?;
        println!(
            "{program_id}: treatment={} reason={} list_price={} member_owes={}",
            decision.treatment.label(),
            decision.reason,
            breakdown.list_price,
            breakdown.member_owes
        );
    }

    println!("\n=== Free enrollment ===");
    let record = stack
        .enrollments
        .enroll_free(&ProgramId("composting-basics".to_string()), &member)?;
    println!(
        "{} enrolled in composting-basics ({})",
        record.user_id.0,
        record.access.label()
    );
    if let Some(program) = stack.ledger.program(&ProgramId("composting-basics".to_string())) {
        println!(
            "composting-basics now has {} of {} seats taken",
            program.current_participants,
            program.capacity.unwrap_or(0)
        );
    }

    println!("\n=== Paid checkout ===");
    let handle = stack.checkout.start_checkout(
        &ProgramId("workshop-secrets".to_string()),
        &member,
        "https://agora.example/done",
        "https://agora.example/back",
    )?;
    println!("redirecting member to {}", handle.redirect_url);
    let record = stack.checkout.finalize(&handle.reference)?;
    if let Some(settlement) = stack
        .ledger
        .fetch_settlement(&handle.reference)
        .map_err(EnrollmentError::from)?
    {
        println!(
            "confirmed: paid {} {}, creator share {}, platform fee {}",
            settlement.amount,
            settlement.currency,
            settlement.creator_amount,
            settlement.platform_fee
        );
    }
    println!("access type: {}", record.access.label());

    println!("\n=== Sponsored checkout ===");
    let handle = stack.checkout.start_checkout(
        &ProgramId("river-cleanup".to_string()),
        &member,
        "https://agora.example/done",
        "https://agora.example/back",
    )?;
    let record = stack.checkout.finalize(&handle.reference)?;
    println!(
        "access type: {} (member paid the list price minus the sponsor share)",
        record.access.label()
    );
    if let Some(balance) = stack
        .quota
        .credit_balance(&SponsorId("green-mill".to_string()))?
    {
        println!(
            "sponsor credit: total {} used {} available {}",
            balance.total,
            balance.used,
            balance.available()
        );
    }

    println!("\n=== Challenge completion ===");
    let outcome = stack.impact.validate(CompletionReport {
        challenge_id: ChallengeId("bike-to-work".to_string()),
        user_id: member.clone(),
        evidence: EvidenceTier::Photo,
        measurements: MeasurementInput {
            distance_km: Some(25.0),
            ..MeasurementInput::default()
        },
        notes: Some("Cycled the river route all week".to_string()),
    })?;
    println!(
        "impact {} kg CO2, score {}, points {}, status {}",
        outcome.completion.impact_amount,
        outcome.completion.validation_score,
        outcome.completion.points_earned,
        outcome.completion.status.label()
    );
    println!("feedback: {}", outcome.feedback);

    println!("\n=== Monthly handprint ===");
    let handprint = stack
        .impact
        .monthly_handprint(&member, Utc::now().date_naive())?;
    println!(
        "total {} kg CO2 across {} activities, {} tree(s), rank {}",
        handprint.total_co2,
        handprint.activity_count,
        handprint.trees_equivalent,
        handprint.rank.label()
    );

    println!("\n=== Outbound notifications ===");
    let report = stack.outbox.drain(stack.sink.as_ref());
    println!(
        "outbox drained: {} delivered, {} requeued",
        report.delivered, report.requeued
    );
    for notification in stack.sink.events() {
        println!(
            "[{}] to {}: {}",
            notification.kind.label(),
            notification.recipient,
            notification.message
        );
    }

    Ok(())
}
