use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::enrollment::domain::{CreatorId, ProgramId};

/// Identifier wrapper for sponsorship rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// Identifier wrapper for sponsor accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SponsorId(pub String);

/// Granularity at which a sponsor's contribution rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "scope_id", rename_all = "snake_case")]
pub enum SponsorshipScope {
    Program(ProgramId),
    Category(String),
    Creator(CreatorId),
    Event(String),
}

/// Lifecycle status of a sponsorship rule. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Paused,
    Ended,
}

impl RuleStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Paused => "paused",
            RuleStatus::Ended => "ended",
        }
    }

    /// Allowed transitions: active <-> paused, either -> ended.
    pub fn can_transition_to(self, next: RuleStatus) -> bool {
        match (self, next) {
            (RuleStatus::Active, RuleStatus::Paused) => true,
            (RuleStatus::Paused, RuleStatus::Active) => true,
            (RuleStatus::Active, RuleStatus::Ended) => true,
            (RuleStatus::Paused, RuleStatus::Ended) => true,
            _ => false,
        }
    }
}

/// Optional validity window for a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if now < self.start {
            return false;
        }
        match self.end {
            Some(end) => now <= end,
            None => true,
        }
    }
}

/// A sponsor's standing offer to cover part of the list price for every
/// qualifying enrollment inside a scope, bounded by a total budget and an
/// optional seat allotment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorshipRule {
    pub id: RuleId,
    pub sponsor: SponsorId,
    pub scope: SponsorshipScope,
    pub contribution: u32,
    pub currency: String,
    pub budget_total: u32,
    pub budget_spent: u32,
    pub max_participants: Option<u32>,
    pub participants_used: u32,
    pub window: Option<ValidityWindow>,
    pub status: RuleStatus,
}

impl SponsorshipRule {
    pub fn remaining_budget(&self) -> u32 {
        self.budget_total.saturating_sub(self.budget_spent)
    }

    pub fn has_seat(&self) -> bool {
        match self.max_participants {
            Some(max) => self.participants_used < max,
            None => true,
        }
    }

    /// Whether the rule can back a new enrollment at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        if self.status != RuleStatus::Active {
            return false;
        }
        match &self.window {
            Some(window) => window.contains(now),
            None => true,
        }
    }
}

/// Sponsor-level parallel accounting: `available() = total - used`, updated
/// only by the quota ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    pub sponsor: SponsorId,
    pub total: u32,
    pub used: u32,
}

impl CreditLedgerEntry {
    pub fn available(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}

/// What one qualifying enrollment costs the sponsor and the member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorshipQuote {
    pub rule_id: RuleId,
    pub sponsor: SponsorId,
    pub sponsor_label: String,
    pub sponsor_debit: u32,
    pub member_owes: u32,
}

/// Price composition shown to the member before they commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub list_price: u32,
    pub sponsor_amount: u32,
    pub member_owes: u32,
    pub fully_sponsored: bool,
}
