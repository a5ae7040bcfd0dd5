use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{
    CreditLedgerEntry, PriceBreakdown, RuleId, RuleStatus, SponsorId, SponsorshipQuote,
    SponsorshipRule, SponsorshipScope,
};
use crate::workflows::enrollment::domain::Program;
use crate::workflows::notify::{Notification, NotificationKind, NotificationSink};
use crate::workflows::store::StoreError;

/// A program-scoped sponsor may cover at most 4/5 of the list price.
const MAX_PRICE_SHARE_NUM: u64 = 4;
const MAX_PRICE_SHARE_DEN: u64 = 5;

/// Budget/seat fraction past which the sponsor gets a one-shot alert.
const LOW_BALANCE_NUM: u64 = 9;
const LOW_BALANCE_DEN: u64 = 10;

/// Storage abstraction for sponsorship rules and the sponsor credit ledger.
///
/// `debit` is an atomic bounded increment over both counters: it must refuse
/// with [`StoreError::QuotaExhausted`] when `budget_spent + amount` would
/// exceed `budget_total` or the seat allotment is used up, and otherwise
/// apply the budget debit and seat increment as one unit. `refund` is the
/// commutative inverse. `mark_low_budget_alerted` is a conditional
/// insert-if-absent returning `true` only for the first caller.
pub trait RuleStore: Send + Sync {
    /// Best live rule covering the program: scope and currency match, status
    /// is active, and the validity window contains `now`. Ties are broken by
    /// the highest per-participant contribution.
    fn eligible_rule(
        &self,
        program: &Program,
        now: DateTime<Utc>,
    ) -> Result<Option<SponsorshipRule>, StoreError>;
    fn fetch_rule(&self, id: &RuleId) -> Result<Option<SponsorshipRule>, StoreError>;
    fn insert_rule(&self, rule: SponsorshipRule) -> Result<SponsorshipRule, StoreError>;
    fn debit(&self, id: &RuleId, amount: u32) -> Result<SponsorshipRule, StoreError>;
    fn refund(&self, id: &RuleId, amount: u32) -> Result<(), StoreError>;
    fn update_status(&self, id: &RuleId, status: RuleStatus) -> Result<(), StoreError>;
    fn mark_low_budget_alerted(&self, id: &RuleId) -> Result<bool, StoreError>;
    fn credit_entry(&self, sponsor: &SponsorId) -> Result<Option<CreditLedgerEntry>, StoreError>;
    fn credit_use(&self, sponsor: &SponsorId, amount: u32) -> Result<(), StoreError>;
    fn credit_release(&self, sponsor: &SponsorId, amount: u32) -> Result<(), StoreError>;
}

/// Error raised by the quota ledger.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Budget or seats gone. Non-fatal: callers fall back to standard
    /// free/paid treatment.
    #[error("sponsorship quota exhausted")]
    Exhausted,
    #[error("sponsorship rule not found")]
    RuleNotFound,
    #[error("invalid rule transition {from:?} -> {to:?}")]
    InvalidTransition { from: RuleStatus, to: RuleStatus },
    #[error("contribution {found} exceeds the {cap} cap for this program")]
    ContributionCapExceeded { cap: u32, found: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Largest per-participant contribution a program-scoped rule may carry.
pub fn program_contribution_cap(list_price: u32) -> u32 {
    ((list_price as u64) * MAX_PRICE_SHARE_NUM / MAX_PRICE_SHARE_DEN) as u32
}

/// Pure quota math for one enrollment against one rule.
///
/// The sponsor covers its full per-participant contribution or none of it:
/// a rule without enough remaining budget for the whole contribution, or
/// without a free seat, is exhausted for this request.
pub fn apply_sponsorship(
    rule: &SponsorshipRule,
    list_price: u32,
) -> Result<SponsorshipQuote, QuotaError> {
    let sponsor_debit = rule.contribution.min(rule.remaining_budget());
    if sponsor_debit < rule.contribution || !rule.has_seat() {
        return Err(QuotaError::Exhausted);
    }

    Ok(SponsorshipQuote {
        rule_id: rule.id.clone(),
        sponsor: rule.sponsor.clone(),
        sponsor_label: rule.sponsor.0.clone(),
        sponsor_debit,
        member_owes: list_price.saturating_sub(rule.contribution),
    })
}

/// Running accounting of sponsorship budgets and seats.
pub struct QuotaLedger<S, N> {
    rules: Arc<S>,
    notifications: Arc<N>,
}

impl<S, N> QuotaLedger<S, N>
where
    S: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(rules: Arc<S>, notifications: Arc<N>) -> Self {
        Self {
            rules,
            notifications,
        }
    }

    /// Validate and persist a new rule. Program-scoped rules may not
    /// underwrite more than 80% of the program's list price, checked once
    /// here at creation time.
    pub fn register(
        &self,
        rule: SponsorshipRule,
        program: Option<&Program>,
    ) -> Result<SponsorshipRule, QuotaError> {
        if let SponsorshipScope::Program(_) = rule.scope {
            let cap = program_contribution_cap(program.map(|p| p.price).unwrap_or(0));
            if rule.contribution > cap {
                return Err(QuotaError::ContributionCapExceeded {
                    cap,
                    found: rule.contribution,
                });
            }
        }

        Ok(self.rules.insert_rule(rule)?)
    }

    /// Best-effort sponsorship offer for this program right now. `None` means
    /// no live rule applies or the matching rule is exhausted, and the caller
    /// falls back to standard free/paid treatment.
    pub fn quote(
        &self,
        program: &Program,
        now: DateTime<Utc>,
    ) -> Result<Option<SponsorshipQuote>, QuotaError> {
        let Some(rule) = self.rules.eligible_rule(program, now)? else {
            return Ok(None);
        };

        match apply_sponsorship(&rule, program.price) {
            Ok(mut quote) => {
                if let Some(name) = &program.sponsor_name {
                    quote.sponsor_label = name.clone();
                }
                Ok(Some(quote))
            }
            Err(QuotaError::Exhausted) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Debit the rule for one enrollment. Must be paired with a record
    /// insert; the caller compensates with [`QuotaLedger::release`] if that
    /// insert loses a duplicate race.
    pub fn reserve(&self, quote: &SponsorshipQuote) -> Result<SponsorshipRule, QuotaError> {
        let rule = match self.rules.debit(&quote.rule_id, quote.sponsor_debit) {
            Ok(rule) => rule,
            Err(StoreError::QuotaExhausted) => return Err(QuotaError::Exhausted),
            Err(StoreError::NotFound) => return Err(QuotaError::RuleNotFound),
            Err(other) => return Err(other.into()),
        };

        if let Err(err) = self.rules.credit_use(&rule.sponsor, quote.sponsor_debit) {
            warn!(rule = %rule.id.0, error = %err, "sponsor credit ledger update failed");
        }

        self.alert_if_low(&rule);
        Ok(rule)
    }

    /// Hand a reserved contribution back, freeing budget and seat.
    pub fn release(&self, quote: &SponsorshipQuote) -> Result<(), QuotaError> {
        self.rules.refund(&quote.rule_id, quote.sponsor_debit)?;
        if let Err(err) = self
            .rules
            .credit_release(&quote.sponsor, quote.sponsor_debit)
        {
            warn!(rule = %quote.rule_id.0, error = %err, "sponsor credit ledger release failed");
        }
        Ok(())
    }

    pub fn pause(&self, id: &RuleId) -> Result<(), QuotaError> {
        self.transition(id, RuleStatus::Paused)
    }

    pub fn resume(&self, id: &RuleId) -> Result<(), QuotaError> {
        self.transition(id, RuleStatus::Active)
    }

    pub fn end(&self, id: &RuleId) -> Result<(), QuotaError> {
        self.transition(id, RuleStatus::Ended)
    }

    pub fn credit_balance(
        &self,
        sponsor: &SponsorId,
    ) -> Result<Option<CreditLedgerEntry>, QuotaError> {
        Ok(self.rules.credit_entry(sponsor)?)
    }

    /// Price composition for display, with the sponsor share clamped to the
    /// list price.
    pub fn price_breakdown(program: &Program, quote: Option<&SponsorshipQuote>) -> PriceBreakdown {
        let sponsor_amount = quote
            .map(|q| q.sponsor_debit.min(program.price))
            .unwrap_or(0);
        let member_owes = program.price - sponsor_amount;
        PriceBreakdown {
            list_price: program.price,
            sponsor_amount,
            member_owes,
            fully_sponsored: program.price > 0 && member_owes == 0,
        }
    }

    fn transition(&self, id: &RuleId, next: RuleStatus) -> Result<(), QuotaError> {
        let rule = self
            .rules
            .fetch_rule(id)?
            .ok_or(QuotaError::RuleNotFound)?;
        if !rule.status.can_transition_to(next) {
            return Err(QuotaError::InvalidTransition {
                from: rule.status,
                to: next,
            });
        }
        self.rules.update_status(id, next)?;
        Ok(())
    }

    fn alert_if_low(&self, rule: &SponsorshipRule) {
        let budget_low = (rule.budget_spent as u64) * LOW_BALANCE_DEN
            >= (rule.budget_total as u64) * LOW_BALANCE_NUM;
        let seats_low = rule
            .max_participants
            .map(|max| (rule.participants_used as u64) * LOW_BALANCE_DEN >= (max as u64) * LOW_BALANCE_NUM)
            .unwrap_or(false);
        if !budget_low && !seats_low {
            return;
        }

        match self.rules.mark_low_budget_alerted(&rule.id) {
            Ok(true) => {
                let mut data = BTreeMap::new();
                data.insert("rule_id".to_string(), rule.id.0.clone());
                data.insert("budget_total".to_string(), rule.budget_total.to_string());
                data.insert("budget_spent".to_string(), rule.budget_spent.to_string());
                let notification = Notification {
                    recipient: rule.sponsor.0.clone(),
                    kind: NotificationKind::SponsorBudgetLow,
                    title: "Sponsorship budget running low".to_string(),
                    message: format!(
                        "Your sponsorship has used {} of {} {}. Top up to keep covering new participants.",
                        rule.budget_spent, rule.budget_total, rule.currency
                    ),
                    data,
                };
                if let Err(err) = self.notifications.notify(notification) {
                    warn!(rule = %rule.id.0, error = %err, "sponsor low-balance alert failed");
                }
            }
            Ok(false) => {}
            Err(err) => {
                warn!(rule = %rule.id.0, error = %err, "low-balance alert guard lookup failed");
            }
        }
    }
}
