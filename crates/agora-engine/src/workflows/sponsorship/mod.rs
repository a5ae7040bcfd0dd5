//! Sponsorship rules and the quota ledger that debits them.

pub mod domain;
pub mod ledger;

pub use domain::{
    CreditLedgerEntry, PriceBreakdown, RuleId, RuleStatus, SponsorId, SponsorshipQuote,
    SponsorshipRule, SponsorshipScope, ValidityWindow,
};
pub use ledger::{apply_sponsorship, program_contribution_cap, QuotaError, QuotaLedger, RuleStore};
