use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for marketplace programs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub String);

/// Identifier wrapper for member accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for content creators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatorId(pub String);

/// Lifecycle status of a program listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Draft,
    Published,
    Sponsored,
    Full,
}

impl ProgramStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProgramStatus::Draft => "draft",
            ProgramStatus::Published => "published",
            ProgramStatus::Sponsored => "sponsored",
            ProgramStatus::Full => "full",
        }
    }
}

/// Program snapshot the decision logic runs against. Prices are integer minor
/// units; a price of zero means the program is free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub title: String,
    pub creator: CreatorId,
    pub price: u32,
    pub currency: String,
    pub capacity: Option<u32>,
    pub current_participants: u32,
    pub published: bool,
    pub status: ProgramStatus,
    pub sponsor_name: Option<String>,
}

impl Program {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }

    /// Whether the listing is visible for enrollment at all.
    pub fn is_open_for_enrollment(&self) -> bool {
        self.published
            || matches!(
                self.status,
                ProgramStatus::Published | ProgramStatus::Sponsored
            )
    }

    /// Capacity check against the current participant count.
    pub fn has_free_seat(&self) -> bool {
        if self.status == ProgramStatus::Full {
            return false;
        }
        match self.capacity {
            Some(capacity) => self.current_participants < capacity,
            None => true,
        }
    }
}

/// How an enrollment was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Free,
    Paid,
    Sponsored,
}

impl AccessType {
    pub const fn label(self) -> &'static str {
        match self {
            AccessType::Free => "free",
            AccessType::Paid => "paid",
            AccessType::Sponsored => "sponsored",
        }
    }
}

/// One member's access to one program. The (program, member) pair is unique
/// for the lifetime of the store; records are created once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub program_id: ProgramId,
    pub user_id: UserId,
    pub access: AccessType,
    pub amount_paid: u32,
    pub enrolled_at: DateTime<Utc>,
}

/// Payment/sponsorship treatment attached to an enrollment decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Treatment {
    Free,
    Paid { price: u32 },
    Sponsored { sponsor: String, member_owes: u32 },
    Full,
    Unavailable,
    Open,
}

impl Treatment {
    pub const fn label(&self) -> &'static str {
        match self {
            Treatment::Free => "free",
            Treatment::Paid { .. } => "paid",
            Treatment::Sponsored { .. } => "sponsored",
            Treatment::Full => "full",
            Treatment::Unavailable => "unavailable",
            Treatment::Open => "open",
        }
    }
}

/// Outcome of the eligibility + treatment check for one (program, member).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentDecision {
    pub allowed: bool,
    pub treatment: Treatment,
    pub reason: &'static str,
}

impl EnrollmentDecision {
    pub(crate) fn eligible(treatment: Treatment) -> Self {
        Self {
            allowed: true,
            treatment,
            reason: "ok",
        }
    }

    pub(crate) fn blocked(treatment: Treatment, reason: &'static str) -> Self {
        Self {
            allowed: false,
            treatment,
            reason,
        }
    }
}
