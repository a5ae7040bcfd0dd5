use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::enrollment::domain::{CreatorId, UserId};

/// Identifier wrapper for challenge definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeId(pub String);

/// Identifier wrapper for completion attempts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionId(pub String);

/// Impact categories the handprint aggregates over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ImpactCategory {
    Transport,
    Energy,
    Waste,
    Water,
    Community,
}

impl ImpactCategory {
    pub const fn label(self) -> &'static str {
        match self {
            ImpactCategory::Transport => "transport",
            ImpactCategory::Energy => "energy",
            ImpactCategory::Waste => "waste",
            ImpactCategory::Water => "water",
            ImpactCategory::Community => "community",
        }
    }
}

/// Strength of the evidence backing a reported completion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceTier {
    Manual,
    Photo,
    ApiVerified,
    PeerVerified,
}

impl EvidenceTier {
    pub const fn label(self) -> &'static str {
        match self {
            EvidenceTier::Manual => "manual",
            EvidenceTier::Photo => "photo",
            EvidenceTier::ApiVerified => "api_verified",
            EvidenceTier::PeerVerified => "peer_verified",
        }
    }

    /// Base validation score for this tier.
    pub const fn base_score(self) -> f64 {
        match self {
            EvidenceTier::Manual => 0.6,
            EvidenceTier::Photo => 0.85,
            EvidenceTier::ApiVerified => 0.95,
            EvidenceTier::PeerVerified => 0.80,
        }
    }
}

/// How the raw impact amount is derived from the reported measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CalculationMethod {
    Distance { co2_per_km: f64 },
    Count { co2_per_unit: f64 },
    Volume { co2_per_liter: f64 },
    Fixed { amount: f64 },
}

/// A challenge as authored by a creator: the impact formula, the point base,
/// and optional per-tier impact multipliers rewarding stronger evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDefinition {
    pub id: ChallengeId,
    pub title: String,
    pub creator: CreatorId,
    pub category: ImpactCategory,
    pub method: CalculationMethod,
    pub base_points: u32,
    pub tier_multipliers: BTreeMap<EvidenceTier, f64>,
}

/// User-supplied measurement; missing fields fall back to method defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInput {
    pub distance_km: Option<f64>,
    pub unit_count: Option<u32>,
    pub volume_liters: Option<f64>,
}

/// One reported completion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub evidence: EvidenceTier,
    pub measurements: MeasurementInput,
    pub notes: Option<String>,
}

/// Confidence gate outcome for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Validated,
}

impl ValidationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Validated => "validated",
        }
    }
}

/// Stored record of a completion attempt. Created once, never mutated; a
/// re-attempt produces a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeCompletion {
    pub id: CompletionId,
    pub user_id: UserId,
    pub challenge_id: ChallengeId,
    pub evidence: EvidenceTier,
    pub impact_amount: f64,
    pub validation_score: f64,
    pub points_earned: u32,
    pub status: ValidationStatus,
    pub completed_at: DateTime<Utc>,
}

/// Denormalized monthly-aggregable record derived 1:1 from a validated
/// completion; used for reporting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    pub user_id: UserId,
    pub category: ImpactCategory,
    pub amount: f64,
    pub points: u32,
    pub confidence: f64,
    pub recorded_on: NaiveDate,
}

/// What the validation pipeline hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub completion: ChallengeCompletion,
    pub feedback: String,
}
