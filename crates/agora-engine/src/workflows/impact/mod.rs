//! Confidence-weighted impact validation for reported challenge completions,
//! plus the monthly handprint projection built from the validated records.

pub mod domain;
pub mod handprint;
pub mod router;
pub(crate) mod scoring;
pub mod service;

pub use domain::{
    CalculationMethod, ChallengeCompletion, ChallengeDefinition, ChallengeId, CompletionId,
    CompletionReport, EvidenceTier, ImpactCategory, ImpactRecord, MeasurementInput,
    ValidationOutcome, ValidationStatus,
};
pub use handprint::{Handprint, HandprintRank, TREE_CO2_KG};
pub use router::{impact_router, CompletionView};
pub use service::{
    CompletionStore, ImpactValidationService, TipContext, TipError, TipGenerator, ValidationError,
};
