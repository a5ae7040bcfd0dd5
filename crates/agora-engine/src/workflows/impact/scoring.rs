use super::domain::{CalculationMethod, ChallengeDefinition, CompletionReport};

/// Fallbacks applied when the member reports no measurement. Low-trust input
/// is already discounted by the confidence score, so missing input degrades
/// instead of failing.
const DEFAULT_DISTANCE_KM: f64 = 10.0;
const DEFAULT_UNIT_COUNT: u32 = 1;
const DEFAULT_VOLUME_LITERS: f64 = 500.0;

/// Numeric result of the scoring pipeline. Rounding happens exactly once, on
/// the way out of this function: two decimals for the impact amount, nearest
/// integer for points.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoreBreakdown {
    pub impact_amount: f64,
    pub validation_score: f64,
    pub points_earned: u32,
    pub feedback: String,
}

pub(crate) fn score_completion(
    definition: &ChallengeDefinition,
    report: &CompletionReport,
) -> ScoreBreakdown {
    let raw_impact = match definition.method {
        CalculationMethod::Distance { co2_per_km } => {
            report.measurements.distance_km.unwrap_or(DEFAULT_DISTANCE_KM) * co2_per_km
        }
        CalculationMethod::Count { co2_per_unit } => {
            f64::from(report.measurements.unit_count.unwrap_or(DEFAULT_UNIT_COUNT)) * co2_per_unit
        }
        CalculationMethod::Volume { co2_per_liter } => {
            report
                .measurements
                .volume_liters
                .unwrap_or(DEFAULT_VOLUME_LITERS)
                * co2_per_liter
        }
        CalculationMethod::Fixed { amount } => amount,
    };

    let validation_score = report.evidence.base_score();
    let multiplier = definition
        .tier_multipliers
        .get(&report.evidence)
        .copied()
        .unwrap_or(1.0);

    let impact_amount = round_two(raw_impact * multiplier);
    let points_earned = (f64::from(definition.base_points) * validation_score).round() as u32;

    ScoreBreakdown {
        impact_amount,
        validation_score,
        points_earned,
        feedback: tier_feedback(report, multiplier),
    }
}

fn tier_feedback(report: &CompletionReport, multiplier: f64) -> String {
    use super::domain::EvidenceTier;

    let mut feedback = match report.evidence {
        EvidenceTier::Manual => {
            "Logged from manual entry. Try photo evidence next time for a confidence bonus."
                .to_string()
        }
        EvidenceTier::Photo => "Photo evidence confirmed - great work!".to_string(),
        EvidenceTier::ApiVerified => "Verified through a connected service - excellent!".to_string(),
        EvidenceTier::PeerVerified => "Confirmed by the community - well done!".to_string(),
    };

    if multiplier > 1.0 {
        let bonus = ((multiplier - 1.0) * 100.0).round() as i64;
        feedback.push_str(&format!(" {bonus}% impact bonus applied."));
    }

    feedback
}

fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
