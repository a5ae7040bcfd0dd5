use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{ImpactCategory, ImpactRecord};

/// Kilograms of CO2 one tree binds per year; used for the trees-equivalent
/// figure.
pub const TREE_CO2_KG: f64 = 21.77;

/// Rank ladder over the monthly CO2 total, thresholds exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandprintRank {
    Starter,
    EcoWarrior,
    GreenActivist,
    EnvironmentalChampion,
    SustainabilityHero,
}

impl HandprintRank {
    pub fn for_total(total_co2: f64) -> Self {
        if total_co2 > 1000.0 {
            HandprintRank::SustainabilityHero
        } else if total_co2 > 500.0 {
            HandprintRank::EnvironmentalChampion
        } else if total_co2 > 200.0 {
            HandprintRank::GreenActivist
        } else if total_co2 > 50.0 {
            HandprintRank::EcoWarrior
        } else {
            HandprintRank::Starter
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            HandprintRank::Starter => "starter",
            HandprintRank::EcoWarrior => "eco_warrior",
            HandprintRank::GreenActivist => "green_activist",
            HandprintRank::EnvironmentalChampion => "environmental_champion",
            HandprintRank::SustainabilityHero => "sustainability_hero",
        }
    }
}

/// Read-side projection of a member's validated impact inside one calendar
/// month. Not a stored entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handprint {
    pub categories: BTreeMap<ImpactCategory, f64>,
    pub total_co2: f64,
    pub total_points: u64,
    pub trees_equivalent: u32,
    pub rank: HandprintRank,
    pub activity_count: usize,
}

/// Sum records (already filtered to the month window by the store) into
/// category totals, the trees-equivalent figure, and the rank.
pub fn assemble(records: &[ImpactRecord]) -> Handprint {
    let mut categories: BTreeMap<ImpactCategory, f64> = BTreeMap::new();
    let mut total_co2 = 0.0;
    let mut total_points: u64 = 0;

    for record in records {
        *categories.entry(record.category).or_insert(0.0) += record.amount;
        total_co2 += record.amount;
        total_points += u64::from(record.points);
    }

    for amount in categories.values_mut() {
        *amount = round_two(*amount);
    }
    let total_co2 = round_two(total_co2);

    Handprint {
        categories,
        total_co2,
        total_points,
        trees_equivalent: (total_co2 / TREE_CO2_KG).round() as u32,
        rank: HandprintRank::for_total(total_co2),
        activity_count: records.len(),
    }
}

fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
