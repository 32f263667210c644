use serde::{Deserialize, Serialize};

use crate::domain::RiskLevel;

pub const DRY_BELOW_PCT: f64 = 30.0;
pub const WET_FROM_PCT: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoilCategory {
    Dry,
    Moderate,
    Wet,
}

pub fn soil_category(moisture_pct: f64) -> SoilCategory {
    if moisture_pct < DRY_BELOW_PCT {
        SoilCategory::Dry
    } else if moisture_pct < WET_FROM_PCT {
        SoilCategory::Moderate
    } else {
        SoilCategory::Wet
    }
}

/// Weight a field-level risk by one probe's soil moisture
///
/// Wet soil raises the level one step, dry soil lowers it one step; a NORMAL
/// field stays NORMAL regardless of moisture.
pub fn grid_risk(field_risk: RiskLevel, moisture_pct: f64) -> RiskLevel {
    use RiskLevel::*;
    use SoilCategory::*;

    match (field_risk, soil_category(moisture_pct)) {
        (Normal, _) => Normal,

        (Watch, Wet) => Warning,
        (Watch, Moderate) => Watch,
        (Watch, Dry) => Normal,

        (Warning, Wet) => High,
        (Warning, Moderate) => Warning,
        (Warning, Dry) => Watch,

        (High, Dry) => Warning,
        (High, _) => High,
    }
}
