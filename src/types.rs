use std::fmt;

use serde::{Deserialize, Serialize};

/// Zero-based index of a simulated year within a scenario set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearIndex(pub u32);

impl YearIndex {
    /// Sub-stream id for this year's RNG. Each year draws from its own ChaCha
    /// stream so the base pass gives the same bytes however it is sharded.
    pub fn stream(self) -> u64 {
        self.0 as u64
    }
}

/// Position of an event within its year. Events cloned by the tail pass are
/// numbered after the year's original events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventIndex(pub u32);

/// Risk classification derived from CoV and PML ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::VeryHigh => "VERY_HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RiskDefinition,
    Priors,
    Scenarios,
    Pricing,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::RiskDefinition => "risk_definition",
            Stage::Priors => "priors",
            Stage::Scenarios => "scenarios",
            Stage::Pricing => "pricing",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}
