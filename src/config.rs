use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result};
use crate::pricer::{PricingParams, StressShock, SweepParameter};
use crate::scenario::DEFAULT_YEARS;

/// Run-level settings for one pricing pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub seed: u64,
    pub years: u32,
    pub include_tail_scenarios: bool,
    pub market_risk_premium: f64,
    pub tail_padding: bool,
    pub confidence_level: f64,
    /// Shard the base pass across rayon workers.
    pub parallel: bool,
    /// Named stress shocks and their factors.
    pub stress: BTreeMap<String, f64>,
    /// Sensitivity grid keyed by parameter name.
    pub sweep: BTreeMap<String, Vec<f64>>,
}

impl PricingConfig {
    pub fn canonical() -> Self {
        let stress = StressShock::standard().into_iter().map(|s| (s.name, s.factor)).collect();
        let sweep = SweepParameter::standard_grid()
            .into_iter()
            .map(|(p, values)| (p.as_str().to_string(), values))
            .collect();
        PricingConfig {
            seed: 42,
            years: DEFAULT_YEARS,
            include_tail_scenarios: true,
            market_risk_premium: 0.15,
            tail_padding: true,
            confidence_level: 0.99,
            parallel: true,
            stress,
            sweep,
        }
    }

    /// Parse a TOML document; keys it omits keep their canonical values.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: PricingConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.years == 0 {
            return Err(PricingError::Config("years must be positive".to_string()));
        }
        self.pricing_params()
            .validate()
            .map_err(|e| PricingError::Config(e.to_string()))?;
        self.sweep_ranges().map(|_| ())
    }

    pub fn pricing_params(&self) -> PricingParams {
        PricingParams {
            market_risk_premium: self.market_risk_premium,
            tail_padding: self.tail_padding,
            confidence_level: self.confidence_level,
        }
    }

    pub fn stress_shocks(&self) -> Vec<StressShock> {
        self.stress.iter().map(|(name, &factor)| StressShock::named(name, factor)).collect()
    }

    pub fn sweep_ranges(&self) -> Result<Vec<(SweepParameter, Vec<f64>)>> {
        self.sweep
            .iter()
            .map(|(name, values)| {
                let parameter = name.parse::<SweepParameter>().map_err(|e| PricingError::Config(e.to_string()))?;
                Ok((parameter, values.clone()))
            })
            .collect()
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self::canonical()
    }
}
