//! Error taxonomy for the pricing core.
//!
//! Structural problems (missing priors, an inconsistent risk definition) are
//! fatal and stop the pipeline before any compute is spent. Data-quality
//! problems such as an unknown distribution family or a zero expected loss
//! never surface here: they degrade into fallbacks and sanity-check alerts.

use thiserror::Error;

use crate::types::Stage;

pub type Result<T> = std::result::Result<T, PricingError>;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("missing {which} prior at stage {stage}")]
    MissingPrior { stage: Stage, which: &'static str },

    #[error("invalid risk definition: {0}")]
    InvalidRiskDefinition(String),

    #[error("invalid prior: {0}")]
    InvalidPrior(String),

    #[error("{which} prior has already been revised")]
    PriorAlreadyRevised { which: &'static str },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("scenario export error: {0}")]
    Export(String),
}

impl PricingError {
    /// The pipeline stage this error belongs to. Configuration is checked
    /// before the pipeline starts, so `Config` has none.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PricingError::MissingPrior { stage, .. } => Some(*stage),
            PricingError::InvalidRiskDefinition(_) => Some(Stage::RiskDefinition),
            PricingError::InvalidPrior(_) | PricingError::PriorAlreadyRevised { .. } => {
                Some(Stage::Priors)
            }
            PricingError::InvalidParameter(_) => Some(Stage::Pricing),
            PricingError::Config(_) => None,
            PricingError::Export(_) => Some(Stage::Report),
        }
    }
}

impl From<csv::Error> for PricingError {
    fn from(e: csv::Error) -> Self {
        PricingError::Export(e.to_string())
    }
}

impl From<toml::de::Error> for PricingError {
    fn from(e: toml::de::Error) -> Self {
        PricingError::Config(e.to_string())
    }
}
