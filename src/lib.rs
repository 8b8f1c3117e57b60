pub mod analysis;
pub mod config;
pub mod error;
pub mod export;
pub mod peril;
pub mod pipeline;
pub mod pricer;
pub mod priors;
pub mod report;
pub mod scenario;
pub mod types;

pub use config::PricingConfig;
pub use error::{PricingError, Result};
pub use pipeline::{PipelineReport, PricingRequest, price_request};
