//! Five-stage pricing pipeline: risk definition, priors, scenarios, pricing,
//! report. Stages run in order and the first error stops the run.

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::PricingConfig;
use crate::error::{PricingError, Result};
use crate::peril::RiskDefinition;
use crate::pricer::{Pricer, PricingResult};
use crate::priors::{FrequencyPrior, SeverityPrior};
use crate::report::{self, AuditTrail, PricingTableRow, SanityDashboard};
use crate::scenario::{BuiltinTailCatalog, ScenarioGenerator, ScenarioSet, TailScenario, TailScenarioSource};
use crate::types::Stage;

/// Inputs supplied by the prior-knowledge oracle for one quote.
#[derive(Debug, Clone, Default)]
pub struct PricingRequest {
    pub user_input: String,
    pub risk_definition: Option<RiskDefinition>,
    pub frequency_prior: Option<FrequencyPrior>,
    pub severity_prior: Option<SeverityPrior>,
    /// Oracle tail scenarios; the built-in catalog is used when absent.
    pub tail_scenarios: Option<Vec<TailScenario>>,
}

impl PricingRequest {
    /// A request filled entirely from the built-in per-peril tables.
    pub fn builtin(peril: &str, region: &str, user_input: &str) -> Self {
        let definition = RiskDefinition::builtin(peril, region);
        let trigger = definition.limits.trigger();
        let severity = SeverityPrior::builtin(peril, &trigger.metric, &trigger.unit);
        PricingRequest {
            user_input: user_input.to_string(),
            frequency_prior: Some(FrequencyPrior::builtin(peril)),
            severity_prior: Some(severity),
            risk_definition: Some(definition),
            tail_scenarios: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub scenarios: ScenarioSet,
    pub pricing: PricingResult,
    pub dashboard: SanityDashboard,
    pub table: PricingTableRow,
    pub summary: String,
    pub audit: AuditTrail,
}

#[instrument(skip_all, fields(seed = config.seed, years = config.years))]
pub fn price_request(request: PricingRequest, config: &PricingConfig) -> Result<PipelineReport> {
    let result = run(request, config);
    if let Err(e) = &result {
        match e.stage() {
            Some(stage) => error!(%stage, "pipeline aborted: {e}"),
            None => error!("pipeline aborted: {e}"),
        }
    }
    result
}

fn run(request: PricingRequest, config: &PricingConfig) -> Result<PipelineReport> {
    let definition = risk_definition_stage(request.risk_definition)?;
    let (frequency, severity) = priors_stage(request.frequency_prior, request.severity_prior)?;
    let scenarios = scenario_stage(&definition, &frequency, &severity, request.tail_scenarios.as_ref(), config)?;
    let pricing = pricing_stage(&scenarios, &definition.peril, config)?;

    info!(stage = %Stage::Report, "building report");
    let dashboard = SanityDashboard::build(&pricing);
    let table = PricingTableRow::from_result(&pricing);
    let summary = report::executive_summary(&pricing, &definition, &dashboard);
    let audit = AuditTrail::new(&request.user_input, &definition, &frequency, &severity, &scenarios, &pricing);

    Ok(PipelineReport { scenarios, pricing, dashboard, table, summary, audit })
}

#[instrument(skip_all)]
fn risk_definition_stage(definition: Option<RiskDefinition>) -> Result<RiskDefinition> {
    let definition = definition.ok_or_else(|| {
        PricingError::InvalidRiskDefinition("no risk definition supplied".to_string())
    })?;
    definition.validate()?;
    info!(peril = %definition.peril, region = %definition.region, "risk definition accepted");
    Ok(definition)
}

#[instrument(skip_all)]
fn priors_stage(
    frequency: Option<FrequencyPrior>,
    severity: Option<SeverityPrior>,
) -> Result<(FrequencyPrior, SeverityPrior)> {
    let frequency = frequency.ok_or(PricingError::MissingPrior { stage: Stage::Priors, which: "frequency" })?;
    let severity = severity.ok_or(PricingError::MissingPrior { stage: Stage::Priors, which: "severity" })?;
    frequency.validate()?;
    severity.validate()?;
    info!(
        frequency = %frequency.estimate.distribution,
        severity = %severity.estimate.distribution,
        "priors accepted"
    );
    Ok((frequency, severity))
}

#[instrument(skip_all)]
fn scenario_stage(
    definition: &RiskDefinition,
    frequency: &FrequencyPrior,
    severity: &SeverityPrior,
    oracle_tail: Option<&Vec<TailScenario>>,
    config: &PricingConfig,
) -> Result<ScenarioSet> {
    let generator = ScenarioGenerator::new(definition, frequency, severity, config.seed).parallel(config.parallel);
    let builtin = BuiltinTailCatalog;
    let tail: Option<&dyn TailScenarioSource> = match (config.include_tail_scenarios, oracle_tail) {
        (false, _) => None,
        (true, Some(scenarios)) => Some(scenarios),
        (true, None) => Some(&builtin),
    };
    generator.generate(config.years, tail)
}

#[instrument(skip_all)]
fn pricing_stage(scenarios: &ScenarioSet, peril: &str, config: &PricingConfig) -> Result<PricingResult> {
    Pricer::new(config.pricing_params())?.price(scenarios, peril)
}
