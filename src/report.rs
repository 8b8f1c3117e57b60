//! Sanity validation, reporting and the audit trail.

use std::fmt;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PricingError, Result};
use crate::peril::RiskDefinition;
use crate::pricer::{PricingResult, TAIL_PADDING_FLOOR, format_currency};
use crate::priors::{FrequencyPrior, ResolvedPrior, SeverityPrior};
use crate::scenario::{ScenarioSet, ScenarioSummary};
use crate::types::RiskLevel;

const MAX_PML_RATIO: f64 = 100.0;
const MAX_COV: f64 = 5.0;
const MAX_RISK_LOAD: f64 = 2.0;

const ALERT_COV: f64 = 1.0;
const ALERT_PML: f64 = 20.0;
const ALERT_RISK_LOAD: f64 = 0.15;

// ── Sanity checks ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityChecks {
    pub tail_padding: bool,
    pub premium_consistency: bool,
    pub var_tvar_consistency: bool,
    pub pml_ratio_reasonable: bool,
    pub cov_reasonable: bool,
    pub positive_el: bool,
    pub risk_load_range: bool,
}

impl SanityChecks {
    pub fn evaluate(r: &PricingResult) -> Self {
        let padding_amount = r.gross_premium - r.net_premium;
        SanityChecks {
            tail_padding: r.risk_load >= TAIL_PADDING_FLOOR
                || padding_amount >= TAIL_PADDING_FLOOR * r.expected_loss,
            premium_consistency: r.gross_premium >= r.net_premium,
            var_tvar_consistency: r.tvar_99 >= r.var_99,
            pml_ratio_reasonable: r.pml_ratio() < MAX_PML_RATIO,
            cov_reasonable: r.coefficient_of_variation < MAX_COV,
            positive_el: r.expected_loss > 0.0,
            risk_load_range: (0.0..=MAX_RISK_LOAD).contains(&r.risk_load),
        }
    }

    /// Named results in a fixed order.
    pub fn entries(&self) -> [(&'static str, bool); 7] {
        [
            ("tail_padding", self.tail_padding),
            ("premium_consistency", self.premium_consistency),
            ("var_tvar_consistency", self.var_tvar_consistency),
            ("pml_ratio_reasonable", self.pml_ratio_reasonable),
            ("cov_reasonable", self.cov_reasonable),
            ("positive_el", self.positive_el),
            ("risk_load_range", self.risk_load_range),
        ]
    }

    pub fn passed(&self) -> usize {
        self.entries().iter().filter(|(_, ok)| *ok).count()
    }

    pub fn total(&self) -> usize {
        self.entries().len()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    pub fn failed(&self) -> Vec<&'static str> {
        self.entries().iter().filter(|(_, ok)| !ok).map(|(name, _)| *name).collect()
    }
}

// ── Alerts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    HighVolatility { cov: f64 },
    HighPmlRatio { pml_ratio: f64 },
    LowRiskLoad { risk_load: f64 },
    VeryHighRisk,
    NonPositiveExpectedLoss { expected_loss: f64 },
}

impl Alert {
    pub fn for_result(r: &PricingResult) -> Vec<Alert> {
        let mut alerts = Vec::new();
        if r.coefficient_of_variation > ALERT_COV {
            alerts.push(Alert::HighVolatility { cov: r.coefficient_of_variation });
        }
        let pml = r.pml_ratio();
        if pml > ALERT_PML {
            alerts.push(Alert::HighPmlRatio { pml_ratio: pml });
        }
        if r.risk_load < ALERT_RISK_LOAD {
            alerts.push(Alert::LowRiskLoad { risk_load: r.risk_load });
        }
        if r.risk_level == RiskLevel::VeryHigh {
            alerts.push(Alert::VeryHighRisk);
        }
        if r.expected_loss <= 0.0 {
            alerts.push(Alert::NonPositiveExpectedLoss { expected_loss: r.expected_loss });
        }
        alerts
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            Alert::VeryHighRisk => AlertSeverity::Critical,
            Alert::NonPositiveExpectedLoss { .. } => AlertSeverity::Error,
            _ => AlertSeverity::Warning,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::HighVolatility { cov } => {
                write!(f, "High volatility (CoV: {cov:.2}): portfolio diversification needed")
            }
            Alert::HighPmlRatio { pml_ratio } => {
                write!(f, "High PML ratio ({pml_ratio:.1}x): consider reinsurance")
            }
            Alert::LowRiskLoad { risk_load } => {
                write!(f, "Low risk load ({risk_load:.2}): tail risk may be underestimated")
            }
            Alert::VeryHighRisk => f.write_str("Very high risk: re-evaluate the product before launch"),
            Alert::NonPositiveExpectedLoss { .. } => {
                f.write_str("Expected loss is zero or negative: review the model")
            }
        }
    }
}

// ── Benchmarks ──────────────────────────────────────────────────────────────

/// Typical market ranges for a peril, shown next to the computed metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndustryBenchmark {
    pub typical_el_range: (f64, f64),
    pub typical_cov_range: (f64, f64),
    pub typical_risk_load: f64,
    pub market_premium_range: (f64, f64),
}

impl IndustryBenchmark {
    pub fn for_peril(peril: &str) -> Self {
        let (el, cov, load, market) = match peril {
            "typhoon" => ((50_000.0, 200_000.0), (0.4, 0.8), 0.35, (0.15, 0.25)),
            "flight_delay" => ((10_000.0, 50_000.0), (0.3, 0.6), 0.25, (0.10, 0.20)),
            "server_downtime" => ((5_000.0, 100_000.0), (0.5, 1.0), 0.40, (0.20, 0.30)),
            "earthquake" => ((20_000.0, 500_000.0), (0.6, 1.2), 0.50, (0.25, 0.40)),
            _ => ((10_000.0, 100_000.0), (0.3, 0.8), 0.30, (0.15, 0.25)),
        };
        IndustryBenchmark {
            typical_el_range: el,
            typical_cov_range: cov,
            typical_risk_load: load,
            market_premium_range: market,
        }
    }
}

// ── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasicMetrics {
    pub expected_loss: f64,
    pub gross_premium: f64,
    pub premium_to_el_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub var_99: f64,
    pub tvar_99: f64,
    pub pml_ratio: f64,
    pub tail_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub coefficient_of_variation: f64,
    pub risk_load: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityDashboard {
    pub basic_metrics: BasicMetrics,
    pub risk_metrics: RiskMetrics,
    pub validation_checks: SanityChecks,
    pub risk_assessment: RiskAssessment,
    pub benchmarks: IndustryBenchmark,
    pub alerts: Vec<Alert>,
}

impl SanityDashboard {
    pub fn build(r: &PricingResult) -> Self {
        let premium_to_el_ratio = if r.expected_loss > 0.0 { r.gross_premium / r.expected_loss } else { 0.0 };
        let dashboard = SanityDashboard {
            basic_metrics: BasicMetrics {
                expected_loss: r.expected_loss,
                gross_premium: r.gross_premium,
                premium_to_el_ratio,
            },
            risk_metrics: RiskMetrics {
                var_99: r.var_99,
                tvar_99: r.tvar_99,
                pml_ratio: r.pml_ratio(),
                tail_ratio: r.tail_ratio(),
            },
            validation_checks: SanityChecks::evaluate(r),
            risk_assessment: RiskAssessment {
                risk_level: r.risk_level,
                coefficient_of_variation: r.coefficient_of_variation,
                risk_load: r.risk_load,
            },
            benchmarks: IndustryBenchmark::for_peril(&r.peril),
            alerts: Alert::for_result(r),
        };
        for alert in &dashboard.alerts {
            warn!(peril = %r.peril, severity = ?alert.severity(), "{alert}");
        }
        dashboard
    }
}

// ── Pricing table ───────────────────────────────────────────────────────────

/// One display row per pricing result, every figure pre-formatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTableRow {
    #[serde(rename = "Peril")]
    pub peril: String,
    #[serde(rename = "EL (USD)")]
    pub expected_loss: String,
    #[serde(rename = "CoV")]
    pub cov: String,
    #[serde(rename = "Risk Load")]
    pub risk_load: String,
    #[serde(rename = "Net Premium (USD)")]
    pub net_premium: String,
    #[serde(rename = "Gross Premium (USD)")]
    pub gross_premium: String,
    #[serde(rename = "VaR 99% (USD)")]
    pub var_99: String,
    #[serde(rename = "TVaR 99% (USD)")]
    pub tvar_99: String,
    #[serde(rename = "Risk Level")]
    pub risk_level: String,
    #[serde(rename = "Recommendation")]
    pub recommendation: String,
    #[serde(rename = "PML Ratio")]
    pub pml_ratio: String,
    #[serde(rename = "Tail Ratio")]
    pub tail_ratio: String,
    #[serde(rename = "Simulation Years")]
    pub simulation_years: usize,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl PricingTableRow {
    pub fn from_result(r: &PricingResult) -> Self {
        PricingTableRow {
            peril: r.peril.clone(),
            expected_loss: format_currency(r.expected_loss),
            cov: format!("{:.2}", r.coefficient_of_variation),
            risk_load: format!("{:.3}", r.risk_load),
            net_premium: format_currency(r.net_premium),
            gross_premium: format_currency(r.gross_premium),
            var_99: format_currency(r.var_99),
            tvar_99: format_currency(r.tvar_99),
            risk_level: r.risk_level.to_string(),
            recommendation: r.recommendation.clone(),
            pml_ratio: format!("{:.1}x", r.pml_ratio()),
            tail_ratio: format!("{:.2}", r.tail_ratio()),
            simulation_years: r.simulation_years,
            timestamp: r.timestamp.to_rfc3339(),
        }
    }
}

pub fn pricing_table(results: &[PricingResult]) -> Vec<PricingTableRow> {
    results.iter().map(PricingTableRow::from_result).collect()
}

pub fn write_table_csv<W: io::Write>(writer: W, rows: &[PricingTableRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|e| PricingError::Export(e.to_string()))?;
    Ok(())
}

// ── Executive summary ───────────────────────────────────────────────────────

/// Markdown summary. Output depends only on its inputs.
pub fn executive_summary(r: &PricingResult, definition: &RiskDefinition, dashboard: &SanityDashboard) -> String {
    let trigger = definition.limits.trigger();
    let curve = definition.limits.payout_curve();
    let checks = &dashboard.validation_checks;
    let mut out = String::new();

    out.push_str(&format!("# {} Parametric Insurance Pricing Summary\n\n", definition.peril.to_uppercase()));
    out.push_str("## Key Metrics\n");
    out.push_str(&format!("- **Expected Loss**: {}\n", format_currency(r.expected_loss)));
    out.push_str(&format!("- **Recommended Premium**: {}\n", format_currency(r.gross_premium)));
    out.push_str(&format!("- **Risk Level**: {}\n", r.risk_level));
    out.push_str(&format!("- **Coefficient of Variation**: {:.2}\n\n", r.coefficient_of_variation));

    out.push_str("## Recommendation\n");
    out.push_str(&r.recommendation);
    out.push_str("\n\n");

    out.push_str("## Risk Structure\n");
    out.push_str(&format!(
        "- **Trigger**: {} {} {} {}\n",
        trigger.metric, trigger.operator, trigger.threshold, trigger.unit
    ));
    out.push_str(&format!("- **Maximum Payout**: {}\n", format_currency(curve.max_payout())));
    out.push_str(&format!("- **Payout Curve**: {}\n\n", curve.family().as_str()));

    out.push_str("## Risk Analysis\n");
    out.push_str(&format!("- **VaR {:.0}%**: {}\n", r.confidence_level * 100.0, format_currency(r.var_99)));
    out.push_str(&format!("- **TVaR {:.0}%**: {}\n", r.confidence_level * 100.0, format_currency(r.tvar_99)));
    out.push_str(&format!("- **PML Ratio**: {:.1}x\n\n", r.pml_ratio()));

    out.push_str("## Validation\n");
    let (passed, total) = (checks.passed(), checks.total());
    out.push_str(&format!(
        "- **Pass Rate**: {passed}/{total} ({:.0}%)\n",
        passed as f64 / total as f64 * 100.0
    ));
    let failed = checks.failed();
    if !failed.is_empty() {
        out.push_str("\n## Failed Checks\n");
        for name in failed {
            out.push_str(&format!("- {name}: failed\n"));
        }
    }
    if !dashboard.alerts.is_empty() {
        out.push_str("\n## Alerts\n");
        for alert in &dashboard.alerts {
            out.push_str(&format!("- {alert}\n"));
        }
    }
    out.push_str(&format!(
        "\n---\nGenerated: {}\nSimulation: {} years\n",
        r.timestamp.to_rfc3339(),
        r.simulation_years
    ));
    out
}

// ── Audit trail ─────────────────────────────────────────────────────────────

/// `pricing_<yyyymmdd_hhmmss>_<8 hex>`.
pub fn new_process_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("pricing_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Write-once record of a pricing run. Fields are readable but the value
/// cannot be altered after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    process_id: String,
    user_input: String,
    risk_definition: RiskDefinition,
    frequency_prior: FrequencyPrior,
    severity_prior: SeverityPrior,
    /// Families actually sampled, after alias resolution and fallback.
    resolved_frequency: ResolvedPrior,
    resolved_severity: ResolvedPrior,
    seed: u64,
    scenario_summary: ScenarioSummary,
    pricing_result: PricingResult,
    validation_checks: SanityChecks,
    created_at: DateTime<Utc>,
}

impl AuditTrail {
    pub fn new(
        user_input: &str,
        risk_definition: &RiskDefinition,
        frequency_prior: &FrequencyPrior,
        severity_prior: &SeverityPrior,
        scenarios: &ScenarioSet,
        pricing_result: &PricingResult,
    ) -> Self {
        let created_at = Utc::now();
        let trail = AuditTrail {
            process_id: new_process_id(created_at),
            user_input: user_input.to_string(),
            risk_definition: risk_definition.clone(),
            frequency_prior: frequency_prior.clone(),
            severity_prior: severity_prior.clone(),
            resolved_frequency: scenarios.frequency.clone(),
            resolved_severity: scenarios.severity.clone(),
            seed: scenarios.seed,
            scenario_summary: scenarios.summary(),
            pricing_result: pricing_result.clone(),
            validation_checks: SanityChecks::evaluate(pricing_result),
            created_at,
        };
        if trail.degraded() {
            warn!(process_id = %trail.process_id, "audited run used fallback priors");
        }
        info!(process_id = %trail.process_id, "audit trail created");
        trail
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn user_input(&self) -> &str {
        &self.user_input
    }

    pub fn risk_definition(&self) -> &RiskDefinition {
        &self.risk_definition
    }

    pub fn frequency_prior(&self) -> &FrequencyPrior {
        &self.frequency_prior
    }

    pub fn severity_prior(&self) -> &SeverityPrior {
        &self.severity_prior
    }

    pub fn resolved_frequency(&self) -> &ResolvedPrior {
        &self.resolved_frequency
    }

    pub fn resolved_severity(&self) -> &ResolvedPrior {
        &self.resolved_severity
    }

    /// True when either prior was replaced or repaired before sampling.
    pub fn degraded(&self) -> bool {
        self.resolved_frequency.degraded || self.resolved_severity.degraded
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn scenario_summary(&self) -> &ScenarioSummary {
        &self.scenario_summary
    }

    pub fn pricing_result(&self) -> &PricingResult {
        &self.pricing_result
    }

    pub fn validation_checks(&self) -> &SanityChecks {
        &self.validation_checks
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PricingError::Export(e.to_string()))
    }

    pub fn write_json<W: io::Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self).map_err(|e| PricingError::Export(e.to_string()))
    }
}
