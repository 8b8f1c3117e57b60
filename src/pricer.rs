//! Monte Carlo Pricer.
//!
//! Reduces a scenario set to expected loss, CoV, risk load, premium and
//! VaR/TVaR at a configurable confidence level. The pricer consumes no
//! randomness except in stress tests, which take an explicit seed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::analysis;
use crate::error::{PricingError, Result};
use crate::scenario::{Event, ScenarioSet, YearRecord};
use crate::types::{EventIndex, RiskLevel};

/// Minimum risk load when tail padding is on.
pub const TAIL_PADDING_FLOOR: f64 = 0.20;

/// Weight of CoV in the risk load.
const COV_LOAD_WEIGHT: f64 = 0.5;

/// ChaCha stream reserved for stress-test shocks.
pub const STRESS_STREAM: u64 = u64::MAX - 1;

/// Percentiles reported by [`Diagnostics`].
pub const PERCENTILE_LADDER: [u8; 8] = [5, 10, 25, 50, 75, 90, 95, 99];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingParams {
    pub market_risk_premium: f64,
    pub tail_padding: bool,
    pub confidence_level: f64,
}

impl PricingParams {
    pub fn canonical() -> Self {
        PricingParams { market_risk_premium: 0.15, tail_padding: true, confidence_level: 0.99 }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(PricingError::InvalidParameter(format!(
                "confidence level {} outside (0, 1)",
                self.confidence_level
            )));
        }
        if !(self.market_risk_premium.is_finite() && self.market_risk_premium >= 0.0) {
            return Err(PricingError::InvalidParameter(format!(
                "market risk premium {} must be finite and non-negative",
                self.market_risk_premium
            )));
        }
        Ok(())
    }
}

impl Default for PricingParams {
    fn default() -> Self {
        Self::canonical()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub peril: String,
    pub expected_loss: f64,
    pub coefficient_of_variation: f64,
    pub risk_load: f64,
    pub net_premium: f64,
    pub gross_premium: f64,
    /// VaR at `confidence_level` (99% by default).
    pub var_99: f64,
    pub tvar_99: f64,
    pub confidence_level: f64,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub simulation_years: usize,
    pub timestamp: DateTime<Utc>,
}

impl PricingResult {
    /// VaR / EL, 0 when EL is 0.
    pub fn pml_ratio(&self) -> f64 {
        pml_ratio(self.var_99, self.expected_loss)
    }

    /// TVaR / VaR, 0 when VaR is 0.
    pub fn tail_ratio(&self) -> f64 {
        if self.var_99 > 0.0 { self.tvar_99 / self.var_99 } else { 0.0 }
    }
}

fn pml_ratio(var: f64, expected_loss: f64) -> f64 {
    if expected_loss > 0.0 { var / expected_loss } else { 0.0 }
}

/// Strict-inequality classification on CoV and PML ratio.
pub fn classify_risk(cov: f64, pml: f64) -> RiskLevel {
    if cov < 0.3 && pml < 5.0 {
        RiskLevel::Low
    } else if cov < 0.6 && pml < 10.0 {
        RiskLevel::Medium
    } else if cov < 1.0 && pml < 20.0 {
        RiskLevel::High
    } else {
        RiskLevel::VeryHigh
    }
}

pub fn recommendation(level: RiskLevel, cov: f64, expected_loss: f64) -> String {
    match level {
        RiskLevel::Low => format!(
            "Low risk (CoV: {cov:.2}): product launch recommended. Expected loss {} is at a stable level.",
            format_currency(expected_loss)
        ),
        RiskLevel::Medium => format!(
            "Medium risk (CoV: {cov:.2}): cautious launch after further analysis. Mitigate through portfolio diversification."
        ),
        RiskLevel::High => format!(
            "High risk (CoV: {cov:.2}): adjust premium or restrict limits. Consider reinsurance options."
        ),
        RiskLevel::VeryHigh => format!(
            "Very high risk (CoV: {cov:.2}): launch not recommended on current terms. Review the trigger conditions."
        ),
    }
}

/// "$1,234,568". Rounds to whole currency units.
pub fn format_currency(amount: f64) -> String {
    if !amount.is_finite() {
        return format!("${amount}");
    }
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 { format!("-${out}") } else { format!("${out}") }
}

// ── Loss distribution ───────────────────────────────────────────────────────

/// Sorted annual losses with their moments, built once per pricing call and
/// shared by every quantile query made during that call.
#[derive(Debug, Clone)]
pub struct LossDistribution {
    sorted: Vec<f64>,
    mean: f64,
    std_dev: f64,
}

impl LossDistribution {
    pub fn new(losses: &[f64]) -> Result<Self> {
        if losses.is_empty() {
            return Err(PricingError::InvalidParameter("scenario set is empty".to_string()));
        }
        Ok(LossDistribution {
            sorted: analysis::sorted(losses),
            mean: analysis::mean(losses),
            std_dev: analysis::sample_std(losses),
        })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }

    pub fn expected_loss(&self) -> f64 {
        self.mean
    }

    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean > 0.0 { self.std_dev / self.mean } else { 0.0 }
    }

    /// ⌈c·N⌉ − 1, clamped into the sample.
    pub fn var_index(&self, confidence: f64) -> usize {
        let n = self.sorted.len();
        let idx = (confidence * n as f64).ceil() as usize;
        idx.saturating_sub(1).min(n - 1)
    }

    pub fn var(&self, confidence: f64) -> f64 {
        self.sorted[self.var_index(confidence)]
    }

    /// Mean of the sorted tail starting at the VaR index.
    pub fn tvar(&self, confidence: f64) -> f64 {
        let tail = &self.sorted[self.var_index(confidence)..];
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        // summing equal values can round a hair below them
        mean.max(tail[0])
    }

    /// Linear-interpolated percentile, `p` in [0, 100].
    pub fn percentile(&self, p: f64) -> f64 {
        analysis::interp(&self.sorted, p / 100.0)
    }
}

// ── Pricer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Pricer {
    params: PricingParams,
}

impl Pricer {
    pub fn new(params: PricingParams) -> Result<Self> {
        params.validate()?;
        Ok(Pricer { params })
    }

    pub fn params(&self) -> &PricingParams {
        &self.params
    }

    pub fn risk_load(&self, cov: f64) -> f64 {
        let raw = self.params.market_risk_premium + COV_LOAD_WEIGHT * cov;
        if self.params.tail_padding { raw.max(TAIL_PADDING_FLOOR) } else { raw }
    }

    #[instrument(skip(self, set), fields(years = set.len()))]
    pub fn price(&self, set: &ScenarioSet, peril: &str) -> Result<PricingResult> {
        let dist = LossDistribution::new(&set.annual_losses())?;
        let result = self.price_distribution(&dist, peril);
        info!(
            expected_loss = result.expected_loss,
            cov = result.coefficient_of_variation,
            gross_premium = result.gross_premium,
            risk_level = %result.risk_level,
            "priced"
        );
        Ok(result)
    }

    pub fn price_losses(&self, losses: &[f64], peril: &str) -> Result<PricingResult> {
        Ok(self.price_distribution(&LossDistribution::new(losses)?, peril))
    }

    pub fn price_distribution(&self, dist: &LossDistribution, peril: &str) -> PricingResult {
        let c = self.params.confidence_level;
        let expected_loss = dist.expected_loss();
        let cov = dist.coefficient_of_variation();
        let risk_load = self.risk_load(cov);
        let var = dist.var(c);
        let tvar = dist.tvar(c);
        let level = classify_risk(cov, pml_ratio(var, expected_loss));
        PricingResult {
            peril: peril.to_string(),
            expected_loss,
            coefficient_of_variation: cov,
            risk_load,
            net_premium: expected_loss,
            gross_premium: expected_loss * (1.0 + risk_load),
            var_99: var,
            tvar_99: tvar,
            confidence_level: c,
            risk_level: level,
            recommendation: recommendation(level, cov, expected_loss),
            simulation_years: dist.len(),
            timestamp: Utc::now(),
        }
    }

    pub fn diagnostics(&self, set: &ScenarioSet) -> Result<Diagnostics> {
        let losses = set.annual_losses();
        let dist = LossDistribution::new(&losses)?;
        let counts: Vec<f64> = set.years.iter().map(|y| y.event_count as f64).collect();
        let n = losses.len() as f64;
        let zero = losses.iter().filter(|&&l| l == 0.0).count();
        let p95 = dist.percentile(95.0);
        let extreme = losses.iter().filter(|&&l| l > p95).count();
        let no_events = set.years.iter().filter(|y| y.event_count == 0).count();
        Ok(Diagnostics {
            skewness: analysis::skewness(&losses),
            kurtosis: analysis::excess_kurtosis(&losses),
            zero_loss_probability: zero as f64 / n,
            extreme_loss_probability: extreme as f64 / n,
            zero_event_probability: no_events as f64 / n,
            percentiles: PERCENTILE_LADDER.iter().map(|&p| (p, dist.percentile(p as f64))).collect(),
            avg_events_per_year: analysis::mean(&counts),
            max_events_per_year: set.years.iter().map(|y| y.event_count).max().unwrap_or(0),
        })
    }

    /// Price each shocked copy of `set`. Shocks are applied independently to
    /// the unshocked dataset, in the order given.
    #[instrument(skip(self, set, shocks), fields(n_shocks = shocks.len()))]
    pub fn stress_test(&self, set: &ScenarioSet, shocks: &[StressShock], seed: u64) -> Result<Vec<StressResult>> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        rng.set_stream(STRESS_STREAM);
        let mut out = Vec::with_capacity(shocks.len());
        for shock in shocks {
            let stressed = shock.apply(&set.years, &mut rng);
            let losses: Vec<f64> = stressed.iter().map(|y| y.annual_loss).collect();
            let result = self.price_losses(&losses, &format!("stressed_{}", shock.name))?;
            debug!(shock = %shock.name, factor = shock.factor, gross_premium = result.gross_premium, "stress priced");
            out.push(StressResult { shock: shock.clone(), result });
        }
        Ok(out)
    }

    /// Price `set` under every combination of the given parameter values.
    /// Parameters not swept keep this pricer's values.
    #[instrument(skip(self, set, ranges))]
    pub fn sensitivity(
        &self,
        set: &ScenarioSet,
        peril: &str,
        ranges: &[(SweepParameter, Vec<f64>)],
    ) -> Result<Vec<SensitivityRow>> {
        let dist = LossDistribution::new(&set.annual_losses())?;
        let mut rows = Vec::new();
        for combination in cartesian_product(ranges) {
            let mut params = self.params;
            for &(parameter, value) in &combination {
                parameter.apply(&mut params, value);
            }
            let pricer = Pricer::new(params)?;
            let result = pricer.price_distribution(&dist, peril);
            rows.push(SensitivityRow {
                inputs: combination,
                expected_loss: result.expected_loss,
                risk_load: result.risk_load,
                gross_premium: result.gross_premium,
                var_99: result.var_99,
                tvar_99: result.tvar_99,
                risk_level: result.risk_level,
            });
        }
        info!(rows = rows.len(), "sensitivity sweep complete");
        Ok(rows)
    }
}

fn cartesian_product(ranges: &[(SweepParameter, Vec<f64>)]) -> Vec<Vec<(SweepParameter, f64)>> {
    let mut combos: Vec<Vec<(SweepParameter, f64)>> = vec![Vec::new()];
    for (parameter, values) in ranges {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |&v| {
                    let mut next = prefix.clone();
                    next.push((*parameter, v));
                    next
                })
            })
            .collect();
    }
    combos
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub skewness: f64,
    /// Excess (Fisher) kurtosis.
    pub kurtosis: f64,
    pub zero_loss_probability: f64,
    /// Share of years strictly above the 95th percentile.
    pub extreme_loss_probability: f64,
    pub zero_event_probability: f64,
    pub percentiles: Vec<(u8, f64)>,
    pub avg_events_per_year: f64,
    pub max_events_per_year: u32,
}

// ── Stress tests ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressKind {
    /// Multiplies severity and payout of every triggered event.
    SeverityShock,
    /// Each year with events gains a copy of its first event with
    /// probability `factor − 1`.
    FrequencyShock,
    /// Recognised by name but leaves the dataset unchanged.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressShock {
    pub name: String,
    pub kind: StressKind,
    pub factor: f64,
}

impl StressShock {
    /// Kind is inferred from the name: "severity_shock", "frequency_shock",
    /// anything else passes through.
    pub fn named(name: &str, factor: f64) -> Self {
        let kind = match name {
            "severity_shock" => StressKind::SeverityShock,
            "frequency_shock" => StressKind::FrequencyShock,
            other => {
                warn!(shock = other, "unknown stress shock, dataset left unchanged");
                StressKind::Passthrough
            }
        };
        StressShock { name: name.to_string(), kind, factor }
    }

    /// The standard pair used by the CLI.
    pub fn standard() -> Vec<StressShock> {
        vec![StressShock::named("severity_shock", 1.5), StressShock::named("frequency_shock", 2.0)]
    }

    pub fn apply(&self, years: &[YearRecord], rng: &mut impl Rng) -> Vec<YearRecord> {
        let mut out = years.to_vec();
        match self.kind {
            StressKind::SeverityShock => {
                for year in &mut out {
                    for event in year.events.iter_mut().filter(|e| e.triggered) {
                        event.severity *= self.factor;
                        event.payout *= self.factor;
                    }
                    year.refresh_totals();
                }
            }
            StressKind::FrequencyShock => {
                let p = self.factor - 1.0;
                for year in &mut out {
                    if rng.random::<f64>() < p {
                        if let Some(first) = year.events.first() {
                            let extra = Event { index: EventIndex(year.events.len() as u32), ..first.clone() };
                            year.events.push(extra);
                            year.refresh_totals();
                        }
                    }
                }
            }
            StressKind::Passthrough => {}
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressResult {
    pub shock: StressShock,
    pub result: PricingResult,
}

// ── Sensitivity sweep ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParameter {
    MarketRiskPremium,
    ConfidenceLevel,
}

impl SweepParameter {
    fn apply(self, params: &mut PricingParams, value: f64) {
        match self {
            SweepParameter::MarketRiskPremium => params.market_risk_premium = value,
            SweepParameter::ConfidenceLevel => params.confidence_level = value,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SweepParameter::MarketRiskPremium => "market_risk_premium",
            SweepParameter::ConfidenceLevel => "confidence_level",
        }
    }

    /// The default grid: four premiums by three confidence levels.
    pub fn standard_grid() -> Vec<(SweepParameter, Vec<f64>)> {
        vec![
            (SweepParameter::MarketRiskPremium, vec![0.10, 0.15, 0.20, 0.25]),
            (SweepParameter::ConfidenceLevel, vec![0.95, 0.99, 0.995]),
        ]
    }
}

impl fmt::Display for SweepParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SweepParameter {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "market_risk_premium" => Ok(SweepParameter::MarketRiskPremium),
            "confidence_level" => Ok(SweepParameter::ConfidenceLevel),
            other => Err(PricingError::InvalidParameter(format!("unknown sweep parameter {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityRow {
    pub inputs: Vec<(SweepParameter, f64)>,
    pub expected_loss: f64,
    pub risk_load: f64,
    pub gross_premium: f64,
    pub var_99: f64,
    pub tvar_99: f64,
    pub risk_level: RiskLevel,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand_distr::{Distribution, Gamma, Poisson};

    use super::*;
    use crate::scenario::tests::{typhoon_definition, typhoon_priors};
    use crate::scenario::{BuiltinTailCatalog, ScenarioGenerator};

    fn pricer() -> Pricer {
        Pricer::new(PricingParams::canonical()).unwrap()
    }

    fn typhoon_set(tail: bool) -> ScenarioSet {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let catalog = BuiltinTailCatalog;
        let tail: Option<&dyn crate::scenario::TailScenarioSource> = if tail { Some(&catalog) } else { None };
        ScenarioGenerator::new(&def, &f, &s, 42).generate(1000, tail).unwrap()
    }

    #[test]
    fn tail_padding_floors_risk_load() {
        let padded = Pricer::new(PricingParams { market_risk_premium: 0.05, tail_padding: true, confidence_level: 0.99 }).unwrap();
        let bare = Pricer::new(PricingParams { market_risk_premium: 0.05, tail_padding: false, confidence_level: 0.99 }).unwrap();
        assert!((padded.risk_load(0.1) - 0.20).abs() < 1e-12);
        assert!((bare.risk_load(0.1) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn risk_level_boundaries_are_strict() {
        assert_eq!(classify_risk(0.3, 5.0), RiskLevel::Medium);
        assert_eq!(classify_risk(0.299, 4.99), RiskLevel::Low);
        assert_eq!(classify_risk(0.6, 1.0), RiskLevel::High);
        assert_eq!(classify_risk(0.5, 10.0), RiskLevel::High);
        assert_eq!(classify_risk(1.0, 1.0), RiskLevel::VeryHigh);
        assert_eq!(classify_risk(0.1, 20.0), RiskLevel::VeryHigh);
    }

    #[test]
    fn single_year_var_equals_tvar() {
        let r = pricer().price_losses(&[12_345.0], "x").unwrap();
        assert_eq!(r.var_99, 12_345.0);
        assert_eq!(r.tvar_99, 12_345.0);
        assert_eq!(r.coefficient_of_variation, 0.0);
        assert_eq!(r.simulation_years, 1);
    }

    #[test]
    fn var_index_follows_ceiling_rule() {
        let losses: Vec<f64> = (1..=1000).map(|i| i as f64).collect();
        let dist = LossDistribution::new(&losses).unwrap();
        assert_eq!(dist.var_index(0.99), 989);
        assert_eq!(dist.var(0.99), 990.0);
        // mean of 990..=1000
        assert!((dist.tvar(0.99) - 995.0).abs() < 1e-12);
        assert_eq!(dist.var_index(0.995), 994);
    }

    #[test]
    fn premium_identities_hold_exactly() {
        let r = pricer().price(&typhoon_set(true), "typhoon").unwrap();
        assert_eq!(r.net_premium, r.expected_loss);
        assert_eq!(r.gross_premium, r.net_premium * (1.0 + r.risk_load));
        assert!(r.tvar_99 >= r.var_99);
        assert!(r.risk_load >= TAIL_PADDING_FLOOR);
    }

    #[test]
    fn pricing_is_idempotent() {
        let set = typhoon_set(true);
        let a = pricer().price(&set, "typhoon").unwrap();
        let b = pricer().price(&set, "typhoon").unwrap();
        assert_eq!(a.expected_loss.to_bits(), b.expected_loss.to_bits());
        assert_eq!(a.coefficient_of_variation.to_bits(), b.coefficient_of_variation.to_bits());
        assert_eq!(a.risk_load.to_bits(), b.risk_load.to_bits());
        assert_eq!(a.var_99.to_bits(), b.var_99.to_bits());
        assert_eq!(a.tvar_99.to_bits(), b.tvar_99.to_bits());
    }

    /// Every base-pass event pays the 2M cap, so EL = 2M × mean count and
    /// the NB(2.5, 0.8) mean count is 0.625.
    #[test]
    fn typhoon_regression_fixture() {
        let set = typhoon_set(false);
        let r = pricer().price(&set, "typhoon").unwrap();
        let counts = set.event_counts();
        let mean_count = counts.iter().map(|&c| c as f64).sum::<f64>() / counts.len() as f64;
        assert!((r.expected_loss - 2_000_000.0 * mean_count).abs() < 1e-6);
        assert!((1_050_000.0..=1_450_000.0).contains(&r.expected_loss), "EL {}", r.expected_loss);
        assert!(r.coefficient_of_variation > 1.0);
        assert_eq!(r.risk_level, RiskLevel::VeryHigh);
        assert_eq!(r.var_99 % 2_000_000.0, 0.0);

        let again = pricer().price(&typhoon_set(false), "typhoon").unwrap();
        assert_eq!(r.expected_loss.to_bits(), again.expected_loss.to_bits());
        assert_eq!(r.gross_premium.to_bits(), again.gross_premium.to_bits());
    }

    /// Seed-42 typhoon losses drawn without the generator. Each year's count
    /// is the first draw on ChaCha stream `year`: Poisson over a
    /// Gamma(r, (1 - p) / p) rate with r = 2.5, p = 0.8. Every event pays 2M.
    fn replayed_typhoon_losses() -> Vec<f64> {
        let rate = Gamma::new(2.5, (1.0 - 0.8) / 0.8).unwrap();
        (0..1000u64)
            .map(|year| {
                let mut rng = ChaCha20Rng::seed_from_u64(42);
                rng.set_stream(year);
                let lambda: f64 = rate.sample(&mut rng);
                let count: f64 = if lambda > 0.0 { Poisson::new(lambda).unwrap().sample(&mut rng) } else { 0.0 };
                2_000_000.0 * count
            })
            .collect()
    }

    #[test]
    fn typhoon_fixture_matches_replayed_draws() {
        let losses = replayed_typhoon_losses();
        let n = losses.len() as f64;
        let el = losses.iter().sum::<f64>() / n;
        let variance = losses.iter().map(|l| (l - el) * (l - el)).sum::<f64>() / (n - 1.0);
        let cov = variance.sqrt() / el;
        let gross = el * (1.0 + (0.15 + 0.5 * cov).max(0.20));

        let set = typhoon_set(false);
        assert_eq!(set.annual_losses(), losses);

        let r = pricer().price(&set, "typhoon").unwrap();
        assert_eq!(r.expected_loss.to_bits(), el.to_bits());
        assert!((r.coefficient_of_variation - cov).abs() < 1e-9, "CoV {} vs {cov}", r.coefficient_of_variation);
        assert!((r.gross_premium - gross).abs() < 1e-6, "gross {} vs {gross}", r.gross_premium);

        // A population (n) denominator would shift CoV by a factor of sqrt(999/1000).
        let population_cov = cov * ((n - 1.0) / n).sqrt();
        assert!((r.coefficient_of_variation - population_cov).abs() > 1e-6);
    }

    #[test]
    fn zero_losses_degrade_to_zero_ratios() {
        let r = pricer().price_losses(&[0.0; 50], "quiet").unwrap();
        assert_eq!(r.expected_loss, 0.0);
        assert_eq!(r.coefficient_of_variation, 0.0);
        assert_eq!(r.pml_ratio(), 0.0);
        assert_eq!(r.tail_ratio(), 0.0);
        assert_eq!(r.risk_level, RiskLevel::Low);
    }

    #[test]
    fn empty_losses_are_rejected() {
        assert!(matches!(pricer().price_losses(&[], "x"), Err(PricingError::InvalidParameter(_))));
    }

    #[test]
    fn confidence_level_must_be_open_unit() {
        for c in [0.0, 1.0, 1.5, f64::NAN] {
            let params = PricingParams { confidence_level: c, ..PricingParams::canonical() };
            assert!(Pricer::new(params).is_err(), "accepted {c}");
        }
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(0.0), "$0");
        assert_eq!(format_currency(999.4), "$999");
        assert_eq!(format_currency(1_234_567.6), "$1,234,568");
        assert_eq!(format_currency(-2500.0), "-$2,500");
    }

    #[test]
    fn recommendation_mentions_cov() {
        let text = recommendation(RiskLevel::Low, 0.25, 50_000.0);
        assert!(text.contains("0.25"));
        assert!(text.contains("$50,000"));
        assert!(recommendation(RiskLevel::VeryHigh, 1.7, 1.0).contains("1.70"));
    }

    #[test]
    fn severity_shock_scales_loss() {
        let set = typhoon_set(true);
        let base = pricer().price(&set, "typhoon").unwrap();
        let results = pricer().stress_test(&set, &[StressShock::named("severity_shock", 1.5)], 42).unwrap();
        assert_eq!(results.len(), 1);
        let stressed = &results[0].result;
        assert_eq!(stressed.peril, "stressed_severity_shock");
        let ratio = stressed.expected_loss / base.expected_loss;
        assert!((ratio - 1.5).abs() < 1e-9, "ratio {ratio}");
    }

    #[test]
    fn frequency_shock_never_lowers_loss() {
        let set = typhoon_set(false);
        let shock = StressShock::named("frequency_shock", 2.0);
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let stressed = shock.apply(&set.years, &mut rng);
        for (before, after) in set.years.iter().zip(&stressed) {
            assert!(after.annual_loss >= before.annual_loss);
            if before.events.is_empty() {
                assert_eq!(after.event_count, 0);
            } else {
                assert_eq!(after.event_count, before.event_count + 1);
            }
        }
    }

    #[test]
    fn unknown_shock_passes_through() {
        let set = typhoon_set(false);
        let base = pricer().price(&set, "typhoon").unwrap();
        let results = pricer().stress_test(&set, &[StressShock::named("correlation_shock", 0.3)], 1).unwrap();
        assert_eq!(results[0].shock.kind, StressKind::Passthrough);
        assert_eq!(results[0].result.expected_loss, base.expected_loss);
    }

    #[test]
    fn sensitivity_covers_cartesian_product() {
        let set = typhoon_set(true);
        let rows = pricer().sensitivity(&set, "typhoon", &SweepParameter::standard_grid()).unwrap();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].inputs, vec![(SweepParameter::MarketRiskPremium, 0.10), (SweepParameter::ConfidenceLevel, 0.95)]);
        assert_eq!(rows[11].inputs, vec![(SweepParameter::MarketRiskPremium, 0.25), (SweepParameter::ConfidenceLevel, 0.995)]);
        let el = rows[0].expected_loss;
        assert!(rows.iter().all(|r| r.expected_loss == el));
        assert!(rows.iter().all(|r| r.tvar_99 >= r.var_99));
    }

    #[test]
    fn sweep_rejects_invalid_confidence() {
        let set = typhoon_set(false);
        let ranges = vec![(SweepParameter::ConfidenceLevel, vec![0.99, 1.2])];
        assert!(pricer().sensitivity(&set, "typhoon", &ranges).is_err());
    }

    #[test]
    fn sweep_parameter_parses() {
        assert_eq!("confidence_level".parse::<SweepParameter>().unwrap(), SweepParameter::ConfidenceLevel);
        assert!("beta".parse::<SweepParameter>().is_err());
    }

    #[test]
    fn diagnostics_ladder_is_monotone() {
        let set = typhoon_set(true);
        let d = pricer().diagnostics(&set).unwrap();
        assert_eq!(d.percentiles.len(), PERCENTILE_LADDER.len());
        assert!(d.percentiles.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!((0.0..=1.0).contains(&d.zero_loss_probability));
        assert!(d.skewness > 0.0);
        assert!(d.max_events_per_year as f64 >= d.avg_events_per_year);
    }

    #[test]
    fn diagnostics_report_extreme_and_event_free_years() {
        let set = typhoon_set(false);
        let d = pricer().diagnostics(&set).unwrap();
        let p95 = d.percentiles.iter().find(|(p, _)| *p == 95).map(|&(_, v)| v).unwrap();
        let above = set.annual_losses().iter().filter(|&&l| l > p95).count();
        assert_eq!(d.extreme_loss_probability, above as f64 / 1000.0);
        assert!(d.extreme_loss_probability <= 0.05);

        // Every typhoon event triggers, so event-free years are exactly the loss-free ones.
        let empty = set.years.iter().filter(|y| y.events.is_empty()).count();
        assert_eq!(d.zero_event_probability, empty as f64 / 1000.0);
        assert_eq!(d.zero_event_probability, d.zero_loss_probability);
    }

    proptest! {
        #[test]
        fn tvar_never_below_var(
            losses in prop::collection::vec(0.0f64..1e9, 1..400),
            confidence in 0.5f64..0.999,
        ) {
            let dist = LossDistribution::new(&losses).unwrap();
            prop_assert!(dist.tvar(confidence) >= dist.var(confidence));
        }

        #[test]
        fn gross_premium_identity(losses in prop::collection::vec(0.0f64..1e7, 1..200)) {
            let r = pricer().price_losses(&losses, "p").unwrap();
            prop_assert_eq!(r.net_premium, r.expected_loss);
            prop_assert_eq!(r.gross_premium, r.expected_loss * (1.0 + r.risk_load));
        }
    }
}
