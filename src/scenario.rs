//! Scenario Generation Engine.
//!
//! A scenario set is N independent simulated years. Each year draws an event
//! count from the frequency prior and one severity per event from the
//! severity prior, then evaluates the risk definition's trigger and payout
//! curve. An optional tail pass then amplifies randomly chosen years with
//! named extreme scenarios.
//!
//! Every year draws from its own ChaCha stream (`set_stream(year)`) under the
//! master seed, so the base pass is bit-identical whether it runs serially or
//! across rayon workers. The tail pass uses the dedicated stream
//! [`TAIL_STREAM`] and only starts once every year exists.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::analysis;
use crate::error::{PricingError, Result};
use crate::peril::{LimitStructure, RiskDefinition};
use crate::priors::{FrequencyPrior, ResolvedPrior, SeverityPrior};
use crate::types::{EventIndex, YearIndex};

/// ChaCha stream reserved for the tail-injection pass.
pub const TAIL_STREAM: u64 = u64::MAX;

/// Default number of simulated years.
pub const DEFAULT_YEARS: u32 = 1000;

/// Jitter band applied to cloned tail events.
const CLONE_JITTER: std::ops::Range<f64> = 0.8..1.2;

/// Defaults substituted for unusable tail descriptor fields.
pub const DEFAULT_SEVERITY_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_FREQUENCY_MULTIPLIER: f64 = 1.0;
const UNNAMED_TAIL_SCENARIO: &str = "Unnamed Scenario";

/// Upper bound on a descriptor's frequency multiplier.
pub const MAX_FREQUENCY_MULTIPLIER: f64 = 10.0;

/// Clones appended to one year by a single descriptor.
const MAX_CLONES_PER_YEAR: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub index: EventIndex,
    pub severity: f64,
    pub triggered: bool,
    pub payout: f64,
    /// Name of the tail scenario that last touched this event.
    pub tail_scenario: Option<String>,
}

/// One simulated year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRecord {
    pub year: YearIndex,
    /// Always equal to `events.len()`, including tail clones.
    pub event_count: u32,
    pub events: Vec<Event>,
    /// Sum of the year's payouts.
    pub annual_loss: f64,
}

impl YearRecord {
    /// Re-run trigger and payout on every event and refresh the year totals.
    fn reevaluate(&mut self, limits: &LimitStructure) {
        for event in &mut self.events {
            let (triggered, payout) = limits.evaluate(event.severity);
            event.triggered = triggered;
            event.payout = payout;
        }
        self.refresh_totals();
    }

    pub(crate) fn refresh_totals(&mut self) {
        self.event_count = self.events.len() as u32;
        self.annual_loss = self.events.iter().map(|e| e.payout).sum();
    }

    pub fn is_tail_year(&self) -> bool {
        self.events.iter().any(|e| e.tail_scenario.is_some())
    }
}

/// A complete synthetic loss history, generated once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSet {
    pub years: Vec<YearRecord>,
    pub frequency: ResolvedPrior,
    pub severity: ResolvedPrior,
    pub seed: u64,
    pub tail_injected: bool,
}

impl ScenarioSet {
    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn annual_losses(&self) -> Vec<f64> {
        self.years.iter().map(|y| y.annual_loss).collect()
    }

    pub fn event_counts(&self) -> Vec<u32> {
        self.years.iter().map(|y| y.event_count).collect()
    }

    /// True when either prior had to be substituted or repaired.
    pub fn degraded(&self) -> bool {
        self.frequency.degraded || self.severity.degraded
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary::from_years(&self.years)
    }
}

// ── Tail scenarios ──────────────────────────────────────────────────────────

/// A named extreme-event pattern injected into the base simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailScenario {
    pub name: String,
    pub severity_multiplier: f64,
    pub frequency_multiplier: f64,
    /// Fraction of simulated years the scenario is applied to.
    pub annual_probability: f64,
}

impl TailScenario {
    pub fn new(name: &str, severity_multiplier: f64, frequency_multiplier: f64, annual_probability: f64) -> Self {
        TailScenario {
            name: name.to_string(),
            severity_multiplier,
            frequency_multiplier,
            annual_probability,
        }
    }

    /// Built-in catalog entries for a peril.
    pub fn builtin(peril: &str) -> Vec<TailScenario> {
        match peril {
            "typhoon" => vec![
                TailScenario::new("Super Typhoon", 3.0, 1.0, 0.01),
                TailScenario::new("Multiple Typhoons", 1.5, 3.0, 0.005),
                TailScenario::new("Unprecedented Track", 2.5, 1.0, 0.002),
            ],
            "flight_delay" => vec![
                TailScenario::new("System-wide Outage", 5.0, 1.0, 0.001),
                TailScenario::new("Weather Mega-Event", 3.0, 2.0, 0.005),
                TailScenario::new("Cyber Attack", 4.0, 1.0, 0.002),
            ],
            "server_downtime" => vec![
                TailScenario::new("Data Center Failure", 10.0, 1.0, 0.001),
                TailScenario::new("DDoS Attack", 3.0, 5.0, 0.01),
                TailScenario::new("Hardware Cascade", 5.0, 2.0, 0.005),
            ],
            _ => vec![TailScenario::new("Extreme Event", 3.0, 1.0, 0.01)],
        }
    }

    /// Replace fields the tail pass cannot use with their defaults. Blank
    /// names get a placeholder. Non-finite or non-positive multipliers fall
    /// back to [`DEFAULT_SEVERITY_MULTIPLIER`] and
    /// [`DEFAULT_FREQUENCY_MULTIPLIER`], and the frequency multiplier is
    /// capped at [`MAX_FREQUENCY_MULTIPLIER`].
    pub fn sanitised(mut self) -> Self {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            warn!(scenario = ?self.name, default = UNNAMED_TAIL_SCENARIO, "empty tail scenario name, using default");
            self.name = UNNAMED_TAIL_SCENARIO.to_string();
        } else if trimmed.len() != self.name.len() {
            self.name = trimmed.to_string();
        }
        if !(self.severity_multiplier.is_finite() && self.severity_multiplier > 0.0) {
            warn!(
                scenario = %self.name,
                param = "severity_multiplier",
                value = self.severity_multiplier,
                default = DEFAULT_SEVERITY_MULTIPLIER,
                "invalid tail multiplier, using default"
            );
            self.severity_multiplier = DEFAULT_SEVERITY_MULTIPLIER;
        }
        if !(self.frequency_multiplier.is_finite() && self.frequency_multiplier > 0.0) {
            warn!(
                scenario = %self.name,
                param = "frequency_multiplier",
                value = self.frequency_multiplier,
                default = DEFAULT_FREQUENCY_MULTIPLIER,
                "invalid tail multiplier, using default"
            );
            self.frequency_multiplier = DEFAULT_FREQUENCY_MULTIPLIER;
        } else if self.frequency_multiplier > MAX_FREQUENCY_MULTIPLIER {
            warn!(
                scenario = %self.name,
                value = self.frequency_multiplier,
                cap = MAX_FREQUENCY_MULTIPLIER,
                "tail frequency multiplier capped"
            );
            self.frequency_multiplier = MAX_FREQUENCY_MULTIPLIER;
        }
        self
    }

    /// Number of years this scenario selects out of `years`.
    pub fn selected_years(&self, years: usize) -> usize {
        let p = if self.annual_probability.is_finite() {
            self.annual_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        ((years as f64 * p).floor() as usize).min(years)
    }
}

/// Supplier of tail scenarios for a peril. The pricing core ships a built-in
/// table; callers holding oracle output implement this for their own type.
pub trait TailScenarioSource {
    fn tail_scenarios(&self, peril: &str, region: &str, count: usize) -> Vec<TailScenario>;
}

/// The built-in per-peril table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTailCatalog;

impl TailScenarioSource for BuiltinTailCatalog {
    fn tail_scenarios(&self, peril: &str, _region: &str, count: usize) -> Vec<TailScenario> {
        TailScenario::builtin(peril).into_iter().take(count).collect()
    }
}

impl TailScenarioSource for Vec<TailScenario> {
    fn tail_scenarios(&self, _peril: &str, _region: &str, count: usize) -> Vec<TailScenario> {
        self.iter().take(count).cloned().collect()
    }
}

/// How many tail descriptors to request for an N-year run.
pub fn tail_scenario_count(years: usize) -> usize {
    (years / 100).max(10)
}

// ── Generator ───────────────────────────────────────────────────────────────

pub struct ScenarioGenerator<'a> {
    definition: &'a RiskDefinition,
    frequency: ResolvedPrior,
    severity: ResolvedPrior,
    seed: u64,
    parallel: bool,
}

impl<'a> ScenarioGenerator<'a> {
    pub fn new(
        definition: &'a RiskDefinition,
        frequency: &FrequencyPrior,
        severity: &SeverityPrior,
        seed: u64,
    ) -> Self {
        ScenarioGenerator {
            definition,
            frequency: frequency.resolve(),
            severity: severity.resolve(),
            seed,
            parallel: true,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Base pass followed by the tail pass when `tail` is given.
    #[instrument(skip(self, tail), fields(peril = %self.definition.peril, seed = self.seed))]
    pub fn generate(&self, years: u32, tail: Option<&dyn TailScenarioSource>) -> Result<ScenarioSet> {
        if years == 0 {
            return Err(PricingError::InvalidParameter("year count must be positive".to_string()));
        }
        let mut records = self.base_pass(years);
        let tail_injected = match tail {
            Some(source) => {
                let scenarios = source.tail_scenarios(
                    &self.definition.peril,
                    &self.definition.region,
                    tail_scenario_count(records.len()),
                );
                self.inject_tail(&mut records, &scenarios);
                true
            }
            None => false,
        };
        let set = ScenarioSet {
            years: records,
            frequency: self.frequency.clone(),
            severity: self.severity.clone(),
            seed: self.seed,
            tail_injected,
        };
        info!(
            years = set.len(),
            tail_injected,
            degraded = set.degraded(),
            frequency = %set.frequency.family.describe(),
            severity = %set.severity.family.describe(),
            "scenario set generated"
        );
        Ok(set)
    }

    /// Independent per-year simulation.
    pub fn base_pass(&self, years: u32) -> Vec<YearRecord> {
        if self.parallel {
            (0..years).into_par_iter().map(|y| self.simulate_year(YearIndex(y))).collect()
        } else {
            (0..years).map(|y| self.simulate_year(YearIndex(y))).collect()
        }
    }

    pub fn simulate_year(&self, year: YearIndex) -> YearRecord {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        rng.set_stream(year.stream());
        let limits = &self.definition.limits;

        let count = self.frequency.family.sample_count(&mut rng);
        let events: Vec<Event> = (0..count)
            .map(|i| {
                let severity = self.severity.family.sample(&mut rng);
                let (triggered, payout) = limits.evaluate(severity);
                Event { index: EventIndex(i), severity, triggered, payout, tail_scenario: None }
            })
            .collect();
        let annual_loss = events.iter().map(|e| e.payout).sum();
        YearRecord { year, event_count: count, events, annual_loss }
    }

    /// Apply each tail scenario in order, after [`TailScenario::sanitised`].
    /// A year selected by several scenarios is amplified by each in turn and
    /// keeps the last tag.
    pub fn inject_tail(&self, years: &mut [YearRecord], scenarios: &[TailScenario]) {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        rng.set_stream(TAIL_STREAM);
        let limits = &self.definition.limits;
        let n = years.len();

        for scenario in scenarios.iter().cloned().map(TailScenario::sanitised) {
            let k = scenario.selected_years(n);
            if k == 0 {
                debug!(scenario = %scenario.name, "tail scenario selects no years");
                continue;
            }
            let mut touched = 0usize;
            for idx in index::sample(&mut rng, n, k).into_iter() {
                let record = &mut years[idx];
                if amplify_year(record, &scenario, &mut rng) {
                    record.reevaluate(limits);
                    touched += 1;
                }
            }
            debug!(scenario = %scenario.name, selected = k, touched, "tail scenario applied");
        }
    }
}

/// Scale a year's events and append jittered clones. Years without events
/// are left untouched and return false.
fn amplify_year(record: &mut YearRecord, scenario: &TailScenario, rng: &mut impl Rng) -> bool {
    if record.events.is_empty() {
        return false;
    }
    let originals: Vec<Event> = record.events.clone();
    for event in &mut record.events {
        event.severity *= scenario.severity_multiplier;
        event.tail_scenario = Some(scenario.name.clone());
    }
    if scenario.frequency_multiplier > 1.0 {
        let extra = ((scenario.frequency_multiplier - 1.0) * originals.len() as f64).floor() as usize;
        let extra = extra.min(MAX_CLONES_PER_YEAR);
        let mut next = record.events.len() as u32;
        for _ in 0..extra {
            let base = &originals[rng.random_range(0..originals.len())];
            let jitter = rng.random_range(CLONE_JITTER);
            record.events.push(Event {
                index: EventIndex(next),
                severity: base.severity * scenario.severity_multiplier * jitter,
                triggered: false,
                payout: 0.0,
                tail_scenario: Some(scenario.name.clone()),
            });
            next += 1;
        }
    }
    true
}

// ── Summary ─────────────────────────────────────────────────────────────────

/// Summary statistics of a scenario set, carried in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub total_scenarios: usize,
    pub mean_annual_loss: f64,
    pub std_annual_loss: f64,
    pub min_annual_loss: f64,
    pub max_annual_loss: f64,
    pub median_annual_loss: f64,
    pub zero_loss_years: usize,
    /// Years strictly above the 95th percentile annual loss.
    pub extreme_loss_years: usize,
    pub total_events: u64,
    pub avg_events_per_year: f64,
    pub tail_years: usize,
}

impl ScenarioSummary {
    pub fn from_years(years: &[YearRecord]) -> Self {
        let losses: Vec<f64> = years.iter().map(|y| y.annual_loss).collect();
        let total_events: u64 = years.iter().map(|y| y.event_count as u64).sum();
        let avg_events_per_year = if years.is_empty() { 0.0 } else { total_events as f64 / years.len() as f64 };
        let tail_years = years.iter().filter(|y| y.is_tail_year()).count();
        let zero_loss_years = losses.iter().filter(|&&l| l == 0.0).count();

        match analysis::dist_stats(&losses) {
            Some(stats) => ScenarioSummary {
                total_scenarios: stats.n,
                mean_annual_loss: stats.mean,
                std_annual_loss: stats.std_dev,
                min_annual_loss: stats.min,
                max_annual_loss: stats.max,
                median_annual_loss: stats.p50,
                zero_loss_years,
                extreme_loss_years: losses.iter().filter(|&&l| l > stats.p95).count(),
                total_events,
                avg_events_per_year,
                tail_years,
            },
            None => ScenarioSummary {
                total_scenarios: 0,
                mean_annual_loss: 0.0,
                std_annual_loss: 0.0,
                min_annual_loss: 0.0,
                max_annual_loss: 0.0,
                median_annual_loss: 0.0,
                zero_loss_years: 0,
                extreme_loss_years: 0,
                total_events: 0,
                avg_events_per_year: 0.0,
                tail_years: 0,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::peril::{CurveFamily, LimitStructure, Operator, PayoutCurve, TriggerCondition};

    /// Typhoon canvas with the linear 10k/10k/2M curve and "≤ 950" trigger.
    pub(crate) fn typhoon_definition() -> RiskDefinition {
        let mut def = RiskDefinition::builtin("typhoon", "Korea");
        let curve = PayoutCurve::new(CurveFamily::Linear, 10_000.0, 2_000_000.0, 10_000.0).unwrap();
        let trigger = TriggerCondition::new("central_pressure", Operator::Le, 950.0, "hPa");
        def.limits = LimitStructure::new(trigger, curve, 0.0, 0, 365).unwrap();
        def
    }

    pub(crate) fn typhoon_priors() -> (FrequencyPrior, SeverityPrior) {
        (
            FrequencyPrior::builtin("typhoon"),
            SeverityPrior::builtin("typhoon", "central_pressure", "hPa"),
        )
    }

    #[test]
    fn same_seed_same_scenarios() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let a = ScenarioGenerator::new(&def, &f, &s, 7).generate(300, Some(&BuiltinTailCatalog)).unwrap();
        let b = ScenarioGenerator::new(&def, &f, &s, 7).generate(300, Some(&BuiltinTailCatalog)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let a = ScenarioGenerator::new(&def, &f, &s, 1).generate(300, None).unwrap();
        let b = ScenarioGenerator::new(&def, &f, &s, 2).generate(300, None).unwrap();
        assert_ne!(a.event_counts(), b.event_counts());
    }

    #[test]
    fn serial_and_parallel_are_bit_identical() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let serial = ScenarioGenerator::new(&def, &f, &s, 42).parallel(false).generate(500, Some(&BuiltinTailCatalog)).unwrap();
        let parallel = ScenarioGenerator::new(&def, &f, &s, 42).parallel(true).generate(500, Some(&BuiltinTailCatalog)).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn annual_loss_is_sum_of_payouts() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let set = ScenarioGenerator::new(&def, &f, &s, 42).generate(1000, Some(&BuiltinTailCatalog)).unwrap();
        for year in &set.years {
            let sum: f64 = year.events.iter().map(|e| e.payout).sum();
            assert_eq!(year.annual_loss, sum);
            assert_eq!(year.event_count as usize, year.events.len());
            for e in &year.events {
                assert!(e.payout >= 0.0 && e.payout <= 2_000_000.0);
                if !e.triggered {
                    assert_eq!(e.payout, 0.0);
                }
            }
        }
    }

    /// Every LogNormal(2.1, 0.6) severity sits far below 950, so each event
    /// triggers with excess of several hundred and clamps to the 2M cap.
    #[test]
    fn typhoon_base_pass_pays_cap_per_event() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let set = ScenarioGenerator::new(&def, &f, &s, 42).generate(1000, None).unwrap();
        assert!(!set.tail_injected);
        for year in &set.years {
            assert_eq!(year.annual_loss, 2_000_000.0 * year.event_count as f64);
        }
        let mean_count = set.event_counts().iter().map(|&c| c as f64).sum::<f64>() / 1000.0;
        assert!((0.5..=0.75).contains(&mean_count), "mean count {mean_count:.3}");
    }

    #[test]
    fn zero_years_is_rejected() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let err = ScenarioGenerator::new(&def, &f, &s, 42).generate(0, None).unwrap_err();
        assert!(matches!(err, PricingError::InvalidParameter(_)));
    }

    #[test]
    fn tail_scenario_selects_floor_of_probability() {
        let s = TailScenario::new("x", 2.0, 1.0, 0.005);
        assert_eq!(s.selected_years(1000), 5);
        assert_eq!(s.selected_years(100), 0);
        assert_eq!(TailScenario::new("y", 2.0, 1.0, 2.0).selected_years(10), 10);
    }

    #[test]
    fn tail_count_has_floor_of_ten() {
        assert_eq!(tail_scenario_count(1000), 10);
        assert_eq!(tail_scenario_count(5000), 50);
        assert_eq!(tail_scenario_count(1), 10);
    }

    #[test]
    fn builtin_catalog_truncates_to_count() {
        assert_eq!(BuiltinTailCatalog.tail_scenarios("typhoon", "Korea", 2).len(), 2);
        assert_eq!(BuiltinTailCatalog.tail_scenarios("typhoon", "Korea", 10).len(), 3);
        let generic = BuiltinTailCatalog.tail_scenarios("hail", "EU", 10);
        assert_eq!(generic[0].name, "Extreme Event");
    }

    #[test]
    fn frequency_amplification_clones_events() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let generator = ScenarioGenerator::new(&def, &f, &s, 42).parallel(false);
        let mut years = generator.base_pass(200);
        let before: Vec<u32> = years.iter().map(|y| y.event_count).collect();
        let scenarios = vec![TailScenario::new("Swarm", 1.0, 3.0, 1.0)];
        generator.inject_tail(&mut years, &scenarios);
        for (year, &n) in years.iter().zip(&before) {
            assert_eq!(year.event_count, n * 3);
            if n > 0 {
                assert!(year.events.iter().all(|e| e.tail_scenario.as_deref() == Some("Swarm")));
                for (i, e) in year.events.iter().enumerate() {
                    assert_eq!(e.index, EventIndex(i as u32));
                }
            } else {
                assert!(!year.is_tail_year());
            }
        }
    }

    #[test]
    fn unusable_descriptor_fields_fall_back() {
        let s = TailScenario::new("  ", f64::NAN, f64::INFINITY, 0.5).sanitised();
        assert_eq!(s.name, "Unnamed Scenario");
        assert_eq!(s.severity_multiplier, DEFAULT_SEVERITY_MULTIPLIER);
        assert_eq!(s.frequency_multiplier, DEFAULT_FREQUENCY_MULTIPLIER);
        assert_eq!(s.annual_probability, 0.5);

        let s = TailScenario::new(" Storm ", -3.0, 0.0, 0.5).sanitised();
        assert_eq!(s.name, "Storm");
        assert_eq!(s.severity_multiplier, DEFAULT_SEVERITY_MULTIPLIER);
        assert_eq!(s.frequency_multiplier, DEFAULT_FREQUENCY_MULTIPLIER);

        let s = TailScenario::new("Swarm", 1.5, 1e12, 0.5).sanitised();
        assert_eq!(s.frequency_multiplier, MAX_FREQUENCY_MULTIPLIER);
        assert_eq!(s.severity_multiplier, 1.5);

        let builtin = TailScenario::builtin("server_downtime");
        let cleaned: Vec<TailScenario> = builtin.iter().cloned().map(TailScenario::sanitised).collect();
        assert_eq!(cleaned, builtin);
    }

    #[test]
    fn infinite_and_nan_multipliers_inject_safely() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let generator = ScenarioGenerator::new(&def, &f, &s, 42).parallel(false);
        let mut years = generator.base_pass(200);
        let base: Vec<Vec<f64>> = years.iter().map(|y| y.events.iter().map(|e| e.severity).collect()).collect();
        let scenarios = vec![TailScenario::new("", f64::NAN, f64::INFINITY, 1.0)];
        generator.inject_tail(&mut years, &scenarios);
        for (year, sev) in years.iter().zip(&base) {
            assert_eq!(year.events.len(), sev.len());
            assert_eq!(year.event_count as usize, sev.len());
            for (e, s0) in year.events.iter().zip(sev) {
                assert_eq!(e.tail_scenario.as_deref(), Some("Unnamed Scenario"));
                assert!(e.severity.is_finite());
                assert!((e.severity - s0 * DEFAULT_SEVERITY_MULTIPLIER).abs() <= 1e-9 * s0.abs().max(1.0));
            }
        }
    }

    #[test]
    fn huge_frequency_multiplier_is_capped() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let generator = ScenarioGenerator::new(&def, &f, &s, 42).parallel(false);
        let mut years = generator.base_pass(100);
        let before: Vec<u32> = years.iter().map(|y| y.event_count).collect();
        generator.inject_tail(&mut years, &[TailScenario::new("Swarm", 1.0, 1e300, 1.0)]);
        for (year, &n) in years.iter().zip(&before) {
            assert_eq!(year.event_count, n * MAX_FREQUENCY_MULTIPLIER as u32);
        }
    }

    #[test]
    fn later_scenario_tag_overwrites_earlier() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let generator = ScenarioGenerator::new(&def, &f, &s, 42).parallel(false);
        let mut years = generator.base_pass(100);
        let base: Vec<Vec<f64>> = years.iter().map(|y| y.events.iter().map(|e| e.severity).collect()).collect();
        let scenarios = vec![
            TailScenario::new("First", 2.0, 1.0, 1.0),
            TailScenario::new("Second", 3.0, 1.0, 1.0),
        ];
        generator.inject_tail(&mut years, &scenarios);
        for (year, sev) in years.iter().zip(&base) {
            for (e, s0) in year.events.iter().zip(sev) {
                assert_eq!(e.tail_scenario.as_deref(), Some("Second"));
                assert!((e.severity - s0 * 6.0).abs() <= 1e-9 * s0.abs().max(1.0));
            }
        }
    }

    #[test]
    fn summary_counts_match_dataset() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let set = ScenarioGenerator::new(&def, &f, &s, 42).generate(1000, Some(&BuiltinTailCatalog)).unwrap();
        let summary = set.summary();
        assert_eq!(summary.total_scenarios, 1000);
        let zero = set.years.iter().filter(|y| y.annual_loss == 0.0).count();
        assert_eq!(summary.zero_loss_years, zero);
        let total: u64 = set.years.iter().map(|y| y.event_count as u64).sum();
        assert_eq!(summary.total_events, total);
        assert!(summary.min_annual_loss <= summary.median_annual_loss);
        assert!(summary.median_annual_loss <= summary.max_annual_loss);
        assert!(summary.extreme_loss_years <= 50);
    }

    #[test]
    fn unknown_families_fall_back_and_flag() {
        let def = typhoon_definition();
        let (mut f, mut s) = typhoon_priors();
        f.estimate.distribution = "zeta".into();
        s.estimate.distribution = "cauchy".into();
        let set = ScenarioGenerator::new(&def, &f, &s, 42).generate(100, None).unwrap();
        assert!(set.degraded());
        assert!(set.frequency.family.is_fallback());
        assert!(set.severity.family.is_fallback());
    }
}
