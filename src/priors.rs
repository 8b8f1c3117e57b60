//! Expert-prior frequency and severity estimates and the distribution
//! families they resolve to.
//!
//! Priors arrive from an external oracle as a family tag plus a loose
//! parameter map. [`FrequencyPrior::resolve`] and [`SeverityPrior::resolve`]
//! turn that into a closed [`Family`] that can be sampled. Anything the
//! resolver does not understand degrades to a documented default and lowers
//! the confidence carried into the scenario set; it never fails.

use std::collections::BTreeMap;

use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal, Poisson};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PricingError, Result};

/// Confidence discount applied when a prior is revised by the critique pass.
pub const REVISION_CONFIDENCE_FACTOR: f64 = 0.9;

/// Confidence discount applied when a prior could not be used as given.
pub const FALLBACK_CONFIDENCE_FACTOR: f64 = 0.5;

/// Confidence assigned to the built-in per-peril priors.
const BUILTIN_CONFIDENCE: f64 = 0.7;

const REQUIRED_PERCENTILES: [&str; 3] = ["5th", "50th", "95th"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorRole {
    Frequency,
    Severity,
}

impl PriorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PriorRole::Frequency => "frequency",
            PriorRole::Severity => "severity",
        }
    }
}

/// Every distribution the scenario engine can draw from.
///
/// Frequency families return integer-valued draws; severity families return
/// non-negative reals. `Fallback` samples the documented default for its
/// role: Poisson(1) for frequency, LogNormal(1, 0.5) for severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Family {
    /// Failures before the r-th success; mean r(1-p)/p.
    NegativeBinomial { r: f64, p: f64 },
    Poisson { lambda: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Gamma { shape: f64, scale: f64 },
    Exponential { rate: f64 },
    /// Draws are clipped at 0.
    Normal { mu: f64, sigma: f64 },
    Fallback { role: PriorRole },
}

impl Family {
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match *self {
            Family::NegativeBinomial { r, p } => {
                // Gamma-Poisson mixture.
                match Gamma::new(r, (1.0 - p) / p) {
                    Ok(gamma) => {
                        let lambda: f64 = gamma.sample(rng);
                        sample_poisson(lambda, rng)
                    }
                    Err(_) => sample_poisson(1.0, rng),
                }
            }
            Family::Poisson { lambda } => sample_poisson(lambda, rng),
            Family::LogNormal { mu, sigma } => match LogNormal::new(mu, sigma) {
                Ok(dist) => dist.sample(rng),
                Err(_) => default_severity(rng),
            },
            Family::Gamma { shape, scale } => match Gamma::new(shape, scale) {
                Ok(dist) => dist.sample(rng),
                Err(_) => default_severity(rng),
            },
            Family::Exponential { rate } => match Exp::new(rate) {
                Ok(dist) => dist.sample(rng),
                Err(_) => default_severity(rng),
            },
            Family::Normal { mu, sigma } => match Normal::new(mu, sigma) {
                Ok(dist) => dist.sample(rng).max(0.0),
                Err(_) => default_severity(rng),
            },
            Family::Fallback { role: PriorRole::Frequency } => sample_poisson(1.0, rng),
            Family::Fallback { role: PriorRole::Severity } => default_severity(rng),
        }
    }

    /// Draw an annual event count.
    pub fn sample_count(&self, rng: &mut impl Rng) -> u32 {
        let x = self.sample(rng);
        if x.is_finite() && x > 0.0 {
            x.min(u32::MAX as f64) as u32
        } else {
            0
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Family::Fallback { .. })
    }

    pub fn describe(&self) -> String {
        match *self {
            Family::NegativeBinomial { r, p } => format!("NegativeBinomial(r={r}, p={p})"),
            Family::Poisson { lambda } => format!("Poisson(lambda={lambda})"),
            Family::LogNormal { mu, sigma } => format!("LogNormal(mu={mu}, sigma={sigma})"),
            Family::Gamma { shape, scale } => format!("Gamma(shape={shape}, scale={scale})"),
            Family::Exponential { rate } => format!("Exponential(rate={rate})"),
            Family::Normal { mu, sigma } => format!("Normal(mu={mu}, sigma={sigma})"),
            Family::Fallback { role: PriorRole::Frequency } => "Fallback(Poisson(lambda=1))".to_string(),
            Family::Fallback { role: PriorRole::Severity } => {
                "Fallback(LogNormal(mu=1, sigma=0.5))".to_string()
            }
        }
    }
}

fn sample_poisson(lambda: f64, rng: &mut impl Rng) -> f64 {
    if !(lambda > 0.0) {
        return 0.0;
    }
    match Poisson::new(lambda) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

fn default_severity(rng: &mut impl Rng) -> f64 {
    match LogNormal::new(1.0, 0.5) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

/// Draft values come straight from the oracle; a corrected value is the
/// output of the single permitted critique pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
    #[default]
    Draft,
    Corrected,
}

/// Fields shared by frequency and severity priors, as the oracle emits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorEstimate {
    /// Family tag, e.g. "negative_binomial" or "lognormal".
    pub distribution: String,
    pub parameters: BTreeMap<String, f64>,
    /// Must contain "5th", "50th" and "95th", non-decreasing.
    pub percentiles: BTreeMap<String, f64>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub revision: Revision,
}

impl PriorEstimate {
    pub fn validate(&self, which: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PricingError::InvalidPrior(format!(
                "{which} confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        for key in REQUIRED_PERCENTILES {
            if !self.percentiles.contains_key(key) {
                return Err(PricingError::InvalidPrior(format!(
                    "{which} percentiles missing {key}"
                )));
            }
        }
        let mut ladder: Vec<(f64, f64)> = Vec::with_capacity(self.percentiles.len());
        for (key, value) in &self.percentiles {
            let rank = percentile_rank(key).ok_or_else(|| {
                PricingError::InvalidPrior(format!("{which} percentile key {key:?} is not a percentile"))
            })?;
            ladder.push((rank, *value));
        }
        ladder.sort_by(|a, b| a.0.total_cmp(&b.0));
        if ladder.windows(2).any(|w| w[1].1 < w[0].1) {
            return Err(PricingError::InvalidPrior(format!(
                "{which} percentiles must be non-decreasing"
            )));
        }
        Ok(())
    }

    fn revised(&self, which: &'static str, corrections: &BTreeMap<String, f64>) -> Result<Self> {
        if self.revision == Revision::Corrected {
            return Err(PricingError::PriorAlreadyRevised { which });
        }
        let mut parameters = self.parameters.clone();
        parameters.extend(corrections.iter().map(|(k, v)| (k.clone(), *v)));
        Ok(PriorEstimate {
            distribution: self.distribution.clone(),
            parameters,
            percentiles: self.percentiles.clone(),
            sources: self.sources.clone(),
            confidence: self.confidence * REVISION_CONFIDENCE_FACTOR,
            revision: Revision::Corrected,
        })
    }
}

/// "5th" -> 5.0, "97.5th" -> 97.5.
fn percentile_rank(key: &str) -> Option<f64> {
    let digits = key.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    digits.parse().ok()
}

/// A prior resolved to a samplable family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPrior {
    pub role: PriorRole,
    pub family: Family,
    /// Prior confidence, discounted when the prior was not usable as given.
    pub confidence: f64,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyPrior {
    #[serde(flatten)]
    pub estimate: PriorEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityPrior {
    #[serde(flatten)]
    pub estimate: PriorEstimate,
    pub metric_unit: String,
}

impl FrequencyPrior {
    pub fn validate(&self) -> Result<()> {
        self.estimate.validate("frequency")
    }

    /// The corrected version of this draft. Errors if this prior is
    /// already a correction.
    pub fn revise(&self, corrections: &BTreeMap<String, f64>) -> Result<Self> {
        Ok(FrequencyPrior { estimate: self.estimate.revised("frequency", corrections)? })
    }

    pub fn resolve(&self) -> ResolvedPrior {
        resolve(PriorRole::Frequency, &self.estimate)
    }

    /// Built-in Negative-Binomial prior for a known peril.
    pub fn builtin(peril: &str) -> Self {
        let (r, p, pct, sources): (f64, f64, [f64; 3], &[&str]) = match peril {
            "typhoon" => (2.5, 0.8, [0.0, 1.0, 4.0], &["JMA Historical Database", "NOAA Storm Database"]),
            "flight_delay" => (5.0, 0.7, [1.0, 3.0, 8.0], &["FlightAware Statistics", "OAG Performance Data"]),
            "earthquake" => (1.5, 0.9, [0.0, 0.0, 2.0], &["USGS Earthquake Database", "Regional Seismic Networks"]),
            "server_downtime" => (8.0, 0.6, [2.0, 5.0, 12.0], &["Industry Uptime Statistics", "Cloud Provider SLAs"]),
            _ => (3.0, 0.75, [0.0, 1.0, 5.0], &["Industry Statistics", "Expert Judgment"]),
        };
        FrequencyPrior {
            estimate: builtin_estimate("negative_binomial", &[("r", r), ("p", p)], pct, sources),
        }
    }
}

impl SeverityPrior {
    pub fn validate(&self) -> Result<()> {
        self.estimate.validate("severity")
    }

    pub fn revise(&self, corrections: &BTreeMap<String, f64>) -> Result<Self> {
        Ok(SeverityPrior {
            estimate: self.estimate.revised("severity", corrections)?,
            metric_unit: self.metric_unit.clone(),
        })
    }

    pub fn resolve(&self) -> ResolvedPrior {
        resolve(PriorRole::Severity, &self.estimate)
    }

    /// Built-in severity prior keyed on peril and trigger metric.
    pub fn builtin(peril: &str, metric: &str, unit: &str) -> Self {
        let estimate = match (peril, metric) {
            ("typhoon", "central_pressure") => builtin_estimate(
                "lognormal",
                &[("mu", 2.1), ("sigma", 0.6)],
                [3.2, 8.1, 25.4],
                &["JMA Storm Database"],
            ),
            ("flight_delay", "delay_minutes") => builtin_estimate(
                "gamma",
                &[("alpha", 2.0), ("beta", 0.03)],
                [15.0, 67.0, 180.0],
                &["Aviation Statistics"],
            ),
            ("server_downtime", "downtime_minutes") => builtin_estimate(
                "exponential",
                &[("lambda", 0.1)],
                [0.5, 6.9, 30.0],
                &["IT Industry Reports"],
            ),
            _ => builtin_estimate(
                "lognormal",
                &[("mu", 1.0), ("sigma", 0.5)],
                [1.2, 2.7, 7.4],
                &["Expert Judgment"],
            ),
        };
        SeverityPrior { estimate, metric_unit: unit.to_string() }
    }
}

fn builtin_estimate(
    distribution: &str,
    params: &[(&str, f64)],
    pct: [f64; 3],
    sources: &[&str],
) -> PriorEstimate {
    PriorEstimate {
        distribution: distribution.to_string(),
        parameters: params.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        percentiles: REQUIRED_PERCENTILES
            .iter()
            .zip(pct)
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        sources: sources.iter().map(|s| s.to_string()).collect(),
        confidence: BUILTIN_CONFIDENCE,
        revision: Revision::Draft,
    }
}

// ── Resolution ──────────────────────────────────────────────────────────────

/// Tracks whether any substitution happened while reading parameters.
struct Reader<'a> {
    params: &'a BTreeMap<String, f64>,
    family: &'static str,
    degraded: bool,
}

impl<'a> Reader<'a> {
    /// Values of the first alias set fully present in the map.
    fn first_of<const N: usize>(&self, sets: &[[&str; N]]) -> Option<[f64; N]> {
        sets.iter().find_map(|keys| {
            let mut out = [0.0; N];
            for (slot, key) in out.iter_mut().zip(keys) {
                *slot = *self.params.get(*key)?;
            }
            Some(out)
        })
    }

    fn positive(&mut self, name: &str, value: f64, default: f64) -> f64 {
        if value.is_finite() && value > 0.0 {
            value
        } else {
            warn!(family = self.family, param = name, value, default, "invalid parameter, using default");
            self.degraded = true;
            default
        }
    }

    fn probability(&mut self, name: &str, value: f64, default: f64) -> f64 {
        if value > 0.0 && value < 1.0 {
            value
        } else {
            warn!(family = self.family, param = name, value, default, "invalid probability, using default");
            self.degraded = true;
            default
        }
    }

    fn finite(&mut self, name: &str, value: f64, default: f64) -> f64 {
        if value.is_finite() {
            value
        } else {
            warn!(family = self.family, param = name, value, default, "non-finite parameter, using default");
            self.degraded = true;
            default
        }
    }

    fn unrecognised(&mut self) {
        warn!(family = self.family, params = ?self.params, "unrecognised parameters, using family default");
        self.degraded = true;
    }
}

fn normalise_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

fn resolve(role: PriorRole, estimate: &PriorEstimate) -> ResolvedPrior {
    let tag = normalise_tag(&estimate.distribution);
    let params = &estimate.parameters;
    let family = match (role, tag.as_str()) {
        (PriorRole::Frequency, "negative_binomial" | "negbin" | "nb") => {
            Some(negative_binomial(Reader { params, family: "negative_binomial", degraded: false }))
        }
        (PriorRole::Frequency, "poisson") => Some(poisson(Reader { params, family: "poisson", degraded: false })),
        (PriorRole::Severity, "lognormal" | "log_normal") => {
            Some(lognormal(Reader { params, family: "lognormal", degraded: false }))
        }
        (PriorRole::Severity, "gamma") => Some(gamma(Reader { params, family: "gamma", degraded: false })),
        (PriorRole::Severity, "exponential") => {
            Some(exponential(Reader { params, family: "exponential", degraded: false }))
        }
        (PriorRole::Severity, "normal" | "gaussian") => {
            Some(normal(Reader { params, family: "normal", degraded: false }))
        }
        _ => None,
    };
    let (family, degraded) = match family {
        Some(resolved) => resolved,
        None => {
            warn!(
                role = role.as_str(),
                distribution = %estimate.distribution,
                "unsupported distribution family, using fallback"
            );
            (Family::Fallback { role }, true)
        }
    };
    let confidence = if degraded {
        estimate.confidence * FALLBACK_CONFIDENCE_FACTOR
    } else {
        estimate.confidence
    };
    ResolvedPrior { role, family, confidence, degraded }
}

fn negative_binomial(mut rd: Reader<'_>) -> (Family, bool) {
    let family = if let Some([r, p]) = rd.first_of(&[["r", "p"], ["n", "p"], ["size", "prob"]]) {
        let r = rd.positive("r", r, 1.0);
        let p = rd.probability("p", p, 0.5);
        Family::NegativeBinomial { r, p }
    } else if let Some([mu, phi]) = rd.first_of(&[["mu", "phi"]]) {
        // mean mu, variance mu + phi mu^2
        let mu = rd.positive("mu", mu, 1.0);
        let phi = rd.positive("phi", phi, 1.0);
        let p = 1.0 / (1.0 + phi * mu);
        let r = 1.0 / phi;
        Family::NegativeBinomial { r, p: rd.probability("p", p, 0.5) }
    } else {
        rd.unrecognised();
        Family::NegativeBinomial { r: 1.0, p: 0.5 }
    };
    (family, rd.degraded)
}

fn poisson(mut rd: Reader<'_>) -> (Family, bool) {
    let lambda = match rd.first_of(&[["lambda"], ["lam"], ["rate"], ["mu"]]) {
        Some([lambda]) => rd.positive("lambda", lambda, 1.0),
        None => {
            rd.unrecognised();
            1.0
        }
    };
    (Family::Poisson { lambda }, rd.degraded)
}

fn lognormal(mut rd: Reader<'_>) -> (Family, bool) {
    let family = match rd.first_of(&[["mu", "sigma"], ["mean", "std"], ["location", "scale"], ["m", "s"]]) {
        Some([mu, sigma]) => Family::LogNormal {
            mu: rd.finite("mu", mu, 1.0),
            sigma: rd.positive("sigma", sigma, 0.5),
        },
        None => {
            rd.unrecognised();
            Family::LogNormal { mu: 1.0, sigma: 0.5 }
        }
    };
    (family, rd.degraded)
}

fn gamma(mut rd: Reader<'_>) -> (Family, bool) {
    let family = if let Some([alpha, beta]) = rd.first_of(&[["alpha", "beta"]]) {
        let shape = rd.positive("alpha", alpha, 2.0);
        let rate = rd.positive("beta", beta, 1.0);
        Family::Gamma { shape, scale: 1.0 / rate }
    } else if let Some([shape, scale]) = rd.first_of(&[["shape", "scale"], ["k", "theta"]]) {
        Family::Gamma {
            shape: rd.positive("shape", shape, 2.0),
            scale: rd.positive("scale", scale, 1.0),
        }
    } else if let Some([shape, rate]) = rd.first_of(&[["shape", "rate"]]) {
        let shape = rd.positive("shape", shape, 2.0);
        let rate = rd.positive("rate", rate, 1.0);
        Family::Gamma { shape, scale: 1.0 / rate }
    } else if let Some([mean, sd]) = rd.first_of(&[["mu", "sigma"]]) {
        let mean = rd.positive("mu", mean, 2.0);
        let sd = rd.positive("sigma", sd, 1.0);
        moments_gamma(mean, sd * sd)
    } else if let Some([mean, var]) = rd.first_of(&[["mean", "var"], ["mean", "variance"]]) {
        let mean = rd.positive("mean", mean, 2.0);
        let var = rd.positive("var", var, 1.0);
        moments_gamma(mean, var)
    } else {
        rd.unrecognised();
        Family::Gamma { shape: 2.0, scale: 1.0 }
    };
    (family, rd.degraded)
}

/// Method of moments: shape = mean^2 / var, scale = var / mean.
fn moments_gamma(mean: f64, var: f64) -> Family {
    Family::Gamma { shape: mean * mean / var, scale: var / mean }
}

fn exponential(mut rd: Reader<'_>) -> (Family, bool) {
    let rate = if let Some([rate]) = rd.first_of(&[["lambda"], ["rate"], ["beta"]]) {
        rd.positive("rate", rate, 1.0)
    } else if let Some([scale]) = rd.first_of(&[["scale"], ["mean"]]) {
        1.0 / rd.positive("scale", scale, 1.0)
    } else {
        rd.unrecognised();
        1.0
    };
    (Family::Exponential { rate }, rd.degraded)
}

fn normal(mut rd: Reader<'_>) -> (Family, bool) {
    let family = match rd.first_of(&[
        ["mu", "sigma"],
        ["mean", "std"],
        ["mean", "stddev"],
        ["location", "scale"],
    ]) {
        Some([mu, sigma]) => Family::Normal {
            mu: rd.finite("mu", mu, 1.0),
            sigma: rd.positive("sigma", sigma, 1.0),
        },
        None => {
            rd.unrecognised();
            Family::Normal { mu: 1.0, sigma: 1.0 }
        }
    };
    (family, rd.degraded)
}
