//! Risk definitions: what is insured, when it pays, and how much.
//!
//! Every type here validates its invariants on construction (directly or
//! through `serde(try_from)`), so a `RiskDefinition` that exists is one the
//! scenario engine can evaluate without further checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result};

/// Tolerance for `=` and `!=` trigger comparisons.
pub const EQUALITY_TOLERANCE: f64 = 0.001;

/// Upper bound on the exponent of the exponential payout curve.
const MAX_EXPONENTIAL_EXPONENT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==", alias = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub metric: String,
    pub threshold: f64,
    pub operator: Operator,
    pub unit: String,
}

impl TriggerCondition {
    pub fn new(metric: impl Into<String>, operator: Operator, threshold: f64, unit: impl Into<String>) -> Self {
        TriggerCondition { metric: metric.into(), threshold, operator, unit: unit.into() }
    }

    pub fn is_triggered(&self, severity: f64) -> bool {
        let t = self.threshold;
        match self.operator {
            Operator::Ge => severity >= t,
            Operator::Le => severity <= t,
            Operator::Gt => severity > t,
            Operator::Lt => severity < t,
            Operator::Eq => (severity - t).abs() < EQUALITY_TOLERANCE,
            Operator::Ne => (severity - t).abs() >= EQUALITY_TOLERANCE,
        }
    }

    /// Distance past the threshold in the adverse direction. An exact `==`
    /// match counts as one unit of excess.
    pub fn excess(&self, severity: f64) -> f64 {
        let t = self.threshold;
        match self.operator {
            Operator::Ge | Operator::Gt => (severity - t).max(0.0),
            Operator::Le | Operator::Lt => (t - severity).max(0.0),
            Operator::Eq => {
                if (severity - t).abs() < EQUALITY_TOLERANCE {
                    1.0
                } else {
                    0.0
                }
            }
            Operator::Ne => (severity - t).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveFamily {
    Linear,
    Step,
    Exponential,
    Logarithmic,
}

impl CurveFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            CurveFamily::Linear => "linear",
            CurveFamily::Step => "step",
            CurveFamily::Exponential => "exponential",
            CurveFamily::Logarithmic => "logarithmic",
        }
    }
}

/// Unvalidated wire form of a [`PayoutCurve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutCurveSpec {
    pub family: CurveFamily,
    pub base_amount: f64,
    pub max_payout: f64,
    pub multiplier: f64,
    #[serde(default)]
    pub parameters: std::collections::BTreeMap<String, f64>,
}

/// Converts trigger excess into a payout amount, clamped to `[0, max_payout]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PayoutCurveSpec", into = "PayoutCurveSpec")]
pub struct PayoutCurve {
    inner: PayoutCurveSpec,
}

impl TryFrom<PayoutCurveSpec> for PayoutCurve {
    type Error = PricingError;

    fn try_from(f: PayoutCurveSpec) -> Result<Self> {
        let invalid = |msg: String| Err(PricingError::InvalidRiskDefinition(msg));
        if !f.base_amount.is_finite() || f.base_amount < 0.0 {
            return invalid(format!("base amount must be >= 0, got {}", f.base_amount));
        }
        if !f.max_payout.is_finite() || f.max_payout < f.base_amount {
            return invalid(format!(
                "max payout {} must be >= base amount {}",
                f.max_payout, f.base_amount
            ));
        }
        if !f.multiplier.is_finite() || f.multiplier <= 0.0 {
            return invalid(format!("multiplier must be > 0, got {}", f.multiplier));
        }
        Ok(PayoutCurve { inner: f })
    }
}

impl From<PayoutCurve> for PayoutCurveSpec {
    fn from(c: PayoutCurve) -> Self {
        c.inner
    }
}

impl PayoutCurve {
    pub fn new(family: CurveFamily, base_amount: f64, max_payout: f64, multiplier: f64) -> Result<Self> {
        PayoutCurveSpec {
            family,
            base_amount,
            max_payout,
            multiplier,
            parameters: Default::default(),
        }
        .try_into()
    }

    /// Attach curve-specific extra parameters (carried through to the audit
    /// record, not used by the built-in families).
    pub fn with_parameters(mut self, parameters: std::collections::BTreeMap<String, f64>) -> Self {
        self.inner.parameters = parameters;
        self
    }

    pub fn family(&self) -> CurveFamily {
        self.inner.family
    }

    pub fn base_amount(&self) -> f64 {
        self.inner.base_amount
    }

    pub fn max_payout(&self) -> f64 {
        self.inner.max_payout
    }

    pub fn multiplier(&self) -> f64 {
        self.inner.multiplier
    }

    pub fn parameters(&self) -> &std::collections::BTreeMap<String, f64> {
        &self.inner.parameters
    }

    pub fn payout(&self, excess: f64) -> f64 {
        let base = self.inner.base_amount;
        let mult = self.inner.multiplier;
        let raw = match self.inner.family {
            CurveFamily::Linear => base + excess * mult,
            CurveFamily::Step => base + excess.floor().max(0.0) * mult,
            CurveFamily::Exponential => {
                if excess > 0.0 {
                    let exponent = (mult / 1000.0).min(MAX_EXPONENTIAL_EXPONENT);
                    base * (1.0 + excess).powf(exponent)
                } else {
                    base
                }
            }
            CurveFamily::Logarithmic => {
                if excess > 0.0 {
                    base + mult * excess.ln_1p()
                } else {
                    base
                }
            }
        };
        let raw = if raw.is_finite() {
            raw
        } else if raw == f64::INFINITY {
            self.inner.max_payout
        } else {
            base
        };
        raw.clamp(0.0, self.inner.max_payout)
    }
}

/// Unvalidated wire form of a [`LimitStructure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitStructureSpec {
    pub trigger: TriggerCondition,
    pub payout_curve: PayoutCurve,
    #[serde(default)]
    pub deductible: f64,
    #[serde(default)]
    pub waiting_period_days: u32,
    #[serde(default = "default_policy_period")]
    pub policy_period_days: u32,
}

fn default_policy_period() -> u32 {
    365
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LimitStructureSpec", into = "LimitStructureSpec")]
pub struct LimitStructure {
    inner: LimitStructureSpec,
}

impl TryFrom<LimitStructureSpec> for LimitStructure {
    type Error = PricingError;

    fn try_from(f: LimitStructureSpec) -> Result<Self> {
        if !f.deductible.is_finite() || f.deductible < 0.0 {
            return Err(PricingError::InvalidRiskDefinition(format!(
                "deductible must be >= 0, got {}",
                f.deductible
            )));
        }
        if f.policy_period_days == 0 {
            return Err(PricingError::InvalidRiskDefinition(
                "policy period must be > 0 days".to_string(),
            ));
        }
        Ok(LimitStructure { inner: f })
    }
}

impl From<LimitStructure> for LimitStructureSpec {
    fn from(l: LimitStructure) -> Self {
        l.inner
    }
}

impl LimitStructure {
    pub fn new(
        trigger: TriggerCondition,
        payout_curve: PayoutCurve,
        deductible: f64,
        waiting_period_days: u32,
        policy_period_days: u32,
    ) -> Result<Self> {
        LimitStructureSpec { trigger, payout_curve, deductible, waiting_period_days, policy_period_days }
            .try_into()
    }

    pub fn trigger(&self) -> &TriggerCondition {
        &self.inner.trigger
    }

    pub fn payout_curve(&self) -> &PayoutCurve {
        &self.inner.payout_curve
    }

    pub fn deductible(&self) -> f64 {
        self.inner.deductible
    }

    pub fn waiting_period_days(&self) -> u32 {
        self.inner.waiting_period_days
    }

    pub fn policy_period_days(&self) -> u32 {
        self.inner.policy_period_days
    }

    /// Trigger test plus payout. Untriggered events pay 0.
    pub fn evaluate(&self, severity: f64) -> (bool, f64) {
        let trigger = &self.inner.trigger;
        if trigger.is_triggered(severity) {
            (true, self.inner.payout_curve.payout(trigger.excess(severity)))
        } else {
            (false, 0.0)
        }
    }
}

/// Immutable description of one insured peril ("peril canvas").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDefinition {
    pub peril: String,
    pub description: String,
    pub trigger_metric: String,
    #[serde(default)]
    pub data_sources: Vec<String>,
    pub limits: LimitStructure,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_coverage_period")]
    pub coverage_period: String,
}

fn default_region() -> String {
    "global".to_string()
}

fn default_coverage_period() -> String {
    "annual".to_string()
}

impl RiskDefinition {
    /// Checks the fields that the nested constructors cannot see.
    pub fn validate(&self) -> Result<()> {
        if self.peril.trim().is_empty() {
            return Err(PricingError::InvalidRiskDefinition("peril is empty".to_string()));
        }
        if self.trigger_metric.trim().is_empty() {
            return Err(PricingError::InvalidRiskDefinition("trigger metric is empty".to_string()));
        }
        if !self.limits.trigger().threshold.is_finite() {
            return Err(PricingError::InvalidRiskDefinition(
                "trigger threshold is not finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in definition for a known peril, or a generic intensity trigger.
    pub fn builtin(peril: &str, region: &str) -> Self {
        let (metric, unit, sources, description, family, op, threshold, base, max, mult) = match peril {
            "typhoon" => (
                "central_pressure", "hPa", &["JMA", "KMA", "NOAA"][..],
                "Property damage from Pacific typhoons",
                CurveFamily::Linear, Operator::Le, 950.0, 10_000.0, 2_000_000.0, 10_000.0,
            ),
            "flight_delay" => (
                "delay_minutes", "minutes", &["FlightAware", "OAG", "Airport APIs"][..],
                "Average departure delay",
                CurveFamily::Step, Operator::Ge, 60.0, 200.0, 1_000_000.0, 200.0,
            ),
            "server_downtime" => (
                "downtime_minutes", "minutes", &["Monitoring APIs", "Internal Systems"][..],
                "Business loss from server downtime",
                CurveFamily::Linear, Operator::Ge, 10.0, 500.0, 750_000.0, 500.0,
            ),
            "concert_cancellation" => (
                "event_intensity", "scale", &["Event Management APIs", "Entertainment Industry Data"][..],
                "Concert cancellation severity",
                CurveFamily::Step, Operator::Ge, 3.0, 5_000.0, 500_000.0, 5_000.0,
            ),
            "event_cancellation" => (
                "event_intensity", "scale", &["Event Management APIs", "Industry Statistics"][..],
                "Event cancellation severity",
                CurveFamily::Step, Operator::Ge, 2.0, 3_000.0, 300_000.0, 3_000.0,
            ),
            "earthquake" => (
                "magnitude", "Richter", &["USGS", "KMA", "JMA"][..],
                "Earthquake magnitude",
                CurveFamily::Linear, Operator::Ge, 1.0, 1_000.0, 100_000.0, 1_000.0,
            ),
            _ => (
                "event_intensity", "scale", &["Public APIs"][..],
                "Generic event intensity",
                CurveFamily::Linear, Operator::Ge, 1.0, 1_000.0, 100_000.0, 1_000.0,
            ),
        };
        // Table values satisfy every curve invariant.
        let curve = PayoutCurve {
            inner: PayoutCurveSpec {
                family,
                base_amount: base,
                max_payout: max,
                multiplier: mult,
                parameters: Default::default(),
            },
        };
        let limits = LimitStructure {
            inner: LimitStructureSpec {
                trigger: TriggerCondition::new(metric, op, threshold, unit),
                payout_curve: curve,
                deductible: 0.0,
                waiting_period_days: 0,
                policy_period_days: 365,
            },
        };
        RiskDefinition {
            peril: peril.to_string(),
            description: description.to_string(),
            trigger_metric: metric.to_string(),
            data_sources: sources.iter().map(|s| s.to_string()).collect(),
            limits,
            region: region.to_string(),
            coverage_period: default_coverage_period(),
        }
    }
}
