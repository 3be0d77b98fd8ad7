//! Step-size adaptation shared by the tunable proposals.
use serde::{Deserialize, Serialize};

/// Acceptance rate the tunable proposals aim for unless told otherwise.
pub const DEFAULT_TARGET_ACCEPTANCE: f64 = 0.44;

/// The tuning parameter a proposal exposes to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TuningParameter {
    Tunable(f64),
    NotTunable,
}

impl TuningParameter {
    pub fn is_tunable(&self) -> bool { matches!(self, TuningParameter::Tunable(_)) }

    pub fn value(&self) -> Option<f64> {
        match self {
            TuningParameter::Tunable(v) => Some(*v),
            TuningParameter::NotTunable => None,
        }
    }
}

/// A scalar step size adjusted from the observed acceptance rate.
///
/// Above the target the step shrinks by `1 + (r - p) / (1 - p)`; at or below it the
/// step grows by `2 - r / p`. Both factors are ratios, so the rule does not depend on
/// the scale of the parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSize {
    pub value: f64,
    pub target: f64,
}

impl StepSize {
    pub fn new(value: f64, target: f64) -> Self { Self { value, target } }

    pub fn tune(&mut self, rate: f64) {
        let p = self.target;
        if rate > p {
            self.value /= 1.0 + (rate - p) / (1.0 - p);
        } else {
            self.value *= 2.0 - rate / p;
        }
    }
}
