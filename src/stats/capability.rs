//! Numeric capability detection.
//!
//! Run once per pipeline run. Each capability runs a known-answer self-check;
//! it is available iff it is not disabled by configuration and the check
//! passes. The engine consults the result instead of catching failures
//! statistic by statistic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::Capability;
use crate::math::{excess_kurtosis, linear_fit, percentile, skewness};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CapabilityStatus {
    Available,
    Disabled,
    FailedSelfCheck { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    status: BTreeMap<Capability, CapabilityStatus>,
}

impl CapabilitySet {
    pub fn detect(disabled: &[Capability]) -> Self {
        let status = Capability::ALL
            .iter()
            .map(|&cap| {
                let state = if disabled.contains(&cap) {
                    CapabilityStatus::Disabled
                } else {
                    match self_check(cap) {
                        Ok(()) => CapabilityStatus::Available,
                        Err(detail) => CapabilityStatus::FailedSelfCheck { detail },
                    }
                };
                match &state {
                    CapabilityStatus::Available => debug!(capability = cap.as_str(), "capability available"),
                    other => warn!(capability = cap.as_str(), status = ?other, "capability unavailable"),
                }
                (cap, state)
            })
            .collect();
        Self { status }
    }

    pub fn is_available(&self, capability: Capability) -> bool {
        matches!(self.status.get(&capability), Some(CapabilityStatus::Available))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, &CapabilityStatus)> {
        self.status.iter().map(|(c, s)| (*c, s))
    }
}

fn close(actual: Option<f64>, expected: f64) -> Result<(), String> {
    match actual {
        Some(v) if (v - expected).abs() < 1e-9 => Ok(()),
        other => Err(format!("expected {expected}, got {other:?}")),
    }
}

fn self_check(capability: Capability) -> Result<(), String> {
    match capability {
        Capability::Moments => {
            close(excess_kurtosis(&[1.0, 2.0, 3.0, 4.0]), -1.36)?;
            close(skewness(&[1.0, 2.0, 3.0, 4.0]), 0.0)
        }
        Capability::Regression => {
            let fit = linear_fit(&[0.0, 1.0, 2.0], &[2.0, 5.0, 8.0]);
            close(fit.map(|f| f.slope), 3.0)?;
            close(fit.map(|f| f.intercept), 2.0)
        }
        Capability::Quantiles => {
            close(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5)?;
            close(percentile(&[1.0, 2.0, 3.0, 4.0], 25.0), 1.75)
        }
    }
}
