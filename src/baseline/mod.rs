/// Baseline estimation by adaptive iteratively reweighted penalized least
/// squares (airPLS).
///
/// ```text
///   signal y ──► Whittaker fit  (W + λ·DᵀD)·b = W·y
///                    │
///                    ▼
///               residual r = y − b ──► no r < 0 ? ──► done
///                    │
///                    ▼
///               w_i = 0             if r_i ≥ 0
///               w_i = exp(i·r_i/Σ|r⁻|) otherwise
///                    │
///                    ▼
///               ‖Δw‖/‖w‖ < tol ? ──► done, else next round
/// ```
///
/// The Whittaker step is solved for the correction `δ = b − y`, i.e.
/// `(W + λ·DᵀD)·δ = −λ·DᵀD·y`, which is the same system rearranged. A flat
/// signal then yields `δ = 0` exactly instead of round-off noise.
mod banded;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use banded::SecondDifferencePenalty;

/// Residuals above `-RESIDUAL_FLOOR_RTOL * max|y|` count as "not below the
/// baseline" for the stopping test. Keeps solver round-off from being read as
/// signal when the weighted points are already fitted exactly.
const RESIDUAL_FLOOR_RTOL: f64 = 1e-8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BaselineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("penalized least-squares system is singular (row {row})")]
    SingularSystem { row: usize },
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// airPLS parameters. Missing fields deserialize to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirPls {
    /// Smoothness penalty λ; larger is stiffer.
    pub lambda: f64,
    /// Asymmetry. Validated and carried along, but the exponential
    /// reweighting does not use it.
    pub p: f64,
    pub max_iterations: usize,
    /// Threshold on `‖w_old − w_new‖ / ‖w_old‖`.
    pub tolerance: f64,
}

impl Default for AirPls {
    fn default() -> Self {
        Self {
            lambda: 1e7,
            p: 0.01,
            max_iterations: 50,
            tolerance: 1e-3,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why the reweighting loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The baseline lies on or below every sample.
    NoNegativeResiduals,
    /// The weight vector changed less than the tolerance.
    Converged,
    /// `max_iterations` rounds ran without either of the above.
    MaxIterations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Final per-sample weights. Zero marks a sample treated as peak.
    pub weights: Vec<f64>,
    /// Number of Whittaker fits performed.
    pub iterations: usize,
    pub termination: Termination,
    /// Relative weight change of the last reweighting round, if one ran.
    pub relative_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineFit {
    pub baseline: Vec<f64>,
    pub diagnostics: Diagnostics,
}

impl BaselineFit {
    /// `signal − baseline`.
    pub fn corrected(&self, signal: &[f64]) -> Vec<f64> {
        signal
            .iter()
            .zip(&self.baseline)
            .map(|(y, b)| y - b)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

impl AirPls {
    pub fn validate(&self) -> Result<(), BaselineError> {
        if !(self.lambda.is_finite() && self.lambda > 0.0) {
            return Err(BaselineError::InvalidInput(format!(
                "lambda must be a positive finite number, got {}",
                self.lambda
            )));
        }
        if !(self.p > 0.0 && self.p < 1.0) {
            return Err(BaselineError::InvalidInput(format!(
                "p must lie in (0, 1), got {}",
                self.p
            )));
        }
        if self.max_iterations == 0 {
            return Err(BaselineError::InvalidInput(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(BaselineError::InvalidInput(format!(
                "tolerance must be a positive finite number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Estimate the baseline of `signal`.
    ///
    /// `initial_weights` defaults to all ones. The signal is never modified;
    /// subtract [`BaselineFit::baseline`] (or call [`BaselineFit::corrected`])
    /// to obtain the corrected spectrum.
    pub fn fit(
        &self,
        signal: &[f64],
        initial_weights: Option<&[f64]>,
    ) -> Result<BaselineFit, BaselineError> {
        self.validate()?;
        let n = signal.len();
        if n < 3 {
            return Err(BaselineError::InvalidInput(format!(
                "signal needs at least 3 samples, got {n}"
            )));
        }
        if let Some(idx) = signal.iter().position(|v| !v.is_finite()) {
            return Err(BaselineError::InvalidInput(format!(
                "signal[{idx}] is not finite"
            )));
        }

        let mut weights = match initial_weights {
            Some(w) => {
                check_weights(w, n)?;
                w.to_vec()
            }
            None => vec![1.0; n],
        };

        let penalty = SecondDifferencePenalty::new(n, self.lambda);
        let rhs: Vec<f64> = penalty.apply(signal).into_iter().map(|v| -v).collect();
        let floor = RESIDUAL_FLOOR_RTOL * signal.iter().fold(0.0_f64, |m, v| m.max(v.abs()));

        let mut baseline = Vec::new();
        let mut termination = Termination::MaxIterations;
        let mut relative_change = None;
        let mut iterations = 0;

        for i in 1..=self.max_iterations {
            iterations = i;
            let correction = penalty.solve(&weights, &rhs)?;
            baseline = signal
                .iter()
                .zip(&correction)
                .map(|(y, d)| y + d)
                .collect();
            let residual: Vec<f64> = signal.iter().zip(&baseline).map(|(y, b)| y - b).collect();

            if residual.iter().all(|&r| r >= -floor) {
                termination = Termination::NoNegativeResiduals;
                break;
            }

            let updated = reweight(&residual, i);
            let change = relative_change_between(&weights, &updated);
            relative_change = Some(change);
            debug!(
                "airPLS iteration {i}: {} peak samples, relative weight change {change:.3e}",
                updated.iter().filter(|&&w| w == 0.0).count()
            );

            if change < self.tolerance {
                termination = Termination::Converged;
                break;
            }
            weights = updated;
        }

        debug!("airPLS stopped after {iterations} iterations ({termination:?})");

        Ok(BaselineFit {
            baseline,
            diagnostics: Diagnostics {
                weights,
                iterations,
                termination,
                relative_change,
            },
        })
    }
}

/// Convenience wrapper around [`AirPls::fit`].
pub fn estimate_baseline(
    signal: &[f64],
    params: &AirPls,
    initial_weights: Option<&[f64]>,
) -> Result<BaselineFit, BaselineError> {
    params.fit(signal, initial_weights)
}

/// One airPLS weight update for round `iteration` (1-based).
///
/// Samples at or above the baseline get weight 0; samples below it get
/// `exp(iteration · r / Σ|r⁻|)`. The exponent lies in `[-iteration, 0)`, so
/// the update cannot overflow.
pub fn reweight(residual: &[f64], iteration: usize) -> Vec<f64> {
    let d_sum: f64 = residual.iter().filter(|&&r| r < 0.0).map(|r| r.abs()).sum();
    let scale = iteration as f64 / d_sum;
    residual
        .iter()
        .map(|&r| if r < 0.0 { (scale * r).exp() } else { 0.0 })
        .collect()
}

fn relative_change_between(old: &[f64], new: &[f64]) -> f64 {
    let norm = old.iter().map(|w| w * w).sum::<f64>().sqrt();
    if norm == 0.0 {
        return f64::INFINITY;
    }
    let diff = old
        .iter()
        .zip(new)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    diff / norm
}

fn check_weights(weights: &[f64], n: usize) -> Result<(), BaselineError> {
    if weights.len() != n {
        return Err(BaselineError::InvalidInput(format!(
            "expected {n} initial weights, got {}",
            weights.len()
        )));
    }
    if let Some(idx) = weights.iter().position(|w| !(w.is_finite() && *w >= 0.0)) {
        return Err(BaselineError::InvalidInput(format!(
            "initial weight [{idx}] must be finite and non-negative, got {}",
            weights[idx]
        )));
    }
    Ok(())
}
