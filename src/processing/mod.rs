/// Processing pipeline applied to one spectrum:
///
/// ```text
///   intensity ──► [normalize to max] ──► method ──► processed intensity
///                                          │
///                    subtract-min / airPLS / moving average / Savitzky–Golay
/// ```
pub mod smoothing;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::baseline::{AirPls, BaselineError, BaselineFit};
use crate::data::model::Spectrum;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("baseline estimation failed: {0}")]
    Baseline(#[from] BaselineError),
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// Main processing method.
///
/// JSON form: `{"kind": "airpls", "lambda": 1e5}`,
/// `{"kind": "savgol", "window": 11, "order": 2}`, ...
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Method {
    /// Subtract the minimum intensity.
    #[serde(rename = "min")]
    SubtractMin,
    /// Subtract an airPLS baseline.
    #[serde(rename = "airpls")]
    AirPls(AirPls),
    MovingAverage {
        #[serde(default = "default_moving_average_window")]
        window: usize,
    },
    #[serde(rename = "savgol")]
    SavitzkyGolay {
        #[serde(default = "default_savgol_window")]
        window: usize,
        #[serde(default = "default_savgol_order")]
        order: usize,
    },
}

pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 5;
pub const DEFAULT_SAVGOL_WINDOW: usize = 11;
pub const DEFAULT_SAVGOL_ORDER: usize = 2;

fn default_moving_average_window() -> usize {
    DEFAULT_MOVING_AVERAGE_WINDOW
}

fn default_savgol_window() -> usize {
    DEFAULT_SAVGOL_WINDOW
}

fn default_savgol_order() -> usize {
    DEFAULT_SAVGOL_ORDER
}

impl Method {
    pub fn moving_average() -> Self {
        Method::MovingAverage {
            window: DEFAULT_MOVING_AVERAGE_WINDOW,
        }
    }

    pub fn savitzky_golay() -> Self {
        Method::SavitzkyGolay {
            window: DEFAULT_SAVGOL_WINDOW,
            order: DEFAULT_SAVGOL_ORDER,
        }
    }

    /// Parameter checks that do not depend on the spectrum length.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        match *self {
            Method::SubtractMin => Ok(()),
            Method::AirPls(params) => Ok(params.validate()?),
            Method::MovingAverage { window } => {
                if window == 0 {
                    return Err(ProcessingError::InvalidParameter(
                        "moving-average window must be at least 1".into(),
                    ));
                }
                Ok(())
            }
            Method::SavitzkyGolay { window, order } => {
                if window <= order {
                    return Err(ProcessingError::InvalidParameter(format!(
                        "Savitzky-Golay window ({window}) must be larger than the polynomial order ({order})"
                    )));
                }
                if window % 2 == 0 {
                    return Err(ProcessingError::InvalidParameter(format!(
                        "Savitzky-Golay window must be odd, got {window}"
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Method::SubtractMin => "min",
            Method::AirPls(_) => "airpls",
            Method::MovingAverage { .. } => "moving_average",
            Method::SavitzkyGolay { .. } => "savgol",
        }
    }
}

/// Type of measurement; decides which methods make sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    /// UV-Vis absorption: baseline correction.
    Absorption,
    /// Luminescence: normalization and smoothing.
    Luminescence,
}

impl ExperimentKind {
    pub fn allows(&self, method: &Method) -> bool {
        match self {
            ExperimentKind::Absorption => {
                matches!(method, Method::SubtractMin | Method::AirPls(_))
            }
            ExperimentKind::Luminescence => matches!(
                method,
                Method::MovingAverage { .. } | Method::SavitzkyGolay { .. }
            ),
        }
    }
}

/// What to do to each selected spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSteps {
    /// Divide by the maximum intensity first (when it is positive).
    pub normalize: bool,
    pub method: Option<Method>,
}

impl ProcessingSteps {
    /// Nothing to do: processing would reproduce the raw data.
    pub fn is_noop(&self) -> bool {
        !self.normalize && self.method.is_none()
    }

    pub fn validate(&self) -> Result<(), ProcessingError> {
        match &self.method {
            Some(method) => method.validate(),
            None => Ok(()),
        }
    }

    /// [`validate`](Self::validate) plus the experiment-type restrictions.
    pub fn validate_for(&self, kind: ExperimentKind) -> Result<(), ProcessingError> {
        self.validate()?;
        if let Some(method) = &self.method {
            if !kind.allows(method) {
                return Err(ProcessingError::InvalidParameter(format!(
                    "method '{}' is not available for {kind:?} spectra",
                    method.label()
                )));
            }
        }
        if self.normalize && kind == ExperimentKind::Absorption {
            return Err(ProcessingError::InvalidParameter(
                "normalization is only offered for luminescence spectra".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Result of processing one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub spectrum: Spectrum,
    /// Present when the method was airPLS.
    pub baseline: Option<BaselineFit>,
}

/// Apply `steps` to a copy of `spectrum`.
pub fn process_spectrum(
    spectrum: &Spectrum,
    steps: &ProcessingSteps,
) -> Result<Processed, ProcessingError> {
    steps.validate()?;
    let mut intensity = spectrum.intensity.clone();

    if steps.normalize {
        let max = intensity.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max > 0.0 {
            intensity.iter_mut().for_each(|v| *v /= max);
        }
    }

    let mut baseline = None;
    match steps.method {
        None => {}
        Some(Method::SubtractMin) => {
            let min = intensity.iter().copied().fold(f64::INFINITY, f64::min);
            if min.is_finite() {
                intensity.iter_mut().for_each(|v| *v -= min);
            }
        }
        Some(Method::AirPls(params)) => {
            let fit = params.fit(&intensity, None)?;
            intensity = fit.corrected(&intensity);
            baseline = Some(fit);
        }
        Some(Method::MovingAverage { window }) => {
            intensity = smoothing::moving_average(&intensity, window)?;
        }
        Some(Method::SavitzkyGolay { window, order }) => {
            intensity = smoothing::savitzky_golay(&intensity, window, order)?;
        }
    }

    Ok(Processed {
        spectrum: spectrum.with_intensity(intensity),
        baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(intensity: Vec<f64>) -> Spectrum {
        let wavelength = (0..intensity.len()).map(|i| 400.0 + i as f64).collect();
        Spectrum::new("s.txt", wavelength, intensity)
    }

    #[test]
    fn noop_returns_raw() {
        let sp = spectrum(vec![1.0, 2.0, 3.0]);
        let steps = ProcessingSteps::default();
        assert!(steps.is_noop());
        let out = process_spectrum(&sp, &steps).unwrap();
        assert_eq!(out.spectrum, sp);
        assert!(out.baseline.is_none());
    }

    #[test]
    fn normalize_then_smooth() {
        let sp = spectrum(vec![2.0, 4.0, 8.0, 4.0, 2.0]);
        let steps = ProcessingSteps {
            normalize: true,
            method: Some(Method::MovingAverage { window: 1 }),
        };
        let out = process_spectrum(&sp, &steps).unwrap();
        assert_eq!(out.spectrum.intensity, vec![0.25, 0.5, 1.0, 0.5, 0.25]);
        assert_eq!(out.spectrum.wavelength, sp.wavelength);
    }

    #[test]
    fn normalize_skips_non_positive_max() {
        let sp = spectrum(vec![-3.0, -1.0, -2.0]);
        let steps = ProcessingSteps {
            normalize: true,
            method: None,
        };
        let out = process_spectrum(&sp, &steps).unwrap();
        assert_eq!(out.spectrum.intensity, sp.intensity);
    }

    #[test]
    fn subtract_min() {
        let sp = spectrum(vec![5.0, 3.0, 7.0]);
        let steps = ProcessingSteps {
            normalize: false,
            method: Some(Method::SubtractMin),
        };
        let out = process_spectrum(&sp, &steps).unwrap();
        assert_eq!(out.spectrum.intensity, vec![2.0, 0.0, 4.0]);
    }

    #[test]
    fn airpls_keeps_fit_and_subtracts_it() {
        let sp = spectrum(vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0]);
        let steps = ProcessingSteps {
            normalize: false,
            method: Some(Method::AirPls(AirPls {
                lambda: 1e3,
                ..AirPls::default()
            })),
        };
        let out = process_spectrum(&sp, &steps).unwrap();
        let fit = out.baseline.expect("airPLS result carries its fit");
        for ((p, raw), b) in out.spectrum.intensity.iter().zip(&sp.intensity).zip(&fit.baseline) {
            assert!((p - (raw - b)).abs() < 1e-12);
        }
    }

    #[test]
    fn airpls_errors_propagate() {
        let sp = spectrum(vec![1.0, 2.0]);
        let steps = ProcessingSteps {
            normalize: false,
            method: Some(Method::AirPls(AirPls::default())),
        };
        let err = process_spectrum(&sp, &steps).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::Baseline(BaselineError::InvalidInput(_))
        ));
    }

    #[test]
    fn savgol_window_longer_than_spectrum() {
        let sp = spectrum(vec![1.0; 5]);
        let steps = ProcessingSteps {
            normalize: false,
            method: Some(Method::savitzky_golay()),
        };
        assert!(matches!(
            process_spectrum(&sp, &steps),
            Err(ProcessingError::InvalidParameter(_))
        ));
    }

    #[test]
    fn experiment_restrictions() {
        let airpls = ProcessingSteps {
            normalize: false,
            method: Some(Method::AirPls(AirPls::default())),
        };
        assert!(airpls.validate_for(ExperimentKind::Absorption).is_ok());
        assert!(airpls.validate_for(ExperimentKind::Luminescence).is_err());

        let smooth = ProcessingSteps {
            normalize: true,
            method: Some(Method::moving_average()),
        };
        assert!(smooth.validate_for(ExperimentKind::Luminescence).is_ok());
        assert!(smooth.validate_for(ExperimentKind::Absorption).is_err());

        let bad = ProcessingSteps {
            normalize: false,
            method: Some(Method::SavitzkyGolay { window: 5, order: 5 }),
        };
        assert!(bad.validate_for(ExperimentKind::Luminescence).is_err());
    }

    #[test]
    fn recipe_from_json() {
        let steps: ProcessingSteps =
            serde_json::from_str(r#"{"method": {"kind": "airpls", "lambda": 100000.0}}"#).unwrap();
        assert!(!steps.normalize);
        match steps.method {
            Some(Method::AirPls(p)) => {
                assert_eq!(p.lambda, 1e5);
                assert_eq!(p.p, 0.01);
            }
            other => panic!("unexpected method {other:?}"),
        }

        let steps: ProcessingSteps =
            serde_json::from_str(r#"{"normalize": true, "method": {"kind": "savgol"}}"#).unwrap();
        assert_eq!(steps.method, Some(Method::savitzky_golay()));

        let steps: ProcessingSteps = serde_json::from_str("{}").unwrap();
        assert!(steps.is_noop());
    }
}
