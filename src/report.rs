use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::baseline::Diagnostics;
use crate::processing::ProcessingSteps;
use crate::state::Workspace;

// ---------------------------------------------------------------------------
// JSON processing report
// ---------------------------------------------------------------------------

/// One selected spectrum: raw data, processed data and airPLS diagnostics.
#[derive(Debug, Serialize)]
pub struct SpectrumReport<'a> {
    pub name: &'a str,
    pub wavelength: &'a [f64],
    pub raw: &'a [f64],
    /// Processed intensity, or the raw one when nothing was applied.
    pub processed: &'a [f64],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<&'a [f64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<&'a Diagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub steps: &'a ProcessingSteps,
    pub spectra: Vec<SpectrumReport<'a>>,
}

/// Collect the exportable spectra of `workspace`.
pub fn build_report<'a>(workspace: &'a Workspace, steps: &'a ProcessingSteps) -> Report<'a> {
    let spectra = workspace
        .exportable()
        .into_iter()
        .map(|(raw, processed)| {
            let fit = processed.and_then(|p| p.baseline.as_ref());
            SpectrumReport {
                name: &raw.name,
                wavelength: &raw.wavelength,
                raw: &raw.intensity,
                processed: processed
                    .map(|p| p.spectrum.intensity.as_slice())
                    .unwrap_or(&raw.intensity),
                baseline: fit.map(|f| f.baseline.as_slice()),
                diagnostics: fit.map(|f| &f.diagnostics),
                error: workspace.failures.get(&raw.name).map(|e| e.to_string()),
            }
        })
        .collect();
    Report { steps, spectra }
}

/// Pretty-printed JSON.
pub fn write_report<W: Write>(report: &Report<'_>, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report).context("serializing report")?;
    writeln!(writer).context("writing report")?;
    Ok(())
}
