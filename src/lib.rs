//! Spectroscopy text-file processing: loading whitespace-delimited spectra,
//! airPLS baseline correction, smoothing and normalization.

pub mod baseline;
pub mod data;
pub mod processing;
pub mod report;
pub mod state;
