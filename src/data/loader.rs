use std::path::Path;

use anyhow::{Context, Result, bail};

use super::model::{Spectrum, SpectrumSet};

/// Extensions picked up by [`load_folder`], compared case-insensitively.
pub const SPECTRUM_EXTENSIONS: [&str; 2] = ["txt", "asc"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a folder of spectra, or a single spectrum file.
pub fn load_path(path: &Path) -> Result<SpectrumSet> {
    if path.is_dir() {
        load_folder(path)
    } else {
        let spectrum = load_file(path)?;
        Ok(SpectrumSet::from_spectra(vec![spectrum]))
    }
}

/// Load every `.txt` / `.asc` file in `dir`.
///
/// Files that cannot be parsed are skipped with a warning; the folder as a
/// whole fails only when nothing usable is found.
pub fn load_folder(dir: &Path) -> Result<SpectrumSet> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading folder {}", dir.display()))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry.context("reading folder entry")?.path();
        if path.is_file() && has_spectrum_extension(&path) {
            candidates.push(path);
        }
    }
    if candidates.is_empty() {
        bail!("No .txt or .asc files found in {}", dir.display());
    }
    candidates.sort();

    let mut spectra = Vec::with_capacity(candidates.len());
    for path in &candidates {
        match load_file(path) {
            Ok(sp) => spectra.push(sp),
            Err(e) => log::warn!("Skipping {}: {e:#}", path.display()),
        }
    }

    if spectra.is_empty() {
        bail!("No valid spectra could be read from {}", dir.display());
    }
    log::info!(
        "Loaded {} of {} spectrum files from {}",
        spectra.len(),
        candidates.len(),
        dir.display()
    );
    Ok(SpectrumSet::from_spectra(spectra))
}

/// Load a single whitespace-delimited spectrum file.
///
/// Bytes that are not valid UTF-8 (instrument headers are often Latin-1)
/// are replaced rather than rejected.
pub fn load_file(path: &Path) -> Result<Spectrum> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("spectrum")
        .to_string();
    parse_spectrum(&name, &text)
}

fn has_spectrum_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SPECTRUM_EXTENSIONS
                .iter()
                .any(|known| e.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Text parsing
// ---------------------------------------------------------------------------

/// Index of the first line whose first two whitespace-separated tokens are
/// both numbers. Everything above it is treated as header.
pub fn find_data_start(text: &str) -> Option<usize> {
    text.lines().position(|line| parse_pair(line).is_some())
}

/// Parse spectrum text: skip the header, then read the first two columns
/// as (wavelength, intensity).
///
/// Rows where either value is missing or not a finite number are dropped.
pub fn parse_spectrum(name: &str, text: &str) -> Result<Spectrum> {
    let start = find_data_start(text)
        .with_context(|| format!("{name}: no numeric two-column data found"))?;

    let (wavelength, intensity): (Vec<f64>, Vec<f64>) = text
        .lines()
        .skip(start)
        .filter_map(parse_pair)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .unzip();

    if wavelength.is_empty() {
        bail!("{name}: no valid rows after the header");
    }
    let dropped = text.lines().skip(start).filter(|l| !l.trim().is_empty()).count()
        - wavelength.len();
    if dropped > 0 {
        log::debug!("{name}: dropped {dropped} malformed rows");
    }

    Ok(Spectrum::new(name, wavelength, intensity))
}

/// First two tokens of `line` as numbers, if both parse.
fn parse_pair(line: &str) -> Option<(f64, f64)> {
    let mut tokens = line.split_whitespace();
    let x = parse_number(tokens.next()?)?;
    let y = parse_number(tokens.next()?)?;
    Some((x, y))
}

/// Parse a number, accepting a comma as decimal separator (`"1,25"`).
fn parse_number(token: &str) -> Option<f64> {
    if token.contains(',') {
        token.replace(',', ".").parse().ok()
    } else {
        token.parse().ok()
    }
}
