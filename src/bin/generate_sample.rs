use std::env;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Absorbance on a drifting baseline: `offset + slope·t + curve·t²` with
/// `t` the position in the scan scaled to `[0, 1]`.
fn generate_spectrum(
    wavelengths: &[f64],
    peaks: &[(f64, f64, f64)],
    baseline: (f64, f64, f64),
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    let (offset, slope, curve) = baseline;
    let last = (wavelengths.len().max(2) - 1) as f64;
    wavelengths
        .iter()
        .enumerate()
        .map(|(i, &wl)| {
            let t = i as f64 / last;
            let drift = offset + slope * t + curve * t * t;
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wl, mu, sigma, amp))
                .sum();
            drift + signal + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Instrument-style text: a few header lines, then `wavelength<TAB>value`.
fn render(
    sample: &str,
    conc: f64,
    wavelengths: &[f64],
    values: &[f64],
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Sample: {sample}")?;
    writeln!(out, "Concentration: {conc} mM")?;
    writeln!(out, "Wavelength (nm)\tAbsorbance")?;
    for (wl, v) in wavelengths.iter().zip(values) {
        writeln!(out, "{wl:.1}\t{v:.6}")?;
    }
    Ok(out)
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = PathBuf::from(env::args().nth(1).unwrap_or_else(|| "sample_spectra".into()));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    // Wavelengths: 200 → 799.5 nm, step 0.5
    let wavelengths: Vec<f64> = (0..1200).map(|i| 200.0 + i as f64 * 0.5).collect();

    let concentrations = [0.1, 0.5, 1.0, 2.0];
    let samples: [(&str, Vec<(f64, f64, f64)>, (f64, f64, f64)); 3] = [
        (
            "Sample_A",
            vec![(280.0, 12.0, 0.8), (350.0, 20.0, 0.5), (520.0, 25.0, 0.3)],
            (0.05, 0.20, -0.10),
        ),
        (
            "Sample_B",
            vec![(260.0, 10.0, 0.6), (410.0, 18.0, 0.7), (600.0, 30.0, 0.4)],
            (0.10, -0.05, 0.15),
        ),
        (
            "Sample_C",
            vec![(300.0, 15.0, 0.9), (450.0, 22.0, 0.4), (700.0, 35.0, 0.5)],
            (0.00, 0.30, 0.00),
        ),
    ];

    let mut written = 0usize;
    for (sample, peaks_base, baseline) in &samples {
        for &conc in &concentrations {
            let peaks: Vec<(f64, f64, f64)> = peaks_base
                .iter()
                .map(|&(mu, sigma, amp)| (mu, sigma, amp * conc))
                .collect();
            let y = generate_spectrum(&wavelengths, &peaks, *baseline, 0.002, &mut rng);

            let path = out_dir.join(format!("{sample}_{conc}mM.txt"));
            let text = render(sample, conc, &wavelengths, &y).context("formatting spectrum")?;
            fs::write(&path, text)
                .with_context(|| format!("writing {}", path.display()))?;
            log::debug!("Wrote {}", path.display());
            written += 1;
        }
    }

    println!(
        "Wrote {written} spectra ({} wavelengths each) to {}",
        wavelengths.len(),
        out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectra_converter::data::loader::{find_data_start, parse_spectrum};

    #[test]
    fn rendered_file_loads_back() {
        let text = render("Sample_A", 0.5, &[200.0, 200.5, 201.0], &[0.1, 0.25, 0.125]).unwrap();
        assert_eq!(find_data_start(&text), Some(3));
        let sp = parse_spectrum("Sample_A_0.5mM.txt", &text).unwrap();
        assert_eq!(sp.wavelength, vec![200.0, 200.5, 201.0]);
        assert_eq!(sp.intensity, vec![0.1, 0.25, 0.125]);
    }
}
