use serde::Serialize;

// ---------------------------------------------------------------------------
// Spectrum – one parsed text file
// ---------------------------------------------------------------------------

/// A single spectrum read from one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrum {
    /// File name the spectrum was read from; doubles as its identifier.
    pub name: String,
    /// Wavelength axis (x).
    pub wavelength: Vec<f64>,
    /// Intensity / absorbance axis (y) – same length as `wavelength`.
    pub intensity: Vec<f64>,
}

impl Spectrum {
    pub fn new(name: impl Into<String>, wavelength: Vec<f64>, intensity: Vec<f64>) -> Self {
        debug_assert_eq!(wavelength.len(), intensity.len());
        Self {
            name: name.into(),
            wavelength,
            intensity,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    /// Same axis and name, new intensity values.
    pub fn with_intensity(&self, intensity: Vec<f64>) -> Self {
        Self {
            name: self.name.clone(),
            wavelength: self.wavelength.clone(),
            intensity,
        }
    }
}

// ---------------------------------------------------------------------------
// SpectrumSet – everything loaded from one folder
// ---------------------------------------------------------------------------

/// Loaded spectra, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct SpectrumSet {
    pub spectra: Vec<Spectrum>,
}

impl SpectrumSet {
    /// Sort by name so that listing order is stable across platforms.
    pub fn from_spectra(mut spectra: Vec<Spectrum>) -> Self {
        spectra.sort_by(|a, b| a.name.cmp(&b.name));
        SpectrumSet { spectra }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.spectra.iter().map(|s| s.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Spectrum> {
        self.spectra.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.spectra.iter().position(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_sorted_by_name() {
        let set = SpectrumSet::from_spectra(vec![
            Spectrum::new("b.txt", vec![1.0], vec![2.0]),
            Spectrum::new("a.txt", vec![1.0], vec![3.0]),
        ]);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a.txt", "b.txt"]);
        assert_eq!(set.position("b.txt"), Some(1));
        assert_eq!(set.get("a.txt").map(|s| s.intensity[0]), Some(3.0));
        assert!(set.get("c.txt").is_none());
    }
}
