/// Data layer: spectrum types and loading.
///
/// Architecture:
/// ```text
///  folder of .txt / .asc
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  skip header → (wavelength, intensity) rows
///   └──────────┘
///        │
///        ▼
///   ┌─────────────┐
///   │ SpectrumSet │  Vec<Spectrum>, ordered by file name
///   └─────────────┘
/// ```

pub mod loader;
pub mod model;
