use std::collections::{BTreeMap, BTreeSet};

use crate::data::model::{Spectrum, SpectrumSet};
use crate::processing::{Processed, ProcessingError, ProcessingSteps, process_spectrum};

// ---------------------------------------------------------------------------
// Selection gestures
// ---------------------------------------------------------------------------

/// How a spectrum in the list was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    /// Toggle and move the range anchor here.
    Plain,
    /// Toggle, then give every spectrum between the anchor and this one the
    /// same state. The anchor stays put (or is set, if there is none yet).
    Shift,
    /// Toggle without moving the anchor.
    Ctrl,
}

// ---------------------------------------------------------------------------
// Workspace state
// ---------------------------------------------------------------------------

/// Outcome of [`Workspace::apply`].
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub processed: usize,
    pub failed: Vec<(String, ProcessingError)>,
}

/// Loaded spectra plus everything the user has done to them.
#[derive(Default)]
pub struct Workspace {
    /// Loaded spectra (None until a folder is loaded).
    pub dataset: Option<SpectrumSet>,

    /// Names of the selected spectra.
    pub selected: BTreeSet<String>,

    /// Processed results, keyed by spectrum name.
    pub processed: BTreeMap<String, Processed>,

    /// Last per-spectrum processing failure, keyed by spectrum name.
    pub failures: BTreeMap<String, ProcessingError>,

    /// Processing results exist that have not been exported yet.
    pub processing_applied: bool,

    /// Range anchor for shift-clicks (index into the dataset).
    anchor: Option<usize>,
}

impl Workspace {
    /// Replace the loaded spectra. Everything is selected, previous results
    /// are dropped.
    pub fn set_dataset(&mut self, dataset: SpectrumSet) {
        self.selected = dataset.names().map(str::to_string).collect();
        self.processed.clear();
        self.failures.clear();
        self.processing_applied = false;
        self.anchor = None;
        self.dataset = Some(dataset);
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Selected spectra in dataset order.
    pub fn selected_spectra(&self) -> impl Iterator<Item = &Spectrum> {
        self.dataset
            .iter()
            .flat_map(|ds| ds.spectra.iter())
            .filter(|sp| self.selected.contains(&sp.name))
    }

    pub fn select_all(&mut self) {
        if let Some(ds) = &self.dataset {
            self.selected = ds.names().map(str::to_string).collect();
        }
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
    }

    /// Restrict the selection to `names`. Unknown names are reported back.
    pub fn select_only<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut unknown = Vec::new();
        self.selected.clear();
        for name in names {
            match &self.dataset {
                Some(ds) if ds.get(name).is_some() => {
                    self.selected.insert(name.to_string());
                }
                _ => unknown.push(name.to_string()),
            }
        }
        unknown
    }

    /// Handle a click on `name` in the spectrum list.
    pub fn click(&mut self, name: &str, click: Click) {
        let Some(index) = self.dataset.as_ref().and_then(|ds| ds.position(name)) else {
            return;
        };
        let now_selected = !self.selected.contains(name);
        self.set_selected(name, now_selected);

        match click {
            Click::Plain => self.anchor = Some(index),
            Click::Ctrl => {}
            Click::Shift => match self.anchor {
                Some(anchor) => {
                    let (lo, hi) = (anchor.min(index), anchor.max(index));
                    let names: Vec<String> = self
                        .dataset
                        .iter()
                        .flat_map(|ds| ds.spectra[lo..=hi].iter())
                        .map(|sp| sp.name.clone())
                        .collect();
                    for n in names {
                        self.set_selected(&n, now_selected);
                    }
                }
                // Behaves like a plain click until an anchor exists.
                None => self.anchor = Some(index),
            },
        }
    }

    fn set_selected(&mut self, name: &str, selected: bool) {
        if selected {
            self.selected.insert(name.to_string());
        } else {
            self.selected.remove(name);
        }
    }

    /// Process every selected spectrum with `steps`.
    ///
    /// A no-op recipe resets processing instead. A failing spectrum is
    /// recorded in [`failures`](Self::failures) and keeps its previous
    /// result; the others are still processed.
    pub fn apply(&mut self, steps: &ProcessingSteps) -> ApplySummary {
        let mut summary = ApplySummary::default();
        if steps.is_noop() {
            self.reset_processing();
            return summary;
        }

        let results: Vec<(String, Result<Processed, ProcessingError>)> = self
            .selected_spectra()
            .map(|sp| (sp.name.clone(), process_spectrum(sp, steps)))
            .collect();

        for (name, result) in results {
            match result {
                Ok(processed) => {
                    self.failures.remove(&name);
                    self.processed.insert(name, processed);
                    summary.processed += 1;
                }
                Err(e) => {
                    log::warn!("Processing {name} failed: {e}");
                    self.failures.insert(name.clone(), e.clone());
                    summary.failed.push((name, e));
                }
            }
        }

        if summary.processed > 0 {
            self.processing_applied = true;
        }
        log::info!(
            "Processed {} spectra ({} failed)",
            summary.processed,
            summary.failed.len()
        );
        summary
    }

    /// Drop all processed results, going back to the raw data.
    pub fn reset_processing(&mut self) {
        self.processed.clear();
        self.failures.clear();
        self.processing_applied = false;
    }

    /// Selected spectra paired with what should be exported for them: the
    /// processed result when there is one, otherwise the raw spectrum.
    pub fn exportable(&self) -> Vec<(&Spectrum, Option<&Processed>)> {
        self.selected_spectra()
            .map(|sp| (sp, self.processed.get(&sp.name)))
            .collect()
    }

    /// Exporting clears the unsaved-changes flag.
    pub fn mark_exported(&mut self) {
        self.processing_applied = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::AirPls;
    use crate::processing::Method;

    fn workspace(names: &[&str]) -> Workspace {
        let spectra = names
            .iter()
            .map(|n| Spectrum::new(*n, vec![1.0, 2.0, 3.0, 4.0], vec![4.0, 2.0, 3.0, 5.0]))
            .collect();
        let mut ws = Workspace::default();
        ws.set_dataset(SpectrumSet::from_spectra(spectra));
        ws
    }

    fn selected(ws: &Workspace) -> Vec<&str> {
        ws.selected.iter().map(String::as_str).collect()
    }

    #[test]
    fn new_dataset_is_fully_selected() {
        let ws = workspace(&["b", "a", "c"]);
        assert_eq!(selected(&ws), vec!["a", "b", "c"]);
        assert!(!ws.processing_applied);
    }

    #[test]
    fn plain_and_shift_click_range() {
        let mut ws = workspace(&["a", "b", "c", "d", "e"]);
        ws.select_none();
        ws.click("b", Click::Plain);
        assert_eq!(selected(&ws), vec!["b"]);
        ws.click("d", Click::Shift);
        assert_eq!(selected(&ws), vec!["b", "c", "d"]);

        // Shift-deselect propagates the new (unchecked) state.
        ws.click("c", Click::Shift);
        assert_eq!(selected(&ws), vec!["d"]);
    }

    #[test]
    fn ctrl_click_keeps_anchor() {
        let mut ws = workspace(&["a", "b", "c", "d"]);
        ws.select_none();
        ws.click("a", Click::Plain);
        ws.click("d", Click::Ctrl);
        ws.click("c", Click::Shift);
        assert_eq!(selected(&ws), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn shift_without_anchor_sets_it() {
        let mut ws = workspace(&["a", "b", "c"]);
        ws.click("b", Click::Shift);
        assert_eq!(selected(&ws), vec!["a", "c"]);
        ws.click("c", Click::Shift);
        assert_eq!(selected(&ws), vec!["a"]);
    }

    #[test]
    fn select_none_then_all() {
        let mut ws = workspace(&["a", "b"]);
        ws.select_none();
        assert!(!ws.is_selected("a"));
        assert_eq!(ws.selected_spectra().count(), 0);
        ws.select_all();
        assert!(ws.is_selected("a") && ws.is_selected("b"));
    }

    #[test]
    fn select_only_reports_unknown_names() {
        let mut ws = workspace(&["a", "b"]);
        let unknown = ws.select_only(["b", "zzz"]);
        assert_eq!(unknown, vec!["zzz".to_string()]);
        assert_eq!(selected(&ws), vec!["b"]);
    }

    #[test]
    fn apply_processes_selected_only() {
        let mut ws = workspace(&["a", "b"]);
        ws.click("a", Click::Plain);
        let steps = ProcessingSteps {
            normalize: false,
            method: Some(Method::SubtractMin),
        };
        let summary = ws.apply(&steps);
        assert_eq!(summary.processed, 1);
        assert!(summary.failed.is_empty());
        assert!(ws.processing_applied);
        assert_eq!(
            ws.processed["b"].spectrum.intensity,
            vec![2.0, 0.0, 1.0, 3.0]
        );
        assert!(!ws.processed.contains_key("a"));

        let export = ws.exportable();
        assert_eq!(export.len(), 1);
        assert!(export[0].1.is_some());

        ws.mark_exported();
        assert!(!ws.processing_applied);
    }

    #[test]
    fn failures_are_recorded_per_spectrum() {
        let mut ws = Workspace::default();
        ws.set_dataset(SpectrumSet::from_spectra(vec![
            Spectrum::new("short", vec![1.0, 2.0], vec![1.0, 1.0]),
            Spectrum::new("long", vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0]),
        ]));
        let steps = ProcessingSteps {
            normalize: false,
            method: Some(Method::AirPls(AirPls::default())),
        };
        let summary = ws.apply(&steps);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "short");
        assert!(ws.failures.contains_key("short"));

        // The failed spectrum still exports its raw data.
        let export = ws.exportable();
        let short = export.iter().find(|(sp, _)| sp.name == "short").unwrap();
        assert!(short.1.is_none());
    }

    #[test]
    fn noop_recipe_resets() {
        let mut ws = workspace(&["a"]);
        ws.apply(&ProcessingSteps {
            normalize: false,
            method: Some(Method::SubtractMin),
        });
        assert!(!ws.processed.is_empty());
        let summary = ws.apply(&ProcessingSteps::default());
        assert_eq!(summary.processed, 0);
        assert!(ws.processed.is_empty());
        assert!(!ws.processing_applied);
    }
}
