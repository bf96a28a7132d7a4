//! Panel Classification - Ratio Matching Against the Catalog
//!
//! Never fails. An unmatched ratio is a decision for the caller, returned
//! together with the closest catalog entries.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{PanelCatalog, PanelCatalogEntry};
use crate::manifest::PrintAreaSpec;

/// Number of recommendations returned for an unmatched ratio.
pub const MAX_RECOMMENDATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entry: PanelCatalogEntry,
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationResult {
    Matched {
        entry: PanelCatalogEntry,
        deviation: f64,
    },
    Unmatched {
        recommendations: Vec<Candidate>,
    },
}

impl ClassificationResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, ClassificationResult::Matched { .. })
    }

    pub fn matched_entry(&self) -> Option<&PanelCatalogEntry> {
        match self {
            ClassificationResult::Matched { entry, .. } => Some(entry),
            ClassificationResult::Unmatched { .. } => None,
        }
    }
}

/// Deviation of `ratio` from the entry's target ratio.
pub fn deviation(entry: &PanelCatalogEntry, ratio: f64) -> f64 {
    (ratio - entry.target_ratio()).abs()
}

pub fn classify(spec: &PrintAreaSpec, catalog: &PanelCatalog) -> ClassificationResult {
    let mut best: Option<Candidate> = None;
    let mut all: Vec<Candidate> = Vec::with_capacity(catalog.len());

    for entry in catalog.iter() {
        let dev = deviation(entry, spec.ratio);
        debug!(panel = %entry.name, deviation = dev, tolerance = entry.tolerance, "Panel candidate");

        // strict `<` keeps the first entry on ties
        if dev <= entry.tolerance && best.as_ref().map_or(true, |b| dev < b.deviation) {
            best = Some(Candidate { entry: entry.clone(), deviation: dev });
        }
        all.push(Candidate { entry: entry.clone(), deviation: dev });
    }

    if let Some(Candidate { entry, deviation }) = best {
        info!(panel = %entry.name, ratio = spec.ratio, deviation, "Panel type matched");
        return ClassificationResult::Matched { entry, deviation };
    }

    // stable sort keeps catalog order among equal deviations
    all.sort_by(|a, b| a.deviation.total_cmp(&b.deviation));
    all.truncate(MAX_RECOMMENDATIONS);
    info!(ratio = spec.ratio, recommendations = all.len(), "No panel type within tolerance");
    ClassificationResult::Unmatched { recommendations: all }
}
