//! PanelPrint Core - Print Artifacts for Infrared Heating Panels
//!
//! Turns one order archive (SVG template, photos, JSON manifest) into a
//! single TIFF with the manifest's aspect ratio.
//!
//! # Stages
//! 1. Manifest scan and dimension extraction
//! 2. Panel type classification
//! 3. Image resolution
//! 4. Compositing into the SVG template
//! 5. Rasterizing and TIFF encoding
//! 6. Aspect correction

pub mod archive;
pub mod catalog;
pub mod classify;
pub mod compose;
pub mod config;
pub mod correct;
pub mod hashing;
pub mod manifest;
pub mod pipeline;
pub mod render;
pub mod resolve;
pub mod workspace;

pub use archive::{find_manifest, validate_order_id, ArchiveAssets, ArchiveProvider, DirectoryArchiveProvider};
pub use catalog::{PanelCatalog, PanelCatalogEntry, Wattage};
pub use classify::{Candidate, ClassificationResult};
pub use config::PipelineConfig;
pub use correct::{correct_aspect, CorrectionOutcome, DEFAULT_ASPECT_TOLERANCE};
pub use manifest::PrintAreaSpec;
pub use pipeline::{
    ConfirmationRequest, PipelineError, PipelineResult, PrintPipeline, ProcessRequest, RunOutcome, RunReport,
};
pub use resolve::{Resolution, ResolvedImage};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
