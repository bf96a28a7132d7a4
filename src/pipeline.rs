//! Print Pipeline - Single Entry Point Per Archive
//!
//! Scanner -> extractor -> classifier -> resolver -> compositor -> renderer -> corrector.
//! An unmatched panel type stops the run before anything is written; the
//! caller decides whether to re-run with `accept_unmatched`.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::archive::{validate_order_id, ArchiveAssets, ArchiveProvider};
use crate::catalog::PanelCatalog;
use crate::classify::{classify, Candidate, ClassificationResult};
use crate::compose::{embed_image, EmbedSummary};
use crate::config::PipelineConfig;
use crate::correct::{correct_aspect, CorrectionOutcome};
use crate::hashing::{compute_report_hash, file_sha256};
use crate::manifest::{load_manifest, summarize, PrintAreaSpec};
use crate::render::{render_to_tiff, RenderSummary};
use crate::resolve::{resolve_image, ResolvedImage};
use crate::workspace::{artifact_stem, is_run_file, WorkingSet};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Manifest not found in archive {}", .dir.display())]
    ManifestNotFound { dir: PathBuf },

    #[error("Manifest {} is not valid JSON: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Manifest nesting exceeds {limit} levels")]
    ManifestTooDeep { limit: usize },

    #[error("Print dimensions not found in manifest (looked for {looked_for})")]
    DimensionsNotFound { looked_for: String },

    #[error("Invalid dimensions: width {width}, height {height} (both must be positive)")]
    InvalidDimensions { width: f64, height: f64 },

    #[error("Vector template not found in archive {}", .dir.display())]
    VectorTemplateNotFound { dir: PathBuf },

    #[error("No raster image in archive {}", .dir.display())]
    NoRasterAsset { dir: PathBuf },

    #[error("Raster {} is not a recognised image format", .path.display())]
    UnsupportedRaster { path: PathBuf },

    #[error("No image slot in vector template {}", .path.display())]
    NoImageSlot { path: PathBuf },

    #[error("Vector document {}: {message}", .path.display())]
    VectorParse { path: PathBuf, message: String },

    #[error("Render of {} is fully transparent", .path.display())]
    EmptyRender { path: PathBuf },

    #[error("Encoding {} failed: {message}", .path.display())]
    EncodingFailed { path: PathBuf, message: String },

    #[error("Backup {} could not be written, correction aborted: {source}", .path.display())]
    CorrectionBackupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Panel catalog {}: {message}", .path.display())]
    Catalog { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub order_id: String,
    #[serde(default)]
    pub position: Option<u32>,
    /// Defaults to the archive directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Proceed even when no panel type matches.
    #[serde(default)]
    pub accept_unmatched: bool,
    /// Overrides the configured aspect tolerance.
    #[serde(default)]
    pub aspect_tolerance: Option<f64>,
}

impl ProcessRequest {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            position: None,
            output_dir: None,
            accept_unmatched: false,
            aspect_tolerance: None,
        }
    }
}

/// Returned instead of an artifact when the panel type is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub order_id: String,
    pub position: Option<u32>,
    pub spec: PrintAreaSpec,
    pub seller_note: Option<String>,
    pub recommendations: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub order_id: String,
    pub position: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub spec: PrintAreaSpec,
    pub classification: ClassificationResult,
    pub seller_note: Option<String>,
    pub image: ResolvedImage,
    pub embed: EmbedSummary,
    pub render: RenderSummary,
    pub correction: CorrectionOutcome,
    pub artifact: PathBuf,
    pub artifact_sha256: String,
    pub report_hash: String,
}

/// Everything a report says about the run's result; run id and timestamp are left out.
#[derive(Serialize)]
struct ReportContent<'a> {
    order_id: &'a str,
    position: Option<u32>,
    engine_version: &'a str,
    spec: &'a PrintAreaSpec,
    classification: &'a ClassificationResult,
    seller_note: Option<&'a str>,
    image: &'a ResolvedImage,
    embed: &'a EmbedSummary,
    render: &'a RenderSummary,
    correction: &'a CorrectionOutcome,
    artifact: &'a Path,
    artifact_sha256: &'a str,
}

impl RunReport {
    /// Hash of the report's content. Two runs that produced the same artifact
    /// from the same inputs share it.
    pub fn content_hash(&self) -> PipelineResult<String> {
        let content = ReportContent {
            order_id: &self.order_id,
            position: self.position,
            engine_version: &self.engine_version,
            spec: &self.spec,
            classification: &self.classification,
            seller_note: self.seller_note.as_deref(),
            image: &self.image,
            embed: &self.embed,
            render: &self.render,
            correction: &self.correction,
            artifact: &self.artifact,
            artifact_sha256: &self.artifact_sha256,
        };
        Ok(compute_report_hash(&content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunReport),
    AwaitingConfirmation(ConfirmationRequest),
}

/// The print pipeline. Holds only read-only inputs, so one instance can
/// serve concurrent runs as long as each run has its own directories.
pub struct PrintPipeline {
    catalog: PanelCatalog,
    config: PipelineConfig,
}

impl PrintPipeline {
    pub fn new(catalog: PanelCatalog, config: PipelineConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &PanelCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify a declared print area without touching any files.
    pub fn classify(&self, spec: &PrintAreaSpec) -> ClassificationResult {
        classify(spec, &self.catalog)
    }

    /// Fetch the order's archive from `provider` and process it.
    pub fn process_order<P: ArchiveProvider + ?Sized>(
        &self,
        provider: &P,
        request: &ProcessRequest,
    ) -> PipelineResult<RunOutcome> {
        let dir = provider.fetch(&request.order_id)?;
        self.process_archive(&dir, request)
    }

    /// Process one extracted archive directory.
    pub fn process_archive(&self, archive_dir: &Path, request: &ProcessRequest) -> PipelineResult<RunOutcome> {
        let span = info_span!("process", order = %request.order_id, position = ?request.position);
        let _enter = span.enter();

        validate_order_id(&request.order_id)?;

        let tolerance = request.aspect_tolerance.unwrap_or(self.config.aspect_tolerance);
        if !(tolerance >= 0.0) {
            return Err(PipelineError::Config(format!("aspect tolerance must be >= 0, got {tolerance}")));
        }
        let max_depth = self.config.max_manifest_depth;

        let output_dir = request.output_dir.as_deref().unwrap_or(archive_dir);
        let assets = ArchiveAssets::discover_excluding(archive_dir, |path| {
            path.parent() == Some(output_dir)
                && path
                    .file_name()
                    .is_some_and(|name| is_run_file(&name.to_string_lossy(), &request.order_id))
        })?;
        let manifest = load_manifest(&assets.manifest)?;
        let summary = summarize(&manifest, &self.config.seller_note_label, max_depth)?;
        info!(
            width = summary.spec.width,
            height = summary.spec.height,
            ratio = summary.spec.ratio,
            source = ?summary.source,
            "Print area extracted"
        );

        let classification = self.classify(&summary.spec);
        if let ClassificationResult::Unmatched { recommendations } = &classification {
            if !request.accept_unmatched {
                info!(ratio = summary.spec.ratio, "Awaiting confirmation for unmatched panel type");
                return Ok(RunOutcome::AwaitingConfirmation(ConfirmationRequest {
                    order_id: request.order_id.clone(),
                    position: request.position,
                    spec: summary.spec,
                    seller_note: summary.seller_note,
                    recommendations: recommendations.clone(),
                }));
            }
            warn!(ratio = summary.spec.ratio, "Proceeding with unmatched panel type");
        }

        let image = resolve_image(&manifest, &assets.rasters, archive_dir, max_depth)?;

        std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;
        let work = WorkingSet::new(output_dir, &artifact_stem(&request.order_id, request.position));

        let embed = embed_image(&assets.vector_template, &image.path, &work.modified_vector)?;
        let render = render_to_tiff(
            &work.modified_vector,
            assets.vector_template.parent(),
            &work.intermediate_raster,
            &work.staged_artifact,
        )?;
        let correction =
            correct_aspect(&work.staged_artifact, summary.spec.ratio, tolerance)?.with_backup_at(&work.backup);
        let artifact_sha256 =
            file_sha256(&work.staged_artifact).map_err(|e| PipelineError::io(&work.staged_artifact, e))?;

        let mut report = RunReport {
            run_id: Uuid::new_v4().to_string(),
            order_id: request.order_id.clone(),
            position: request.position,
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            spec: summary.spec,
            classification,
            seller_note: summary.seller_note,
            image,
            embed,
            render,
            correction,
            artifact: work.artifact.clone(),
            artifact_sha256,
            report_hash: String::new(), // Computed after
        };
        report.report_hash = report.content_hash()?;

        work.commit()?;
        info!(artifact = %report.artifact.display(), run_id = %report.run_id, "Print artifact ready");
        Ok(RunOutcome::Completed(report))
    }
}

impl Default for PrintPipeline {
    fn default() -> Self {
        Self::new(PanelCatalog::builtin(), PipelineConfig::default())
    }
}
