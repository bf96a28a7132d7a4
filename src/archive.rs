//! Archive Access - Order Directories and Their Assets
//!
//! Downloading and extracting archives happens elsewhere. Here an archive is
//! a directory that belongs to exactly one order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::pipeline::{PipelineError, PipelineResult};

const MANIFEST_EXTENSIONS: &[&str] = &["json"];
const VECTOR_EXTENSIONS: &[&str] = &["svg"];
const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Yields the extracted archive directory for an order.
pub trait ArchiveProvider {
    fn fetch(&self, order_id: &str) -> PipelineResult<PathBuf>;
}

/// Archives already extracted under `<root>/<order_id>`.
#[derive(Debug, Clone)]
pub struct DirectoryArchiveProvider {
    root: PathBuf,
}

impl DirectoryArchiveProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Order ids name directories and output files, so they are restricted to
/// ASCII letters, digits, `-` and `_`.
pub fn validate_order_id(order_id: &str) -> PipelineResult<()> {
    let valid = !order_id.is_empty()
        && order_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Archive(format!("Invalid order identifier: '{order_id}'")))
    }
}

impl ArchiveProvider for DirectoryArchiveProvider {
    fn fetch(&self, order_id: &str) -> PipelineResult<PathBuf> {
        validate_order_id(order_id)?;

        let dir = self.root.join(order_id);
        if !dir.is_dir() {
            return Err(PipelineError::Archive(format!(
                "No archive directory for order {order_id} at {}",
                dir.display()
            )));
        }
        Ok(dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetKind {
    Manifest,
    Vector,
    Raster,
}

fn asset_kind(path: &Path) -> Option<AssetKind> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    if MANIFEST_EXTENSIONS.contains(&ext.as_str()) {
        Some(AssetKind::Manifest)
    } else if VECTOR_EXTENSIONS.contains(&ext.as_str()) {
        Some(AssetKind::Vector)
    } else if RASTER_EXTENSIONS.contains(&ext.as_str()) {
        Some(AssetKind::Raster)
    } else {
        None
    }
}

/// Sorted list of regular files below `dir`.
fn list_files(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::Archive(format!("Archive directory not found: {}", dir.display())));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PipelineError::Archive(format!("{}: {e}", dir.display())))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// First manifest file in the archive.
pub fn find_manifest(dir: &Path) -> PipelineResult<PathBuf> {
    list_files(dir)?
        .into_iter()
        .find(|p| asset_kind(p) == Some(AssetKind::Manifest))
        .ok_or_else(|| PipelineError::ManifestNotFound { dir: dir.to_path_buf() })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterCandidate {
    pub path: PathBuf,
    pub size: u64,
}

impl RasterCandidate {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Files discovered in one archive directory.
#[derive(Debug, Clone)]
pub struct ArchiveAssets {
    pub dir: PathBuf,
    pub manifest: PathBuf,
    pub vector_template: PathBuf,
    pub rasters: Vec<RasterCandidate>,
}

impl ArchiveAssets {
    pub fn discover(dir: &Path) -> PipelineResult<Self> {
        Self::discover_excluding(dir, |_| false)
    }

    /// Like `discover`, ignoring vector and raster files for which `exclude`
    /// holds. The pipeline excludes its own output when it writes into the archive.
    pub fn discover_excluding(dir: &Path, exclude: impl Fn(&Path) -> bool) -> PipelineResult<Self> {
        let manifest = find_manifest(dir)?;

        let mut vectors = Vec::new();
        let mut rasters = Vec::new();
        for path in list_files(dir)? {
            let kind = match asset_kind(&path) {
                Some(AssetKind::Manifest) | None => continue,
                Some(kind) => kind,
            };
            if exclude(&path) {
                debug!(path = %path.display(), "Skipping pipeline output");
                continue;
            }
            if kind == AssetKind::Vector {
                vectors.push(path);
            } else {
                let size = std::fs::metadata(&path)
                    .map_err(|e| PipelineError::io(&path, e))?
                    .len();
                rasters.push(RasterCandidate { path, size });
            }
        }

        if vectors.len() > 1 {
            warn!(count = vectors.len(), using = %vectors[0].display(), "Several vector templates in archive");
        }
        let vector_template = vectors
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::VectorTemplateNotFound { dir: dir.to_path_buf() })?;

        debug!(
            manifest = %manifest.display(),
            template = %vector_template.display(),
            rasters = rasters.len(),
            "Archive assets discovered"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            vector_template,
            rasters,
        })
    }
}
