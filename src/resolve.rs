//! Image Resolution - Which Raster Goes Into the Template

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::archive::RasterCandidate;
use crate::manifest::find_image_name;
use crate::pipeline::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// File name equals the manifest's `imageName`.
    ExactName,
    /// File stem equals the `imageName` stem.
    StemName,
    /// No usable `imageName`: the largest raster was taken.
    LargestFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImage {
    pub path: PathBuf,
    pub resolution: Resolution,
    pub image_name: Option<String>,
}

fn stem_of(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Look up a raster by the name the manifest references.
pub fn match_by_name(image_name: &str, rasters: &[RasterCandidate]) -> Option<(PathBuf, Resolution)> {
    // image names occasionally carry a directory part
    let base = Path::new(image_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(image_name);

    if let Some(hit) = rasters.iter().find(|r| r.file_name() == base) {
        return Some((hit.path.clone(), Resolution::ExactName));
    }

    let wanted = stem_of(base);
    rasters
        .iter()
        .find(|r| r.path.file_stem().and_then(|s| s.to_str()) == Some(wanted))
        .map(|hit| (hit.path.clone(), Resolution::StemName))
}

/// Largest raster by byte size; the first one wins on equal sizes.
pub fn largest(rasters: &[RasterCandidate]) -> Option<&RasterCandidate> {
    rasters
        .iter()
        .fold(None, |best: Option<&RasterCandidate>, r| match best {
            Some(b) if b.size >= r.size => Some(b),
            _ => Some(r),
        })
}

pub fn resolve_image(
    manifest: &Value,
    rasters: &[RasterCandidate],
    archive_dir: &Path,
    max_depth: usize,
) -> PipelineResult<ResolvedImage> {
    if rasters.is_empty() {
        return Err(PipelineError::NoRasterAsset { dir: archive_dir.to_path_buf() });
    }

    let image_name = find_image_name(manifest, max_depth)?;

    if let Some(name) = image_name.as_deref() {
        match match_by_name(name, rasters) {
            Some((path, resolution)) => {
                info!(image = %path.display(), ?resolution, "Resolved manifest image");
                return Ok(ResolvedImage {
                    path,
                    resolution,
                    image_name,
                });
            }
            None => debug!(image_name = name, "Manifest image not in archive, using largest raster"),
        }
    }

    let fallback = largest(rasters).ok_or_else(|| PipelineError::NoRasterAsset { dir: archive_dir.to_path_buf() })?;
    info!(image = %fallback.path.display(), size = fallback.size, "Resolved largest raster");
    Ok(ResolvedImage {
        path: fallback.path.clone(),
        resolution: Resolution::LargestFile,
        image_name,
    })
}
