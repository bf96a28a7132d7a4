//! Manifest Reading - Print Geometry From Untyped JSON
//!
//! The order manifest has no schema we can rely on. Two shapes are probed:
//! `customizationData` (nested `children` ending in typed leaves) and
//! `customizationInfo.version3.0.surfaces[].areas[]`.
//! Every walk is depth-bounded; a manifest nested deeper than the limit is rejected.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::pipeline::{PipelineError, PipelineResult};

pub const CUSTOMIZATION_DATA: &str = "customizationData";
pub const CUSTOMIZATION_INFO: &str = "customizationInfo";
pub const INFO_VERSION: &str = "version3.0";

const PLACEMENT_CONTAINER: &str = "PlacementContainerCustomization";
const IMAGE_CUSTOMIZATION: &str = "ImageCustomization";
const IMAGE_PRINTING: &str = "ImagePrinting";
const TEXT_PRINTING: &str = "TextPrinting";

/// Declared print area. Immutable once extracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrintAreaSpec {
    pub width: f64,
    pub height: f64,
    pub ratio: f64,
}

impl PrintAreaSpec {
    pub fn new(width: f64, height: f64) -> PipelineResult<Self> {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            ratio: width / height,
        })
    }
}

/// Where the dimensions were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionSource {
    PlacementContainer,
    ImagePrintingArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub spec: PrintAreaSpec,
    pub source: DimensionSource,
    pub seller_note: Option<String>,
}

/// Parse the manifest file into an untyped document tree.
pub fn load_manifest(path: &Path) -> PipelineResult<Value> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| PipelineError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Extract dimensions and seller note in one go.
pub fn summarize(
    manifest: &Value,
    seller_note_label: &str,
    max_depth: usize,
) -> PipelineResult<ManifestSummary> {
    check_depth(manifest, max_depth)?;
    let (spec, source) = extract_dimensions(manifest, max_depth)?;
    let seller_note = extract_seller_note(manifest, seller_note_label);
    Ok(ManifestSummary {
        spec,
        source,
        seller_note,
    })
}

/// Reject documents nested deeper than `max_depth`.
pub fn check_depth(value: &Value, max_depth: usize) -> PipelineResult<()> {
    fn walk(value: &Value, depth: usize, max_depth: usize) -> bool {
        if depth > max_depth {
            return false;
        }
        match value {
            Value::Object(map) => map.values().all(|v| walk(v, depth + 1, max_depth)),
            Value::Array(items) => items.iter().all(|v| walk(v, depth + 1, max_depth)),
            _ => true,
        }
    }

    if walk(value, 0, max_depth) {
        Ok(())
    } else {
        Err(PipelineError::ManifestTooDeep { limit: max_depth })
    }
}

/// Find the print-area dimensions.
///
/// The placement container under `customizationData` wins; the first
/// `ImagePrinting` area under `customizationInfo` is the fallback.
pub fn extract_dimensions(
    manifest: &Value,
    max_depth: usize,
) -> PipelineResult<(PrintAreaSpec, DimensionSource)> {
    if let Some(data) = manifest.get(CUSTOMIZATION_DATA) {
        if let Some((w, h)) = find_placement_dimension(data, 0, max_depth)? {
            debug!(width = w, height = h, "Dimensions from placement container");
            return Ok((PrintAreaSpec::new(w, h)?, DimensionSource::PlacementContainer));
        }
    }

    for area in info_areas(manifest) {
        if area.get("customizationType").and_then(Value::as_str) != Some(IMAGE_PRINTING) {
            continue;
        }
        if let Some((w, h)) = area.get("Dimensions").and_then(numeric_size) {
            debug!(width = w, height = h, "Dimensions from image printing area");
            return Ok((PrintAreaSpec::new(w, h)?, DimensionSource::ImagePrintingArea));
        }
    }

    Err(PipelineError::DimensionsNotFound {
        looked_for: format!(
            "{CUSTOMIZATION_DATA}.children[..].dimension or \
             {CUSTOMIZATION_INFO}.{INFO_VERSION}.surfaces[].areas[].Dimensions"
        ),
    })
}

fn find_placement_dimension(
    node: &Value,
    depth: usize,
    max_depth: usize,
) -> PipelineResult<Option<(f64, f64)>> {
    if depth > max_depth {
        return Err(PipelineError::ManifestTooDeep { limit: max_depth });
    }

    if node.get("type").and_then(Value::as_str) == Some(PLACEMENT_CONTAINER) {
        if let Some(size) = node.get("dimension").and_then(numeric_size) {
            return Ok(Some(size));
        }
    }

    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            if let Some(size) = find_placement_dimension(child, depth + 1, max_depth)? {
                return Ok(Some(size));
            }
        }
    }

    Ok(None)
}

fn numeric_size(obj: &Value) -> Option<(f64, f64)> {
    let width = obj.get("width")?.as_f64()?;
    let height = obj.get("height")?.as_f64()?;
    Some((width, height))
}

/// All `surfaces[].areas[]` entries of the `customizationInfo` shape, in document order.
fn info_areas(manifest: &Value) -> impl Iterator<Item = &Value> {
    manifest
        .get(CUSTOMIZATION_INFO)
        .and_then(|info| info.get(INFO_VERSION))
        .and_then(|v| v.get("surfaces"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|surface| surface.get("areas").and_then(Value::as_array))
        .flatten()
}

/// Seller free-text note. The last non-empty match wins.
pub fn extract_seller_note(manifest: &Value, label: &str) -> Option<String> {
    info_areas(manifest)
        .filter(|area| {
            area.get("customizationType").and_then(Value::as_str) == Some(TEXT_PRINTING)
                && area.get("label").and_then(Value::as_str) == Some(label)
        })
        .filter_map(|area| area.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .last()
        .map(str::to_string)
}

/// Depth-first search for the `imageName` of the first `ImageCustomization` node.
pub fn find_image_name(manifest: &Value, max_depth: usize) -> PipelineResult<Option<String>> {
    fn visit(node: &Value, depth: usize, max_depth: usize) -> PipelineResult<Option<String>> {
        if depth > max_depth {
            return Err(PipelineError::ManifestTooDeep { limit: max_depth });
        }
        match node {
            Value::Object(map) => {
                if map.get("type").and_then(Value::as_str) == Some(IMAGE_CUSTOMIZATION) {
                    let name = map
                        .get("image")
                        .and_then(|img| img.get("imageName"))
                        .and_then(Value::as_str);
                    if let Some(name) = name {
                        return Ok(Some(name.to_string()));
                    }
                }
                for child in map.values() {
                    if let Some(found) = visit(child, depth + 1, max_depth)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            Value::Array(items) => {
                for child in items {
                    if let Some(found) = visit(child, depth + 1, max_depth)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    visit(manifest, 0, max_depth)
}
