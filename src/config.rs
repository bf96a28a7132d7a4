//! Pipeline Configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::correct::DEFAULT_ASPECT_TOLERANCE;
use crate::pipeline::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_aspect_tolerance")]
    pub aspect_tolerance: f64,
    #[serde(default = "default_max_manifest_depth")]
    pub max_manifest_depth: usize,
    /// Label of the manifest text area that carries the seller's note.
    #[serde(default = "default_seller_note_label")]
    pub seller_note_label: String,
}

fn default_catalog_path() -> PathBuf { PathBuf::from("panel_catalog.json") }
fn default_aspect_tolerance() -> f64 { DEFAULT_ASPECT_TOLERANCE }
fn default_max_manifest_depth() -> usize { 64 }
fn default_seller_note_label() -> String { "Seller Note".to_string() }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            aspect_tolerance: default_aspect_tolerance(),
            max_manifest_depth: default_max_manifest_depth(),
            seller_note_label: default_seller_note_label(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.aspect_tolerance >= 0.0) {
            return Err(PipelineError::Config(format!(
                "aspectTolerance must be >= 0, got {}",
                self.aspect_tolerance
            )));
        }
        if self.max_manifest_depth == 0 {
            return Err(PipelineError::Config("maxManifestDepth must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"aspectTolerance": 0.005}"#).unwrap();
        assert_eq!(config.aspect_tolerance, 0.005);
        assert_eq!(config.max_manifest_depth, 64);
        assert_eq!(config.catalog_path, PathBuf::from("panel_catalog.json"));
        assert_eq!(config.seller_note_label, "Seller Note");
    }

    #[test]
    fn test_load_rejects_negative_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"aspectTolerance": -1}"#).unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = PipelineConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.json"));
    }
}
