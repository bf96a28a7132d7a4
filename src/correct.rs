//! Aspect Correction - Bring the Artifact to the Declared Ratio
//!
//! The pre-correction file is always backed up before it is overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::{PipelineError, PipelineResult};
use crate::render::encode_tiff;

pub const DEFAULT_ASPECT_TOLERANCE: f64 = 0.01;
pub const BACKUP_SUFFIX: &str = "_original";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CorrectionOutcome {
    /// Ratio already within tolerance.
    Unchanged { ratio: f64 },
    Corrected {
        from: [u32; 2],
        to: [u32; 2],
        ratio: f64,
        backup: PathBuf,
        /// False when the corrected ratio is still outside tolerance.
        within_tolerance: bool,
    },
}

impl CorrectionOutcome {
    pub fn backup(&self) -> Option<&Path> {
        match self {
            CorrectionOutcome::Corrected { backup, .. } => Some(backup),
            CorrectionOutcome::Unchanged { .. } => None,
        }
    }

    /// The same outcome with the backup recorded at `path`, once it has been moved there.
    pub fn with_backup_at(self, path: &Path) -> Self {
        match self {
            CorrectionOutcome::Corrected { from, to, ratio, within_tolerance, .. } => CorrectionOutcome::Corrected {
                from,
                to,
                ratio,
                backup: path.to_path_buf(),
                within_tolerance,
            },
            unchanged => unchanged,
        }
    }

    pub fn has_residual_deviation(&self) -> bool {
        matches!(self, CorrectionOutcome::Corrected { within_tolerance: false, .. })
    }
}

/// `<stem>_original.<ext>` next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{BACKUP_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{BACKUP_SUFFIX}"),
    };
    path.with_file_name(name)
}

/// Target dimensions for `current` at `target_ratio`, keeping one side fixed.
pub fn corrected_size(current: [u32; 2], target_ratio: f64) -> [u32; 2] {
    let [width, height] = current;
    let current_ratio = f64::from(width) / f64::from(height);
    if current_ratio > target_ratio {
        let new_width = (f64::from(height) * target_ratio).round().max(1.0) as u32;
        [new_width, height]
    } else {
        let new_height = (f64::from(width) / target_ratio).round().max(1.0) as u32;
        [width, new_height]
    }
}

fn read_size(path: &Path) -> PipelineResult<[u32; 2]> {
    let (w, h) = image::image_dimensions(path).map_err(|e| PipelineError::EncodingFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if w == 0 || h == 0 {
        return Err(PipelineError::EmptyRender { path: path.to_path_buf() });
    }
    Ok([w, h])
}

fn ratio_of([w, h]: [u32; 2]) -> f64 {
    f64::from(w) / f64::from(h)
}

/// Check `artifact` against `target_ratio`, resampling it in place when off.
pub fn correct_aspect(artifact: &Path, target_ratio: f64, tolerance: f64) -> PipelineResult<CorrectionOutcome> {
    let current = read_size(artifact)?;
    let current_ratio = ratio_of(current);

    if (current_ratio - target_ratio).abs() <= tolerance {
        info!(ratio = current_ratio, target = target_ratio, "Aspect ratio within tolerance");
        return Ok(CorrectionOutcome::Unchanged { ratio: current_ratio });
    }

    let target = corrected_size(current, target_ratio);
    let backup = backup_path(artifact);
    fs::copy(artifact, &backup).map_err(|source| PipelineError::CorrectionBackupFailed {
        path: backup.clone(),
        source,
    })?;

    let source = image::open(artifact)
        .map_err(|e| PipelineError::EncodingFailed {
            path: artifact.to_path_buf(),
            message: e.to_string(),
        })?
        .to_rgb8();
    let resized = imageops::resize(&source, target[0], target[1], FilterType::Lanczos3);
    encode_tiff(artifact, &resized)?;

    let verified = read_size(artifact)?;
    let ratio = ratio_of(verified);
    let within_tolerance = (ratio - target_ratio).abs() <= tolerance;
    if within_tolerance {
        info!(from = ?current, to = ?verified, ratio, backup = %backup.display(), "Aspect ratio corrected");
    } else {
        warn!(
            from = ?current,
            to = ?verified,
            ratio,
            target = target_ratio,
            tolerance,
            "Aspect ratio still outside tolerance after correction"
        );
    }

    Ok(CorrectionOutcome::Corrected {
        from: current,
        to: verified,
        ratio,
        backup,
        within_tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_tiff(dir: &Path, w: u32, h: u32) -> PathBuf {
        let path = dir.join("order.tiff");
        encode_tiff(&path, &RgbImage::from_pixel(w, h, Rgb([90, 120, 150]))).unwrap();
        path
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(backup_path(Path::new("/out/123.tiff")), PathBuf::from("/out/123_original.tiff"));
        assert_eq!(backup_path(Path::new("/out/123_pos2.tiff")), PathBuf::from("/out/123_pos2_original.tiff"));
    }

    #[test]
    fn test_corrected_size() {
        // too wide: height fixed
        assert_eq!(corrected_size([400, 200], 1.8), [360, 200]);
        // too tall: width fixed
        assert_eq!(corrected_size([300, 300], 1.5), [300, 200]);
    }

    #[test]
    fn test_within_tolerance_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tiff(dir.path(), 180, 100);
        let before = fs::read(&path).unwrap();

        let outcome = correct_aspect(&path, 1.8, DEFAULT_ASPECT_TOLERANCE).unwrap();
        assert!(matches!(outcome, CorrectionOutcome::Unchanged { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_corrects_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tiff(dir.path(), 400, 200);
        let before = fs::read(&path).unwrap();

        let outcome = correct_aspect(&path, 1.8, DEFAULT_ASPECT_TOLERANCE).unwrap();
        let CorrectionOutcome::Corrected { from, to, backup, within_tolerance, .. } = outcome else {
            panic!("expected correction");
        };
        assert_eq!(from, [400, 200]);
        assert_eq!(to, [360, 200]);
        assert!(within_tolerance);
        assert_eq!(fs::read(&backup).unwrap(), before);
        assert_eq!(image::image_dimensions(&path).unwrap(), (360, 200));
    }

    #[test]
    fn test_correction_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tiff(dir.path(), 250, 400);

        let first = correct_aspect(&path, 1.316, DEFAULT_ASPECT_TOLERANCE).unwrap();
        assert!(matches!(first, CorrectionOutcome::Corrected { .. }));
        let dims = image::image_dimensions(&path).unwrap();

        let second = correct_aspect(&path, 1.316, DEFAULT_ASPECT_TOLERANCE).unwrap();
        assert!(matches!(second, CorrectionOutcome::Unchanged { .. }));
        assert_eq!(image::image_dimensions(&path).unwrap(), dims);
    }

    #[test]
    fn test_residual_deviation_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        // 3 px tall cannot hit 1.25 within 0.0001
        let path = write_tiff(dir.path(), 10, 3);
        let outcome = correct_aspect(&path, 1.25, 0.0001).unwrap();
        assert!(outcome.has_residual_deviation());
        assert!(outcome.backup().unwrap().exists());
    }

    #[test]
    fn test_backup_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tiff(dir.path(), 400, 200);
        // a directory where the backup file should go
        fs::create_dir(backup_path(&path)).unwrap();
        let before = fs::read(&path).unwrap();

        let err = correct_aspect(&path, 1.8, DEFAULT_ASPECT_TOLERANCE).unwrap_err();
        assert!(matches!(err, PipelineError::CorrectionBackupFailed { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_with_backup_at() {
        let moved = CorrectionOutcome::Corrected {
            from: [400, 200],
            to: [360, 200],
            ratio: 1.8,
            backup: PathBuf::from("/out/1_temp_original.tiff"),
            within_tolerance: true,
        }
        .with_backup_at(Path::new("/out/1_original.tiff"));
        assert_eq!(moved.backup(), Some(Path::new("/out/1_original.tiff")));

        let unchanged = CorrectionOutcome::Unchanged { ratio: 1.8 };
        assert_eq!(unchanged.clone().with_backup_at(Path::new("/x")), unchanged);
    }
}
