//! Run Working Set - Output and Transient Paths of One Run
//!
//! A run renders and corrects into staged files next to the final ones.
//! `commit` moves them into place; until then an artifact from an earlier run
//! stays as it was. Whatever is still staged is removed on drop.

use std::fs;
use std::path::{Path, PathBuf};

use crate::correct::backup_path;
use crate::pipeline::{PipelineError, PipelineResult};
use crate::render::remove_transient;

pub const MODIFIED_SUFFIX: &str = "_modified";
pub const TEMP_SUFFIX: &str = "_temp";

/// Name endings of every file a run writes, after the artifact stem.
const RUN_FILE_ENDINGS: &[&str] = &[
    ".tiff",
    "_original.tiff",
    "_modified.svg",
    "_temp.png",
    "_temp.tiff",
    "_temp_original.tiff",
];

/// `<order>` or `<order>_pos<N>`.
pub fn artifact_stem(order_id: &str, position: Option<u32>) -> String {
    match position {
        Some(n) => format!("{order_id}_pos{n}"),
        None => order_id.to_string(),
    }
}

/// Whether `file_name` is one the pipeline writes for `order_id`, at any position.
pub fn is_run_file(file_name: &str, order_id: &str) -> bool {
    let Some(mut rest) = file_name.strip_prefix(order_id) else {
        return false;
    };
    if let Some(after) = rest.strip_prefix("_pos") {
        let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return false;
        }
        rest = &after[digits..];
    }
    RUN_FILE_ENDINGS.contains(&rest)
}

#[derive(Debug)]
pub struct WorkingSet {
    pub modified_vector: PathBuf,
    pub intermediate_raster: PathBuf,
    /// Rendered and corrected here, moved to `artifact` on commit.
    pub staged_artifact: PathBuf,
    /// Where the corrector backs up `staged_artifact`.
    pub staged_backup: PathBuf,
    pub artifact: PathBuf,
    pub backup: PathBuf,
}

impl WorkingSet {
    pub fn new(output_dir: &Path, stem: &str) -> Self {
        let artifact = output_dir.join(format!("{stem}.tiff"));
        let staged_artifact = output_dir.join(format!("{stem}{TEMP_SUFFIX}.tiff"));
        Self {
            modified_vector: output_dir.join(format!("{stem}{MODIFIED_SUFFIX}.svg")),
            intermediate_raster: output_dir.join(format!("{stem}{TEMP_SUFFIX}.png")),
            staged_backup: backup_path(&staged_artifact),
            staged_artifact,
            backup: backup_path(&artifact),
            artifact,
        }
    }

    /// Move the staged artifact into place.
    ///
    /// A staged backup replaces the old one. Without one, an old backup
    /// belongs to the replaced artifact and is removed.
    pub fn commit(self) -> PipelineResult<()> {
        fs::rename(&self.staged_artifact, &self.artifact).map_err(|e| PipelineError::io(&self.artifact, e))?;
        if self.staged_backup.exists() {
            fs::rename(&self.staged_backup, &self.backup).map_err(|e| PipelineError::io(&self.backup, e))?;
        } else {
            remove_transient(&self.backup);
        }
        Ok(())
    }
}

impl Drop for WorkingSet {
    fn drop(&mut self) {
        remove_transient(&self.modified_vector);
        remove_transient(&self.intermediate_raster);
        remove_transient(&self.staged_artifact);
        remove_transient(&self.staged_backup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_stem() {
        assert_eq!(artifact_stem("302-1234567-7654321", None), "302-1234567-7654321");
        assert_eq!(artifact_stem("302-1234567-7654321", Some(2)), "302-1234567-7654321_pos2");
    }

    #[test]
    fn test_paths() {
        let set = WorkingSet::new(Path::new("/out"), "42_pos1");
        assert_eq!(set.artifact, PathBuf::from("/out/42_pos1.tiff"));
        assert_eq!(set.backup, PathBuf::from("/out/42_pos1_original.tiff"));
        assert_eq!(set.staged_artifact, PathBuf::from("/out/42_pos1_temp.tiff"));
        assert_eq!(set.staged_backup, PathBuf::from("/out/42_pos1_temp_original.tiff"));
        assert_eq!(set.modified_vector, PathBuf::from("/out/42_pos1_modified.svg"));
        assert_eq!(set.intermediate_raster, PathBuf::from("/out/42_pos1_temp.png"));
    }

    #[test]
    fn test_is_run_file() {
        assert!(is_run_file("42_modified.svg", "42"));
        assert!(is_run_file("42_pos3_temp.png", "42"));
        assert!(is_run_file("42_pos12_original.tiff", "42"));
        assert!(!is_run_file("42_pos_temp.png", "42"));
        assert!(!is_run_file("photo_temp.png", "42"));
        assert!(!is_run_file("42_photo.png", "42"));
        assert!(!is_run_file("420_modified.svg", "42"));
    }

    fn touch_all(set: &WorkingSet) {
        for path in [
            &set.modified_vector,
            &set.intermediate_raster,
            &set.staged_artifact,
            &set.staged_backup,
        ] {
            fs::write(path, b"new").unwrap();
        }
    }

    #[test]
    fn test_drop_without_commit_keeps_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path(), "42");
        fs::write(&set.artifact, b"old").unwrap();
        fs::write(&set.backup, b"old backup").unwrap();
        touch_all(&set);
        drop(set);

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["42.tiff", "42_original.tiff"]);
        assert_eq!(fs::read(dir.path().join("42.tiff")).unwrap(), b"old");
    }

    #[test]
    fn test_commit_moves_staged_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path(), "42");
        fs::write(&set.artifact, b"old").unwrap();
        touch_all(&set);
        let (artifact, backup) = (set.artifact.clone(), set.backup.clone());
        set.commit().unwrap();

        assert_eq!(fs::read(&artifact).unwrap(), b"new");
        assert_eq!(fs::read(&backup).unwrap(), b"new");
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_commit_drops_stale_backup() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path(), "42");
        fs::write(&set.backup, b"from an earlier run").unwrap();
        fs::write(&set.staged_artifact, b"new").unwrap();
        let backup = set.backup.clone();
        set.commit().unwrap();
        assert!(!backup.exists());
    }
}
