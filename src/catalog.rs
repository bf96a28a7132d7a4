//! Panel Catalog - Known Physical Panel Sizes
//!
//! Stored as a JSON object `name -> {width, height, tolerance, watt, description}`.
//! Entry order is the file order and decides classification ties.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::pipeline::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Wattage {
    Watts(f64),
    Label(String),
}

impl std::fmt::Display for Wattage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Wattage::Watts(w) => write!(f, "{w} W"),
            Wattage::Label(s) => f.write_str(s),
        }
    }
}

/// On-disk shape of one catalog entry (the name is the map key).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PanelRecord {
    width: f64,
    height: f64,
    #[serde(default = "default_tolerance")]
    tolerance: f64,
    #[serde(default = "default_watt")]
    watt: Wattage,
    #[serde(default)]
    description: String,
}

fn default_tolerance() -> f64 { 0.02 }
fn default_watt() -> Wattage { Wattage::Label(String::new()) }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelCatalogEntry {
    pub name: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub tolerance: f64,
    pub wattage: Wattage,
    pub description: String,
}

impl PanelCatalogEntry {
    pub fn new(name: &str, width_mm: f64, height_mm: f64, tolerance: f64, watts: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            width_mm,
            height_mm,
            tolerance,
            wattage: Wattage::Watts(watts),
            description: description.to_string(),
        }
    }

    pub fn target_ratio(&self) -> f64 {
        self.width_mm / self.height_mm
    }
}

/// Catalog of panel types, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelCatalog {
    entries: Vec<PanelCatalogEntry>,
}

impl PanelCatalog {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Built-in catalog used when the configured file is missing or invalid.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(PanelCatalogEntry::new("compact-200", 500.0, 380.0, 0.02, 200.0, "Compact panel 500 x 380 mm"));
        catalog.register(PanelCatalogEntry::new("standard-300", 600.0, 500.0, 0.02, 300.0, "Standard panel 600 x 500 mm"));
        catalog.register(PanelCatalogEntry::new("wide-450", 900.0, 600.0, 0.02, 450.0, "Wide panel 900 x 600 mm"));
        catalog.register(PanelCatalogEntry::new("panorama-600", 1200.0, 600.0, 0.02, 600.0, "Panorama panel 1200 x 600 mm"));
        catalog.register(PanelCatalogEntry::new("square-400", 700.0, 700.0, 0.02, 400.0, "Square panel 700 x 700 mm"));
        catalog
    }

    /// Parse catalog JSON, keeping entry order.
    pub fn from_json(content: &str) -> Result<Self, String> {
        let root: Map<String, Value> = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let mut catalog = Self::new();
        for (name, value) in root {
            let record: PanelRecord = serde_json::from_value(value)
                .map_err(|e| format!("entry '{name}': {e}"))?;
            if record.width <= 0.0 || record.height <= 0.0 {
                return Err(format!("entry '{name}': width and height must be positive"));
            }
            if record.tolerance < 0.0 {
                return Err(format!("entry '{name}': tolerance must not be negative"));
            }
            catalog.register(PanelCatalogEntry {
                name,
                width_mm: record.width,
                height_mm: record.height,
                tolerance: record.tolerance,
                wattage: record.watt,
                description: record.description,
            });
        }
        Ok(catalog)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut root = Map::new();
        for entry in &self.entries {
            let record = PanelRecord {
                width: entry.width_mm,
                height: entry.height_mm,
                tolerance: entry.tolerance,
                watt: entry.wattage.clone(),
                description: entry.description.clone(),
            };
            root.insert(entry.name.clone(), serde_json::to_value(record)?);
        }
        serde_json::to_string_pretty(&Value::Object(root))
    }

    /// Load the catalog file.
    ///
    /// A missing file is created with the built-in entries. An unreadable or
    /// invalid file is left untouched and the built-in entries are used.
    pub fn load_or_init(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            let catalog = Self::builtin();
            catalog.save(path)?;
            info!(path = %path.display(), "Created default panel catalog");
            return Ok(catalog);
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| Self::from_json(&content));

        match parsed {
            Ok(catalog) if !catalog.is_empty() => {
                info!(path = %path.display(), entries = catalog.len(), "Loaded panel catalog");
                Ok(catalog)
            }
            Ok(_) => {
                warn!(path = %path.display(), "Panel catalog is empty, using built-in entries");
                Ok(Self::builtin())
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "Panel catalog invalid, using built-in entries");
                Ok(Self::builtin())
            }
        }
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let failed = |message: String| PipelineError::Catalog {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| failed(format!("cannot create {}: {e}", parent.display())))?;
        }
        let content = self.to_json().map_err(|e| failed(e.to_string()))?;
        fs::write(path, content).map_err(|e| failed(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&PanelCatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PanelCatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry; a duplicate name replaces the old entry in place.
    pub fn register(&mut self, entry: PanelCatalogEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }
}

impl Default for PanelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_five_entries() {
        let catalog = PanelCatalog::builtin();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.iter().all(|e| e.target_ratio() > 0.0));
    }

    #[test]
    fn test_from_json_keeps_order_and_defaults() {
        let content = r#"{
            "zeta": {"width": 600, "height": 500, "tolerance": 0.01, "watt": 300, "description": "Z"},
            "alpha": {"width": 500, "height": 380, "watt": "200 W"}
        }"#;
        let catalog = PanelCatalog::from_json(content).unwrap();
        let names: Vec<_> = catalog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);

        let alpha = catalog.get("alpha").unwrap();
        assert_eq!(alpha.tolerance, 0.02);
        assert_eq!(alpha.wattage, Wattage::Label("200 W".into()));
        assert_eq!(alpha.description, "");
    }

    #[test]
    fn test_from_json_rejects_bad_entries() {
        assert!(PanelCatalog::from_json(r#"{"a": {"width": 0, "height": 10}}"#).is_err());
        assert!(PanelCatalog::from_json(r#"{"a": {"height": 10}}"#).is_err());
        assert!(PanelCatalog::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_load_or_init_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("panels.json");

        let catalog = PanelCatalog::load_or_init(&path).unwrap();
        assert_eq!(catalog, PanelCatalog::builtin());
        assert!(path.exists());

        let reloaded = PanelCatalog::load_or_init(&path).unwrap();
        assert_eq!(reloaded, catalog);
    }

    #[test]
    fn test_load_or_init_invalid_falls_back_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panels.json");
        fs::write(&path, "{ not json").unwrap();

        let catalog = PanelCatalog::load_or_init(&path).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut catalog = PanelCatalog::new();
        catalog.register(PanelCatalogEntry::new("a", 1.0, 1.0, 0.1, 1.0, ""));
        catalog.register(PanelCatalogEntry::new("b", 2.0, 1.0, 0.1, 1.0, ""));
        catalog.register(PanelCatalogEntry::new("a", 3.0, 1.0, 0.1, 1.0, ""));
        let names: Vec<_> = catalog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(catalog.get("a").unwrap().width_mm, 3.0);
    }

    #[test]
    fn test_save_failure_is_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "file").unwrap();
        let path = blocker.join("panels.json");

        let err = PanelCatalog::builtin().save(&path).unwrap_err();
        assert!(matches!(&err, PipelineError::Catalog { path: p, .. } if *p == path));
        assert!(PanelCatalog::load_or_init(&path).is_err());
    }
}
