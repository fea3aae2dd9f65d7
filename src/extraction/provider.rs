//! Spec providers
//!
//! A `SpecProvider` loads the spec bundle for a project, or reports that the
//! project has none. Two implementations are provided:
//! - `FsSpecProvider` reads a project directory on every call
//! - `InMemorySpecProvider` serves bundles registered at runtime

use crate::extraction::spec::{ExtractionSpec, SpiderDefinition};
use crate::{SpecError, SpecResult};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Source of extraction spec bundles
pub trait SpecProvider: Send + Sync {
    /// Loads the bundle for `project`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(spec))` - The project exists
    /// * `Ok(None)` - No such project
    /// * `Err(SpecError)` - The project exists but could not be read
    fn load(&self, project: &str) -> SpecResult<Option<ExtractionSpec>>;
}

/// Reads projects from a directory tree
///
/// # Layout
///
/// ```text
/// <root>/<project>/items.json         item schemas (optional)
/// <root>/<project>/extractors.json    extractor rules (optional)
/// <root>/<project>/spiders/<id>.json  one spider definition per file
/// ```
#[derive(Debug, Clone)]
pub struct FsSpecProvider {
    root: PathBuf,
}

impl FsSpecProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the project directories under the root
    pub fn projects(&self) -> SpecResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| io_error(&self.root, e))?;

        let mut projects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.root, e))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    projects.push(name.to_string());
                }
            }
        }
        projects.sort();
        Ok(projects)
    }

    fn load_spiders(&self, dir: &Path) -> SpecResult<BTreeMap<String, SpiderDefinition>> {
        let mut spiders = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(spiders);
        }

        let entries = std::fs::read_dir(dir).map_err(|e| io_error(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let spider: SpiderDefinition = read_json(&path)?;
            spiders.insert(id.to_string(), spider);
        }

        Ok(spiders)
    }
}

impl SpecProvider for FsSpecProvider {
    fn load(&self, project: &str) -> SpecResult<Option<ExtractionSpec>> {
        if !is_valid_project_name(project) {
            return Ok(None);
        }

        let dir = self.root.join(project);
        if !dir.is_dir() {
            return Ok(None);
        }

        Ok(Some(ExtractionSpec {
            spiders: self.load_spiders(&dir.join("spiders"))?,
            items: read_optional_json(&dir.join("items.json"))?,
            extractors: read_optional_json(&dir.join("extractors.json"))?,
        }))
    }
}

/// Project names are single path components
fn is_valid_project_name(project: &str) -> bool {
    !project.is_empty()
        && project != "."
        && project != ".."
        && !project.contains(['/', '\\'])
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SpecResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&content).map_err(|source| SpecError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn read_optional_json<T: DeserializeOwned + Default>(path: &Path) -> SpecResult<T> {
    if path.is_file() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SpecError {
    SpecError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Spec bundles registered in memory
#[derive(Debug, Default)]
pub struct InMemorySpecProvider {
    projects: DashMap<String, ExtractionSpec>,
}

impl InMemorySpecProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the bundle for a project
    pub fn insert(&self, project: impl Into<String>, spec: ExtractionSpec) {
        self.projects.insert(project.into(), spec);
    }

    pub fn remove(&self, project: &str) -> Option<ExtractionSpec> {
        self.projects.remove(project).map(|(_, spec)| spec)
    }
}

impl SpecProvider for InMemorySpecProvider {
    fn load(&self, project: &str) -> SpecResult<Option<ExtractionSpec>> {
        Ok(self.projects.get(project).map(|spec| spec.value().clone()))
    }
}
