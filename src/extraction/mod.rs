//! Extraction module
//!
//! Turns a fetched page into structured items when the caller's project has
//! a spec for the requested spider:
//! - `spec`: the declarative spec bundle model
//! - `provider`: where bundles come from
//! - `extractor`: compiles a spider and runs it against a page
//!
//! A missing project or spider is a normal outcome ("no spec"), never an error.

mod extractor;
mod provider;
mod spec;

pub use extractor::Extractor;
pub use provider::{FsSpecProvider, InMemorySpecProvider, SpecProvider};
pub use spec::{
    Annotation, ExtractionSpec, ExtractorRule, FieldSchema, FieldType, ItemSchema,
    SpiderDefinition, Template,
};

use crate::engine::FetchedDocument;
use crate::ExtractionResult;
use std::sync::Arc;
use tracing::debug;

/// One extracted record: field name to value, in extraction order
pub type Item = serde_json::Map<String, serde_json::Value>;

/// Binds spec bundles from a provider to individual requests
#[derive(Clone)]
pub struct ExtractorAdapter {
    provider: Arc<dyn SpecProvider>,
}

impl ExtractorAdapter {
    pub fn new(provider: Arc<dyn SpecProvider>) -> Self {
        Self { provider }
    }

    /// Builds the extractor for a project/spider pair
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Extractor))` - The spider exists in the project's spec
    /// * `Ok(None)` - Either identifier is absent or unknown
    /// * `Err(ExtractionError)` - The spec could not be loaded or compiled
    pub fn create_extractor(
        &self,
        project: Option<&str>,
        spider: Option<&str>,
    ) -> ExtractionResult<Option<Extractor>> {
        let (Some(project), Some(spider)) = (project, spider) else {
            debug!("not extracting, no project/spider given");
            return Ok(None);
        };

        let Some(spec) = self.provider.load(project)? else {
            debug!(project, "not extracting, missing spec for project");
            return Ok(None);
        };

        let Some(definition) = spec.spiders.get(spider) else {
            debug!(project, spider, "not extracting, missing spec for spider");
            return Ok(None);
        };

        Extractor::new(spider, definition, &spec.items, &spec.extractors).map(Some)
    }

    /// Extracts items from a document, or `None` when there is no spec
    pub fn build_and_extract(
        &self,
        project: Option<&str>,
        spider: Option<&str>,
        document: &FetchedDocument,
    ) -> ExtractionResult<Option<Vec<Item>>> {
        let Some(extractor) = self.create_extractor(project, spider)? else {
            return Ok(None);
        };

        let items = extractor.extract(&document.url, &document.body);
        debug!(
            spider = extractor.spider_id(),
            url = %document.url,
            count = items.len(),
            "extracted items"
        );
        Ok(Some(items))
    }
}
