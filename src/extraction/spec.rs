//! Extraction spec model
//!
//! A project's spec bundle holds spider definitions, item schemas and
//! extractor rules. Each spider lists templates; a template says which item
//! type it scrapes and where each field lives on the page.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to extract items for one project
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExtractionSpec {
    #[serde(default)]
    pub spiders: BTreeMap<String, SpiderDefinition>,
    #[serde(default)]
    pub items: BTreeMap<String, ItemSchema>,
    #[serde(default)]
    pub extractors: BTreeMap<String, ExtractorRule>,
}

/// One spider: the templates tried against a page, in order
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SpiderDefinition {
    #[serde(default)]
    pub start_urls: Vec<String>,
    #[serde(default)]
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Template {
    /// Item type produced by this template
    pub scrapes: String,

    /// Regex the page URL must match for the template to apply
    #[serde(default)]
    pub url_pattern: Option<String>,

    /// CSS selector; one item is produced per matching element
    #[serde(default)]
    pub container: Option<String>,

    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Maps a CSS selector onto an item field
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Annotation {
    pub field: String,
    pub selector: String,

    /// Take this attribute instead of the element text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Extractor rule ids applied to each value, in order
    #[serde(default)]
    pub extractors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ItemSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FieldSchema {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

/// How raw values of a field are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Element text, whitespace collapsed
    #[default]
    Text,
    /// Resolved against the page URL
    Url,
    /// First number in the value
    Number,
    /// First number in the value, thousands separators removed
    Price,
    /// Inner HTML of the element
    RawHtml,
}

/// A reusable value transformation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorRule {
    /// Keeps the first capture group (or the whole match); drops non-matching values
    RegularExpression(String),
    /// Overrides the field type
    TypeExtractor(FieldType),
}
