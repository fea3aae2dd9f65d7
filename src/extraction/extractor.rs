//! Declarative item extractor
//!
//! An `Extractor` is a spider definition compiled against its project's item
//! schemas and extractor rules. Selectors and regular expressions are
//! compiled once in `Extractor::new`; `extract` then runs the templates
//! against a page.
//!
//! # Extraction Rules
//!
//! - Templates are tried in order; a template whose `url_pattern` does not
//!   match the page URL is skipped
//! - With a `container`, one item is produced per matching element and field
//!   selectors are scoped to it; otherwise one item per template
//! - Every field value is a list of strings in document order
//! - Items missing a required field, or with no fields at all, are dropped
//! - Items start with `_type` and `url`, followed by fields in annotation order

use crate::extraction::spec::{
    ExtractorRule, FieldType, ItemSchema, SpiderDefinition, Template,
};
use crate::extraction::Item;
use crate::{ExtractionError, ExtractionResult};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// A spider definition ready to run against pages
#[derive(Debug)]
pub struct Extractor {
    spider_id: String,
    templates: Vec<CompiledTemplate>,
    number: Regex,
    price: Regex,
}

#[derive(Debug)]
struct CompiledTemplate {
    item_type: String,
    url_pattern: Option<Regex>,
    container: Option<Selector>,
    fields: Vec<CompiledField>,
    required: Vec<String>,
}

#[derive(Debug)]
struct CompiledField {
    name: String,
    selector: Selector,
    attribute: Option<String>,
    field_type: FieldType,
    filters: Vec<Regex>,
}

impl Extractor {
    /// Compiles a spider definition
    ///
    /// # Errors
    ///
    /// * `UnknownItemType` - a template scrapes an item type with no schema
    /// * `UnknownExtractor` - an annotation names an undefined extractor rule
    /// * `InvalidSelector` / `InvalidRegex` - a selector or pattern does not compile
    pub fn new(
        spider_id: &str,
        spider: &SpiderDefinition,
        items: &BTreeMap<String, ItemSchema>,
        extractors: &BTreeMap<String, ExtractorRule>,
    ) -> ExtractionResult<Self> {
        let templates = spider
            .templates
            .iter()
            .map(|template| compile_template(template, items, extractors))
            .collect::<ExtractionResult<Vec<_>>>()?;

        Ok(Self {
            spider_id: spider_id.to_string(),
            templates,
            number: compile_regex(r"-?\d+(?:\.\d+)?")?,
            price: compile_regex(r"\d[\d,]*(?:\.\d+)?")?,
        })
    }

    pub fn spider_id(&self) -> &str {
        &self.spider_id
    }

    /// Runs every applicable template against the page
    pub fn extract(&self, page_url: &str, html: &str) -> Vec<Item> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let base = Url::parse(page_url).ok();

        let mut items = Vec::new();
        for template in &self.templates {
            if let Some(pattern) = &template.url_pattern {
                if !pattern.is_match(page_url) {
                    continue;
                }
            }

            match &template.container {
                Some(container) => {
                    for scope in root.select(container) {
                        if let Some(item) = self.extract_item(template, scope, page_url, base.as_ref()) {
                            items.push(item);
                        }
                    }
                }
                None => {
                    if let Some(item) = self.extract_item(template, root, page_url, base.as_ref()) {
                        items.push(item);
                    }
                }
            }
        }

        items
    }

    fn extract_item(
        &self,
        template: &CompiledTemplate,
        scope: ElementRef<'_>,
        page_url: &str,
        base: Option<&Url>,
    ) -> Option<Item> {
        let mut fields: Vec<(String, Vec<String>)> = Vec::new();

        for field in &template.fields {
            let values: Vec<String> = scope
                .select(&field.selector)
                .filter_map(|element| raw_value(element, field))
                .filter_map(|raw| self.convert(&raw, field.field_type, base))
                .filter_map(|value| apply_filters(value, &field.filters))
                .collect();

            if values.is_empty() {
                continue;
            }

            match fields.iter_mut().find(|(name, _)| name == &field.name) {
                Some((_, existing)) => existing.extend(values),
                None => fields.push((field.name.clone(), values)),
            }
        }

        if fields.is_empty() {
            return None;
        }

        let missing = template
            .required
            .iter()
            .find(|required| !fields.iter().any(|(name, _)| name == *required));
        if let Some(missing) = missing {
            tracing::trace!(
                spider = %self.spider_id,
                item_type = %template.item_type,
                field = %missing,
                "dropping item without required field"
            );
            return None;
        }

        let mut item = Item::new();
        item.insert("_type".to_string(), Value::String(template.item_type.clone()));
        item.insert("url".to_string(), Value::String(page_url.to_string()));
        for (name, values) in fields {
            item.insert(
                name,
                Value::Array(values.into_iter().map(Value::String).collect()),
            );
        }
        Some(item)
    }

    /// Interprets a raw value according to its field type
    fn convert(&self, raw: &str, field_type: FieldType, base: Option<&Url>) -> Option<String> {
        match field_type {
            FieldType::Text | FieldType::RawHtml => Some(raw.to_string()),
            FieldType::Url => match base {
                Some(base) => base.join(raw).ok().map(|url| url.to_string()),
                None => Some(raw.to_string()),
            },
            FieldType::Number => self.number.find(raw).map(|m| m.as_str().to_string()),
            FieldType::Price => self
                .price
                .find(raw)
                .map(|m| m.as_str().replace(',', "")),
        }
    }
}

fn compile_template(
    template: &Template,
    items: &BTreeMap<String, ItemSchema>,
    extractors: &BTreeMap<String, ExtractorRule>,
) -> ExtractionResult<CompiledTemplate> {
    let schema = items
        .get(&template.scrapes)
        .ok_or_else(|| ExtractionError::UnknownItemType(template.scrapes.clone()))?;

    let url_pattern = template
        .url_pattern
        .as_deref()
        .map(compile_regex)
        .transpose()?;

    let container = template
        .container
        .as_deref()
        .map(compile_selector)
        .transpose()?;

    let mut fields = Vec::with_capacity(template.annotations.len());
    for annotation in &template.annotations {
        let mut field_type = schema
            .fields
            .get(&annotation.field)
            .map(|field| field.field_type)
            .unwrap_or_default();
        let mut filters = Vec::new();

        for id in &annotation.extractors {
            match extractors.get(id) {
                Some(ExtractorRule::RegularExpression(pattern)) => {
                    filters.push(compile_regex(pattern)?)
                }
                Some(ExtractorRule::TypeExtractor(overridden)) => field_type = *overridden,
                None => return Err(ExtractionError::UnknownExtractor(id.clone())),
            }
        }

        fields.push(CompiledField {
            name: annotation.field.clone(),
            selector: compile_selector(&annotation.selector)?,
            attribute: annotation.attribute.clone(),
            field_type,
            filters,
        });
    }

    let required = schema
        .fields
        .iter()
        .filter(|(_, field)| field.required)
        .map(|(name, _)| name.clone())
        .collect();

    Ok(CompiledTemplate {
        item_type: template.scrapes.clone(),
        url_pattern,
        container,
        fields,
        required,
    })
}

fn compile_selector(selector: &str) -> ExtractionResult<Selector> {
    Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

fn compile_regex(pattern: &str) -> ExtractionResult<Regex> {
    Regex::new(pattern).map_err(|source| ExtractionError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Reads the attribute, inner HTML or collapsed text of an element
fn raw_value(element: ElementRef<'_>, field: &CompiledField) -> Option<String> {
    let value = match (&field.attribute, field.field_type) {
        (Some(attribute), _) => element.value().attr(attribute)?.trim().to_string(),
        (None, FieldType::RawHtml) => element.inner_html().trim().to_string(),
        (None, _) => element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" "),
    };

    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Applies regex extractors in order; a value that fails any of them is dropped
fn apply_filters(value: String, filters: &[Regex]) -> Option<String> {
    let mut value = value;
    for filter in filters {
        let captures = filter.captures(&value)?;
        let matched = captures.get(1).or_else(|| captures.get(0))?;
        value = matched.as_str().to_string();
    }
    Some(value)
}
