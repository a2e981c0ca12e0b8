use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::IngestError;
use crate::slug::title_from_filename;

/// Hand-authored metadata for one image file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataEntry {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub seed: Option<String>,
    pub preset: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl MetadataEntry {
    /// Reads one entry field by field. Numbers and booleans are kept as
    /// their literal text; fields of any other shape are logged and ignored
    /// so one bad entry never fails the whole file.
    pub fn from_value(file_name: &str, value: &Value) -> Self {
        let Value::Object(fields) = value else {
            if !value.is_null() {
                warn!("Ignoring metadata for {}: entry is not an object", file_name);
            }
            return Self::default();
        };

        let text = |key: &str| {
            let field = fields.get(key)?;
            let text = scalar_to_string(field);
            if text.is_none() && !field.is_null() {
                warn!("Ignoring metadata field {:?} for {}: {}", key, file_name, field);
            }
            text
        };

        Self {
            title: text("title"),
            prompt: text("prompt"),
            model: text("model"),
            seed: text("seed"),
            preset: text("preset"),
            tags: fields.get("tags").and_then(|tags| read_tags(file_name, tags)),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// A bare string is a single tag. Non-scalar list items are dropped.
fn read_tags(file_name: &str, value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| {
                    let tag = scalar_to_string(item);
                    if tag.is_none() {
                        warn!("Ignoring tag {} for {}", item, file_name);
                    }
                    tag
                })
                .collect(),
        ),
        other => match scalar_to_string(other) {
            Some(tag) => Some(vec![tag]),
            None => {
                warn!("Ignoring tags for {}: {}", file_name, other);
                None
            }
        },
    }
}

/// Metadata file contents: file name -> entry.
pub type MetadataFile = HashMap<String, MetadataEntry>;

/// Loads the metadata file. A missing file is an empty mapping. A file that
/// is not a JSON object is an error; problems inside a single entry are not.
pub fn load_metadata_file(path: Option<&Path>) -> Result<MetadataFile, IngestError> {
    let Some(path) = path else {
        return Ok(MetadataFile::new());
    };

    if !path.exists() {
        debug!("No metadata file at {:?}", path);
        return Ok(MetadataFile::new());
    }

    let content = std::fs::read_to_string(path)?;
    let raw: HashMap<String, Value> = serde_json::from_str(&content)?;
    let metadata: MetadataFile = raw
        .iter()
        .map(|(file_name, value)| (file_name.clone(), MetadataEntry::from_value(file_name, value)))
        .collect();

    info!("Loaded metadata for {} files from {:?}", metadata.len(), path);
    Ok(metadata)
}

/// Display fields for one image after applying fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub title: String,
    pub prompt: String,
    pub model: String,
    pub seed: String,
    pub preset: String,
    pub tags: Vec<String>,
}

impl ResolvedMetadata {
    pub fn resolve(file_name: &str, entry: Option<&MetadataEntry>) -> Self {
        let entry = entry.cloned().unwrap_or_default();

        let title = entry
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| title_from_filename(file_name));

        Self {
            title,
            prompt: entry.prompt.unwrap_or_default(),
            model: entry.model.unwrap_or_default(),
            seed: entry.seed.unwrap_or_default(),
            preset: entry.preset.unwrap_or_default(),
            tags: entry.tags.unwrap_or_default(),
        }
    }
}
