//! Bulk loading of query templates from a JSON configuration file

use super::FilterTree;
use crate::error::{Result, SieveError};
use crate::metadata::MetadataValue;
use crate::store::{Database, OrganisationId, TemplateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Opaque grammar description persisted alongside the templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrammarDefinition {
    #[serde(default)]
    pub tokens: serde_json::Value,
    #[serde(default)]
    pub alphabet: serde_json::Value,
}

/// Template entry exactly as it appears in the configuration file
#[derive(Debug, Clone, Deserialize)]
struct TemplateEntry {
    name: String,
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    data_connector: BTreeMap<String, MetadataValue>,
    #[serde(default)]
    data_filter_expressions: FilterTree,
    #[serde(default)]
    structured_response_if_exists: bool,
    #[serde(default)]
    structured_response_data_fields: Vec<String>,
    #[serde(default)]
    prompt_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
struct TemplateConfigFile {
    template_name: String,
    templates_grammar: GrammarDefinition,
    #[serde(default)]
    query_templates: Vec<TemplateEntry>,
}

/// Template ready to be written, prompt already resolved
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDraft {
    pub name: String,
    pub display: Option<String>,
    pub data_connector: BTreeMap<String, MetadataValue>,
    pub data_filter_expressions: FilterTree,
    pub structured_response: bool,
    pub structured_response_fields: Vec<String>,
    pub system_prompt: Option<String>,
}

/// A named grammar with its templates
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    pub name: String,
    pub grammar: GrammarDefinition,
    pub templates: Vec<TemplateDraft>,
}

/// Outcome of persisting a [`TemplateSet`]
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub template_collection_id: i64,
    pub grammar_id: i64,
    /// Templates that were active before the load
    pub deactivated: usize,
    pub template_ids: Vec<TemplateId>,
}

pub struct TemplateLoader {
    set: TemplateSet,
}

impl TemplateLoader {
    /// Read and validate a template configuration file
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SieveError::Io {
            source: e,
            context: format!("Failed to read template config {:?}", path),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&raw, base_dir)
    }

    /// Parse configuration text; relative `prompt_file`s resolve against `base_dir`
    pub fn from_json(raw: &str, base_dir: &Path) -> Result<Self> {
        let file: TemplateConfigFile = serde_json::from_str(raw).map_err(|e| SieveError::Json {
            source: e,
            context: "Failed to parse template config".to_string(),
        })?;

        let name = file.template_name.trim().to_string();
        if name.is_empty() {
            return Err(SieveError::TemplateConfig(
                "template_name must not be empty".to_string(),
            ));
        }
        if name.contains('<') {
            return Err(SieveError::TemplateConfig(format!(
                "template_name '{}' still contains a placeholder",
                name
            )));
        }

        let mut templates = Vec::with_capacity(file.query_templates.len());
        for entry in file.query_templates {
            if entry.name.trim().is_empty() {
                return Err(SieveError::TemplateConfig(format!(
                    "template without a name in '{}'",
                    name
                )));
            }
            let system_prompt = read_prompt(entry.prompt_file.as_deref(), base_dir)?;
            templates.push(TemplateDraft {
                name: entry.name,
                display: entry.display,
                data_connector: entry.data_connector,
                data_filter_expressions: entry.data_filter_expressions,
                structured_response: entry.structured_response_if_exists,
                structured_response_fields: entry.structured_response_data_fields,
                system_prompt,
            });
        }

        Ok(Self {
            set: TemplateSet {
                name,
                grammar: file.templates_grammar,
                templates,
            },
        })
    }

    pub fn template_set(&self) -> &TemplateSet {
        &self.set
    }

    /// Persist the set for an organisation, replacing the previously active
    /// templates of the same grammar
    pub fn load_into(&self, db: &Database, organisation: OrganisationId) -> Result<LoadReport> {
        let report = db.apply_template_set(&self.set, organisation)?;
        info!(
            "Loaded template set '{}' for organisation {}: {} active, {} previously active",
            self.set.name,
            organisation,
            report.template_ids.len(),
            report.deactivated
        );
        Ok(report)
    }
}

fn read_prompt(prompt_file: Option<&Path>, base_dir: &Path) -> Result<Option<String>> {
    let Some(file) = prompt_file.filter(|f| !f.as_os_str().is_empty()) else {
        return Ok(None);
    };
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        base_dir.join(file)
    };
    if !path.exists() {
        debug!("Prompt file {:?} does not exist, leaving prompt empty", path);
        return Ok(None);
    }
    let prompt = std::fs::read_to_string(&path).map_err(|e| SieveError::Io {
        source: e,
        context: format!("Failed to read prompt file {:?}", path),
    })?;
    Ok(Some(prompt))
}
