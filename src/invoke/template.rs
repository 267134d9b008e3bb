//! SAM template model — the subset of `template.yaml` the run pipeline needs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Resource types the local tool can invoke.
pub const FUNCTION_TYPES: &[&str] = &["AWS::Serverless::Function", "AWS::Lambda::Function"];

#[derive(Debug, Clone, Deserialize)]
pub struct SamTemplate {
    #[serde(rename = "Resources", default)]
    pub resources: HashMap<String, TemplateResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties", default)]
    pub properties: ResourceProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceProperties {
    #[serde(rename = "Handler")]
    pub handler: Option<String>,
    #[serde(rename = "Runtime")]
    pub runtime: Option<String>,
    #[serde(rename = "Timeout")]
    pub timeout: Option<u64>,
    /// `CodeUri` (serverless functions) or `Code` (plain Lambda functions) —
    /// the code root, relative to the template.
    #[serde(rename = "CodeUri")]
    pub code_uri: Option<String>,
    #[serde(rename = "Code")]
    pub code: Option<String>,
}

impl ResourceProperties {
    pub fn code_root(&self) -> Option<&str> {
        self.code_uri.as_deref().or(self.code.as_deref())
    }
}

impl SamTemplate {
    /// Parse a template file. This is the only filesystem access validation
    /// performs.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read template {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse template {}", path.display()))
    }

    /// The invocable function resource with the given logical id, if any.
    pub fn function(&self, logical_id: &str) -> Option<&TemplateResource> {
        self.resources
            .get(logical_id)
            .filter(|r| FUNCTION_TYPES.contains(&r.resource_type.as_str()))
    }
}
