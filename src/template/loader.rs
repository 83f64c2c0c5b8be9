//! Template definition loaders.
//!
//! A loader returns the raw JSON definition of one channel of a template,
//! or `None` when that channel is not defined.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::notification::ServiceType;

use super::types::{validate_id, TemplateError, TemplateResult};

#[async_trait]
pub trait TemplateLoader: Send + Sync {
    async fn load(
        &self,
        platform_id: &str,
        template_id: &str,
        service_type: ServiceType,
    ) -> TemplateResult<Option<Value>>;
}

/// Reads `<root>/<platformId>/<templateId>/<CHANNEL>.json`
pub struct FileTemplateLoader {
    root: PathBuf,
}

impl FileTemplateLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn definition_path(&self, platform_id: &str, template_id: &str, service_type: ServiceType) -> PathBuf {
        self.root
            .join(platform_id)
            .join(template_id)
            .join(format!("{}.json", service_type.template_name()))
    }
}

#[async_trait]
impl TemplateLoader for FileTemplateLoader {
    async fn load(
        &self,
        platform_id: &str,
        template_id: &str,
        service_type: ServiceType,
    ) -> TemplateResult<Option<Value>> {
        validate_id("platform", platform_id)?;
        validate_id("template", template_id)?;

        let path = self.definition_path(platform_id, template_id, service_type);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TemplateError::Load {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let definition = serde_json::from_str(&content).map_err(|e| TemplateError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(path = %path.display(), "Loaded template definition");
        Ok(Some(definition))
    }
}

/// In-memory template definitions
#[derive(Default)]
pub struct MemoryTemplateLoader {
    definitions: DashMap<(String, String, ServiceType), Value>,
}

impl MemoryTemplateLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the definition of one channel
    pub fn insert(&self, platform_id: &str, template_id: &str, service_type: ServiceType, definition: Value) {
        self.definitions.insert(
            (platform_id.to_string(), template_id.to_string(), service_type),
            definition,
        );
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[async_trait]
impl TemplateLoader for MemoryTemplateLoader {
    async fn load(
        &self,
        platform_id: &str,
        template_id: &str,
        service_type: ServiceType,
    ) -> TemplateResult<Option<Value>> {
        let key = (platform_id.to_string(), template_id.to_string(), service_type);
        Ok(self.definitions.get(&key).map(|entry| entry.value().clone()))
    }
}
