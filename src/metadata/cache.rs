use std::collections::HashMap;
use std::sync::Arc;

use super::pod::{PodLabels, resolve_pod_labels};
use crate::config::PipelineConfig;
use crate::container::{Container, ContainerId};
use crate::inventory::{ContainerInventory, InventoryError};

const TAGS_ENV: &str = "LOGSTASH_TAGS";
const FIELDS_ENV: &str = "LOGSTASH_FIELDS";
const DECODE_JSON_LOGS_ENV: &str = "DECODE_JSON_LOGS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field entry '{0}' is not of the form key=value")]
pub struct MalformedFieldError(pub String);

/// Splits a comma separated tag list. The empty string has no tags.
pub fn parse_tags(tags: &str) -> Vec<String> {
    if tags.is_empty() {
        return Vec::new();
    }
    tags.split(',').map(str::to_string).collect()
}

/// Parses `key=value,key=value`. Values may themselves contain `=`.
pub fn parse_fields(fields: &str) -> Result<HashMap<String, String>, MalformedFieldError> {
    if fields.is_empty() {
        return Ok(HashMap::new());
    }
    fields
        .split(',')
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| MalformedFieldError(entry.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub tags: Arc<[String]>,
    pub fields: Arc<HashMap<String, String>>,
    pub decode_json: bool,
}

/// Memoizes per-container metadata for the lifetime of the pipeline.
///
/// Tags, fields and the decode flag are computed once per container id.
/// Pod labels are only stored once a pod leader was found; every other
/// outcome is recomputed on the next line.
#[derive(Debug, Default)]
pub struct MetadataCache {
    default_tags: String,
    default_fields: String,
    default_decode_json_logs: String,
    tags: HashMap<ContainerId, Arc<[String]>>,
    fields: HashMap<ContainerId, Arc<HashMap<String, String>>>,
    decode_json_logs: HashMap<ContainerId, bool>,
    pod_labels: HashMap<ContainerId, HashMap<String, String>>,
}

impl MetadataCache {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            default_tags: config.default_tags.clone(),
            default_fields: config.default_fields.clone(),
            default_decode_json_logs: config.default_decode_json_logs.clone(),
            ..Default::default()
        }
    }

    pub fn resolve(
        &mut self,
        container: &Container,
    ) -> Result<ResolvedMetadata, MalformedFieldError> {
        Ok(ResolvedMetadata {
            tags: self.container_tags(container),
            fields: self.logstash_fields(container)?,
            decode_json: self.decode_json_logs(container),
        })
    }

    /// The first `LOGSTASH_TAGS` entry wins.
    pub fn container_tags(&mut self, container: &Container) -> Arc<[String]> {
        self.tags
            .entry(container.container_id())
            .or_insert_with(|| {
                let tags = container
                    .env_values(TAGS_ENV)
                    .next()
                    .unwrap_or(&self.default_tags);
                parse_tags(tags).into()
            })
            .clone()
    }

    /// The last `LOGSTASH_FIELDS` entry wins.
    pub fn logstash_fields(
        &mut self,
        container: &Container,
    ) -> Result<Arc<HashMap<String, String>>, MalformedFieldError> {
        let id = container.container_id();
        if let Some(fields) = self.fields.get(&id) {
            return Ok(fields.clone());
        }

        let fields = container
            .env_values(FIELDS_ENV)
            .last()
            .unwrap_or(&self.default_fields);
        let fields = Arc::new(parse_fields(fields)?);

        self.fields.insert(id, fields.clone());
        Ok(fields)
    }

    /// The last `DECODE_JSON_LOGS` entry wins; only `false` disables decoding.
    pub fn decode_json_logs(&mut self, container: &Container) -> bool {
        *self
            .decode_json_logs
            .entry(container.container_id())
            .or_insert_with(|| {
                container
                    .env_values(DECODE_JSON_LOGS_ENV)
                    .last()
                    .unwrap_or(&self.default_decode_json_logs)
                    != "false"
            })
    }

    pub async fn pod_labels(
        &mut self,
        container: &Container,
        current_labels: HashMap<String, String>,
        inventory: &dyn ContainerInventory,
    ) -> Result<HashMap<String, String>, InventoryError> {
        let id = container.container_id();
        if let Some(labels) = self.pod_labels.get(&id) {
            log::debug!("Got labels already for container {id}");
            return Ok(labels.clone());
        }

        log::debug!("Looking for labels for container {id} for the first time");

        // TODO: cache the Unchanged outcome too once it is confirmed that
        // re-querying the inventory for pod-less containers is not wanted.
        match resolve_pod_labels(container, current_labels, inventory).await? {
            PodLabels::Merged(labels) => {
                self.pod_labels.insert(id, labels.clone());
                Ok(labels)
            }
            PodLabels::Unchanged(labels) => Ok(labels),
        }
    }
}
