use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::Receiver;

use crate::config::PipelineConfig;
use crate::container::{Container, LogMessage};
use crate::delivery::{DeliveryChannel, DeliveryError};
use crate::inventory::{ContainerInventory, InventoryError};
use crate::metadata::{MalformedFieldError, MetadataCache, ResolvedMetadata};
use crate::record::{DockerInfo, build_record, encode_record};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Logstash delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("Could not get pod labels: {0}")]
    Inventory(#[from] InventoryError),
    #[error("Invalid LOGSTASH_FIELDS for container {container}: {source}")]
    MalformedField {
        container: String,
        source: MalformedFieldError,
    },
}

/// Docker label keys with `.` replaced by `_`.
fn normalize_labels(labels: &HashMap<String, String>) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.replace('.', "_"), v.clone()))
        .collect()
}

/// Some Docker versions (18.06, 18.09 at least) make the journald driver
/// concatenate two events with a bare carriage return. Splitting on it is
/// only done when the workaround is enabled.
fn split_lines(data: &str, broken_journald: bool) -> Vec<&str> {
    if broken_journald {
        data.split('\r').collect()
    } else {
        vec![data]
    }
}

/// Consumes log lines one at a time: resolve metadata, build the record,
/// send it. Nothing is reordered or batched.
pub struct StreamDriver {
    config: PipelineConfig,
    cache: MetadataCache,
    inventory: Arc<dyn ContainerInventory>,
    channel: DeliveryChannel,
}

impl StreamDriver {
    pub fn new(
        config: PipelineConfig,
        inventory: Arc<dyn ContainerInventory>,
        channel: DeliveryChannel,
    ) -> Self {
        let cache = MetadataCache::new(&config);
        Self {
            config,
            cache,
            inventory,
            channel,
        }
    }

    /// Runs until `rx` is closed or a line cannot be handled.
    pub async fn run(mut self, mut rx: Receiver<LogMessage>) -> Result<(), PipelineError> {
        log::info!("Log stream started");
        while let Some(message) = rx.recv().await {
            self.handle_message(&message).await?;
        }
        log::info!("Log stream closed");
        Ok(())
    }

    async fn handle_message(&mut self, message: &LogMessage) -> Result<(), PipelineError> {
        let container = &message.container;

        let labels = if self.config.docker_labels {
            let current = normalize_labels(&container.labels);
            let labels = self
                .cache
                .pod_labels(container, current, self.inventory.as_ref())
                .await?;
            Some(labels)
        } else {
            None
        };
        let docker = DockerInfo::new(container, labels);

        let metadata = self.resolve_metadata(container)?;

        for line in split_lines(&message.data, self.config.broken_journald) {
            self.send_line(line, &metadata, &docker, &message.source)
                .await?;
        }
        Ok(())
    }

    fn resolve_metadata(
        &mut self,
        container: &Container,
    ) -> Result<ResolvedMetadata, PipelineError> {
        self.cache
            .resolve(container)
            .map_err(|source| PipelineError::MalformedField {
                container: container.id.clone(),
                source,
            })
    }

    async fn send_line(
        &mut self,
        line: &str,
        metadata: &ResolvedMetadata,
        docker: &DockerInfo,
        source: &str,
    ) -> Result<(), PipelineError> {
        let bytes = match build_record(line, metadata, docker, source)
            .and_then(|record| encode_record(&record))
        {
            Ok(bytes) => bytes,
            Err(e) => {
                // Bad data is not worth stopping the stream for.
                log::error!("Dropping line from container {}: {e}", docker.id);
                return Ok(());
            }
        };
        self.channel.send(&bytes).await?;
        Ok(())
    }
}
