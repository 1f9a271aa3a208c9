//! Follows container output through the Docker API and feeds it to the
//! pipeline, one message per line.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::ContainerInspectResponse;
use bollard::query_parameters::{
    EventsOptionsBuilder, InspectContainerOptions, ListContainersOptionsBuilder, LogsOptions,
    LogsOptionsBuilder,
};
use futures_util::StreamExt;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::SendError;

use crate::container::{Container, LogMessage};

/// A line that never ends is cut at this size.
const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
}

fn container_from_inspect(inspect: ContainerInspectResponse) -> Container {
    let config = inspect.config.unwrap_or_default();
    Container {
        id: inspect.id.unwrap_or_default(),
        name: inspect
            .name
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        hostname: config.hostname.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
    }
}

/// Rebuilds text lines from log frames. The daemon splits long lines over
/// several frames, so a line is only emitted once its `\n` has arrived.
#[derive(Debug, Default)]
struct LineFramer {
    carry: Vec<u8>,
}

impl LineFramer {
    fn push(&mut self, frame: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(frame);

        let Some(end) = self.carry.iter().rposition(|b| *b == b'\n') else {
            if self.carry.len() >= MAX_LINE_BYTES {
                return vec![decode(&std::mem::take(&mut self.carry))];
            }
            return Vec::new();
        };

        let rest = self.carry.split_off(end + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        complete[..end].split(|b| *b == b'\n').map(decode).collect()
    }

    /// Whatever is left once the stream ended without a final newline.
    fn finish(self) -> Option<String> {
        (!self.carry.is_empty()).then(|| decode(&self.carry))
    }
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// Why a container is being attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Already running when the source started.
    Running,
    /// Seen through its `start` event, at this Unix time when known.
    Started(Option<i64>),
}

/// Containers already running only contribute new output. A container
/// caught by its start event is read from the second it started, so
/// nothing written before the attach is lost.
fn logs_options(origin: Origin) -> LogsOptions {
    let builder = LogsOptionsBuilder::default()
        .follow(true)
        .stdout(true)
        .stderr(true);
    let builder = match origin {
        Origin::Running => builder.tail("0"),
        Origin::Started(time) => match time.and_then(|t| i32::try_from(t).ok()) {
            Some(since) => builder.since(since),
            None => builder.tail("all"),
        },
    };
    builder.build()
}

/// Ids of the containers whose logs are being followed.
#[derive(Debug, Clone, Default)]
struct Followed(Arc<Mutex<HashSet<String>>>);

impl Followed {
    /// Returns false when `id` is already followed.
    fn claim(&self, id: &str) -> bool {
        self.0.lock().expect("Poisoned mutex").insert(id.to_string())
    }

    fn release(&self, id: &str) {
        self.0.lock().expect("Poisoned mutex").remove(id);
    }
}

pub struct DockerLogSource {
    docker: Docker,
    tx: Sender<LogMessage>,
    followed: Followed,
}

impl DockerLogSource {
    pub fn new(docker: Docker, tx: Sender<LogMessage>) -> Self {
        Self {
            docker,
            tx,
            followed: Followed::default(),
        }
    }

    /// Attaches to every running container and to each container started
    /// afterwards. Returns once the pipeline stops receiving.
    pub async fn run(self) -> Result<(), SourceError> {
        // The event stream only connects when first polled. Replaying from
        // before the listing covers containers started in between; the
        // followed set drops the ones seen twice.
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
            .to_string();
        let filters = HashMap::from_iter([
            ("type", vec!["container".to_string()]),
            ("event", vec!["start".to_string()]),
        ]);
        let options = EventsOptionsBuilder::default()
            .since(&since)
            .filters(&filters)
            .build();

        let running = self
            .docker
            .list_containers(Some(ListContainersOptionsBuilder::default().build()))
            .await?;
        for summary in running {
            if let Some(id) = summary.id {
                self.attach(id, Origin::Running).await;
            }
        }

        let mut events = std::pin::pin!(self.docker.events(Some(options)));
        while let Some(event) = events.next().await {
            if self.tx.is_closed() {
                break;
            }
            let event = event?;
            if let Some(id) = event.actor.and_then(|actor| actor.id) {
                self.attach(id, Origin::Started(event.time)).await;
            }
        }
        Ok(())
    }

    async fn attach(&self, id: String, origin: Origin) {
        if !self.followed.claim(&id) {
            log::debug!("Already following container {id}");
            return;
        }

        let inspect = match self
            .docker
            .inspect_container(&id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(e) => {
                log::warn!("Skipping container {id}, cannot inspect it: {e}");
                self.followed.release(&id);
                return;
            }
        };
        let container = Arc::new(container_from_inspect(inspect));
        log::info!("Following logs of container {} ({id})", container.name);

        let docker = self.docker.clone();
        let tx = self.tx.clone();
        let followed = self.followed.clone();

        tokio::spawn(async move {
            if follow_logs(docker, &id, logs_options(origin), container, tx)
                .await
                .is_err()
            {
                log::debug!("Pipeline closed, no longer following container {id}");
            }
            followed.release(&id);
            log::info!("Stopped following container {id}");
        });
    }
}

async fn follow_logs(
    docker: Docker,
    id: &str,
    options: LogsOptions,
    container: Arc<Container>,
    tx: Sender<LogMessage>,
) -> Result<(), SendError<LogMessage>> {
    let mut logs = std::pin::pin!(docker.logs(id, Some(options)));
    let mut stdout = LineFramer::default();
    let mut stderr = LineFramer::default();

    while let Some(output) = logs.next().await {
        let (source, lines) = match output {
            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                ("stdout", stdout.push(&message))
            }
            Ok(LogOutput::StdErr { message }) => ("stderr", stderr.push(&message)),
            Ok(LogOutput::StdIn { .. }) => continue,
            Err(e) => {
                log::warn!("Log stream of container {id} failed: {e}");
                break;
            }
        };
        forward(&tx, &container, source, lines).await?;
    }

    forward(&tx, &container, "stdout", stdout.finish().into_iter().collect()).await?;
    forward(&tx, &container, "stderr", stderr.finish().into_iter().collect()).await
}

async fn forward(
    tx: &Sender<LogMessage>,
    container: &Arc<Container>,
    source: &str,
    lines: Vec<String>,
) -> Result<(), SendError<LogMessage>> {
    for data in lines {
        tx.send(LogMessage {
            container: Arc::clone(container),
            source: source.to_string(),
            data,
        })
        .await?;
    }
    Ok(())
}
