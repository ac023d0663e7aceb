use log::debug;

use super::{ProcessError, Processor};
use crate::config::DockerLabelConfig;
use crate::ecs::Cluster;
use crate::task::DecoratedTask;

/// Flags the tasks with at least one container carrying the exporter port
/// docker label.
pub struct DockerLabelDiscoveryProcessor {
    port_label: Option<String>,
}

impl DockerLabelDiscoveryProcessor {
    pub fn new(config: Option<&DockerLabelConfig>) -> Self {
        DockerLabelDiscoveryProcessor {
            port_label: config
                .map(|c| c.port_label.clone())
                .filter(|label| !label.is_empty()),
        }
    }
}

impl Processor for DockerLabelDiscoveryProcessor {
    fn name(&self) -> &'static str {
        "DockerLabelDiscoveryProcessor"
    }

    fn process(&self, _: &Cluster, tasks: &mut [DecoratedTask]) -> Result<(), ProcessError> {
        let Some(port_label) = &self.port_label else {
            return Ok(());
        };

        for task in tasks.iter_mut() {
            if task
                .task_definition
                .container_definitions
                .iter()
                .any(|c| c.docker_labels.contains_key(port_label))
            {
                debug!("Task carries docker label {}: {}", port_label, task);
                task.docker_label_based = true;
            }
        }

        Ok(())
    }
}
