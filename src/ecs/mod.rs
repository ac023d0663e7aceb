//! Read-only view of the orchestrator data a discovery cycle works on.
//!
//! The shapes follow the ECS API JSON documents (camelCase keys), so a
//! collector can dump `DescribeTasks`, `DescribeTaskDefinition`,
//! `DescribeContainerInstances`, `DescribeInstances` and `DescribeServices`
//! output into a single file without reshaping it.

use std::collections::HashMap;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::task::DecoratedTask;

pub const RUNNING: &str = "RUNNING";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed reading cluster view: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid cluster view document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Awsvpc,
    Bridge,
    Host,
    None,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyValuePair {
    pub name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub details: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkBinding {
    pub container_port: Option<u16>,
    pub host_port: Option<u16>,
}

/// A container as it runs inside a task, with its live port bindings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    pub name: Option<String>,
    pub network_bindings: Vec<NetworkBinding>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub task_arn: Option<String>,
    pub task_definition_arn: Option<String>,
    pub container_instance_arn: Option<String>,
    pub group: Option<String>,
    pub started_by: Option<String>,
    pub launch_type: Option<String>,
    pub last_status: Option<String>,
    pub attachments: Vec<Attachment>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortMapping {
    pub container_port: Option<u16>,
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerDefinition {
    pub name: Option<String>,
    pub docker_labels: HashMap<String, String>,
    pub port_mappings: Vec<PortMapping>,
}

impl ContainerDefinition {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskDefinition {
    pub task_definition_arn: Option<String>,
    pub family: Option<String>,
    pub revision: Option<i64>,
    pub network_mode: Option<NetworkMode>,
    pub container_definitions: Vec<ContainerDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerInstance {
    pub container_instance_arn: Option<String>,
    pub ec2_instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Instance {
    pub instance_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub instance_type: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    pub service_name: Option<String>,
    pub deployments: Vec<Deployment>,
}

/// Everything known about one cluster for the duration of a polling cycle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    #[serde(skip)]
    pub name: String,
    pub tasks: Vec<Task>,
    pub task_definitions: Vec<TaskDefinition>,
    pub container_instances: Vec<ContainerInstance>,
    pub instances: Vec<Instance>,
    pub services: Vec<Service>,
}

impl Cluster {
    pub async fn load(path: impl AsRef<Path>, name: &str) -> Result<Self, SnapshotError> {
        let data = tokio::fs::read(path).await?;
        Self::from_slice(&data, name)
    }

    pub fn from_slice(data: &[u8], name: &str) -> Result<Self, SnapshotError> {
        let mut cluster: Cluster = serde_json::from_slice(data)?;
        cluster.name = name.to_owned();
        Ok(cluster)
    }

    /// Joins every running task with its task definition. Tasks whose
    /// definition is not part of the view are left out.
    pub fn decorated_tasks(&self) -> Vec<DecoratedTask> {
        let definitions: HashMap<&str, &TaskDefinition> = self
            .task_definitions
            .iter()
            .filter_map(|d| d.task_definition_arn.as_deref().map(|arn| (arn, d)))
            .collect();

        self.tasks
            .iter()
            .filter(|t| t.last_status.as_deref().map_or(true, |s| s == RUNNING))
            .filter_map(|t| {
                let arn = t.task_definition_arn.as_deref()?;
                match definitions.get(arn) {
                    Some(definition) => Some(DecoratedTask::new(t.clone(), (*definition).clone())),
                    None => {
                        debug!(
                            "Skipping task {:?}, task definition {} not found",
                            t.task_arn, arn
                        );
                        None
                    }
                }
            })
            .collect()
    }
}
