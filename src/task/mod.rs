//! Per cycle task state and the target generation built on top of it.

use std::fmt;

use log::debug;
use regex::Regex;

use crate::config::{DockerLabelConfig, ExporterConfig, ServiceDiscoveryConfig};
use crate::ecs::{ContainerDefinition, NetworkMode, Task, TaskDefinition};
use crate::targets::{PrometheusTarget, TargetMap};

const CONTAINER_NAME_LABEL: &str = "container_name";
const SERVICE_NAME_LABEL: &str = "ServiceName";
const TASK_FAMILY_LABEL: &str = "TaskDefinitionFamily";
const TASK_REVISION_LABEL: &str = "TaskRevision";
const TASK_GROUP_LABEL: &str = "TaskGroup";
const TASK_STARTED_BY_LABEL: &str = "StartedBy";
const TASK_LAUNCH_TYPE_LABEL: &str = "LaunchType";
const JOB_NAME_LABEL: &str = "job";
const METRICS_PATH_LABEL: &str = "__metrics_path__";
const EC2_INSTANCE_TYPE_LABEL: &str = "InstanceType";
const EC2_VPC_ID_LABEL: &str = "VpcId";
const EC2_SUBNET_ID_LABEL: &str = "SubnetId";

const ENI_ATTACHMENT: &str = "ElasticNetworkInterface";
const ENI_PRIVATE_IP: &str = "privateIPv4Address";

// https://prometheus.io/docs/prometheus/latest/configuration/configuration/#scrape_config
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Facts about the EC2 host a task is placed on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EC2MetaData {
    pub container_instance_id: String,
    pub instance_id: String,
    pub private_ip: String,
    pub instance_type: String,
    pub vpc_id: String,
    pub subnet_id: String,
}

/// A running task joined with its task definition, enriched by the
/// discovery processors during a single polling cycle.
#[derive(Debug, Clone)]
pub struct DecoratedTask {
    pub task: Task,
    pub task_definition: TaskDefinition,
    pub ec2_info: Option<EC2MetaData>,
    pub service_name: String,

    pub docker_label_based: bool,
    pub task_definition_based: bool,
}

impl fmt::Display for DecoratedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task={} task_definition={} ec2_info={:?} docker_label_based={} task_definition_based={}",
            self.task.task_arn.as_deref().unwrap_or_default(),
            self.task.task_definition_arn.as_deref().unwrap_or_default(),
            self.ec2_info,
            self.docker_label_based,
            self.task_definition_based,
        )
    }
}

impl DecoratedTask {
    pub fn new(task: Task, task_definition: TaskDefinition) -> Self {
        DecoratedTask {
            task,
            task_definition,
            ec2_info: None,
            service_name: String::new(),
            docker_label_based: false,
            task_definition_based: false,
        }
    }

    /// Address the task's exporters listen on, or `None` when it can't be told.
    pub fn private_ip(&self) -> Option<&str> {
        let Some(mode) = self.task_definition.network_mode else {
            debug!("No private ip, network mode not set: {}", self);
            return None;
        };

        if mode == NetworkMode::Awsvpc {
            let eni_ip = self
                .task
                .attachments
                .iter()
                .filter(|a| a.kind.as_deref() == Some(ENI_ATTACHMENT))
                .flat_map(|a| a.details.iter())
                .find(|d| d.name.as_deref() == Some(ENI_PRIVATE_IP))
                .map(|d| d.value.as_deref().unwrap_or_default());
            if let Some(ip) = eni_ip {
                debug!("Private ip {} from awsvpc attachment", ip);
                return Some(ip);
            }
        }

        match &self.ec2_info {
            Some(info) => Some(info.private_ip.as_str()),
            None => {
                debug!("No private ip found: {}", self);
                None
            }
        }
    }

    /// Host port the configured container port is reachable on. When several
    /// entries map the same container port, the last one is used.
    pub fn mapped_port(&self, configured_port: u16, container: &ContainerDefinition) -> Option<u16> {
        let port = match self.task_definition.network_mode {
            Some(NetworkMode::Awsvpc) | Some(NetworkMode::Host) => container
                .port_mappings
                .iter()
                .filter(|m| m.container_port == Some(configured_port))
                .last()
                .and_then(|m| m.host_port),
            Some(NetworkMode::Bridge) => self
                .task
                .containers
                .iter()
                .filter(|c| c.name.as_deref() == container.name.as_deref())
                .flat_map(|c| c.network_bindings.iter())
                .filter(|b| b.container_port == Some(configured_port))
                .last()
                .and_then(|b| b.host_port),
            Some(NetworkMode::None) | Some(NetworkMode::Unknown) | None => None,
        };

        match port {
            Some(0) | None => {
                debug!(
                    "No host port for {}:{} in {}",
                    container.name(),
                    configured_port,
                    self
                );
                None
            }
            Some(port) => Some(port),
        }
    }

    fn build_target(
        &self,
        include_labels: &Regex,
        container: &ContainerDefinition,
        ip: &str,
        port: u16,
        metrics_path: &str,
        job_name: &str,
    ) -> PrometheusTarget {
        let mut target = PrometheusTarget::new(format!("{}:{}", ip, port));

        target.add_label(CONTAINER_NAME_LABEL, container.name());
        target.add_label(
            TASK_FAMILY_LABEL,
            self.task_definition.family.as_deref().unwrap_or_default(),
        );
        if let Some(revision) = self.task_definition.revision {
            target.add_label(TASK_REVISION_LABEL, &revision.to_string());
        }
        target.add_label(TASK_GROUP_LABEL, self.task.group.as_deref().unwrap_or_default());
        target.add_label(
            TASK_STARTED_BY_LABEL,
            self.task.started_by.as_deref().unwrap_or_default(),
        );
        target.add_label(
            TASK_LAUNCH_TYPE_LABEL,
            self.task.launch_type.as_deref().unwrap_or_default(),
        );
        if let Some(info) = &self.ec2_info {
            target.add_label(EC2_INSTANCE_TYPE_LABEL, &info.instance_type);
            target.add_label(EC2_VPC_ID_LABEL, &info.vpc_id);
            target.add_label(EC2_SUBNET_ID_LABEL, &info.subnet_id);
        }

        target.add_label(METRICS_PATH_LABEL, metrics_path);
        for (key, value) in &container.docker_labels {
            if include_labels.is_match(key) {
                target.add_label(key, value);
            }
        }
        // set last so a docker label named `job` never wins
        target.add_label(JOB_NAME_LABEL, job_name);

        target
    }

    fn export_rule_targets(
        &self,
        exporter: &ExporterConfig,
        include_labels: &Regex,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetMap,
        service_name: Option<&str>,
    ) {
        let metrics_path = if exporter.metrics_path.is_empty() {
            DEFAULT_METRICS_PATH
        } else {
            exporter.metrics_path.as_str()
        };

        for &port in &exporter.metrics_ports {
            let Some(mapped_port) = self.mapped_port(port, container) else {
                continue;
            };

            let key = TargetMap::key(ip, mapped_port, metrics_path);
            let inserted = targets.insert_with(key.clone(), || {
                let mut target = self.build_target(
                    include_labels,
                    container,
                    ip,
                    mapped_port,
                    &exporter.metrics_path,
                    &exporter.job_name,
                );
                if let Some(service_name) = service_name {
                    target.add_label(SERVICE_NAME_LABEL, service_name);
                }
                target
            });
            if !inserted {
                debug!("Skipping {}, already discovered", key);
            }
        }
    }

    fn export_service_endpoint_targets(
        &self,
        config: &ServiceDiscoveryConfig,
        include_labels: &Regex,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetMap,
    ) {
        if self.service_name.is_empty() {
            return;
        }

        for rule in &config.service_names {
            if !rule.service_name_pattern.is_match(&self.service_name) {
                debug!(
                    "Service name {} does not match {}",
                    self.service_name, rule.service_name_pattern
                );
                continue;
            }
            if !rule.exporter.matches_container(container.name()) {
                debug!(
                    "Container name {} does not match {:?}",
                    container.name(),
                    rule.exporter.container_name_pattern
                );
                continue;
            }

            self.export_rule_targets(
                &rule.exporter,
                include_labels,
                ip,
                container,
                targets,
                Some(&self.service_name),
            );
        }
    }

    fn export_docker_label_targets(
        &self,
        docker_label: Option<&DockerLabelConfig>,
        include_labels: &Regex,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetMap,
    ) {
        if !self.docker_label_based {
            return;
        }
        let Some(docker_label) = docker_label else {
            return;
        };

        let Some(configured_port) = container.docker_labels.get(&docker_label.port_label) else {
            debug!(
                "Container {} has no {} label",
                container.name(),
                docker_label.port_label
            );
            return;
        };
        let Ok(configured_port) = configured_port.parse::<u16>() else {
            debug!(
                "Container {} has invalid port label {:?}",
                container.name(),
                configured_port
            );
            return;
        };
        let Some(mapped_port) = self.mapped_port(configured_port, container) else {
            return;
        };

        let metrics_path_label = container
            .docker_labels
            .get(&docker_label.metrics_path_label)
            .map(String::as_str);
        let metrics_path = metrics_path_label.unwrap_or(DEFAULT_METRICS_PATH);
        let job_name = container
            .docker_labels
            .get(&docker_label.job_name_label)
            .map(String::as_str)
            .unwrap_or_default();

        let key = TargetMap::key(ip, mapped_port, metrics_path);
        let inserted = targets.insert_with(key.clone(), || {
            self.build_target(
                include_labels,
                container,
                ip,
                mapped_port,
                metrics_path_label.unwrap_or_default(),
                job_name,
            )
        });
        if !inserted {
            debug!("Skipping {}, already discovered", key);
        }
    }

    fn export_task_definition_targets(
        &self,
        config: &ServiceDiscoveryConfig,
        include_labels: &Regex,
        ip: &str,
        container: &ContainerDefinition,
        targets: &mut TargetMap,
    ) {
        if !self.task_definition_based {
            return;
        }
        let task_definition_arn = self.task.task_definition_arn.as_deref().unwrap_or_default();

        for rule in &config.task_definitions {
            if !rule.task_definition_arn_pattern.is_match(task_definition_arn) {
                debug!(
                    "Task definition {} does not match {}",
                    task_definition_arn, rule.task_definition_arn_pattern
                );
                continue;
            }
            if !rule.exporter.matches_container(container.name()) {
                debug!(
                    "Container name {} does not match {:?}",
                    container.name(),
                    rule.exporter.container_name_pattern
                );
                continue;
            }

            self.export_rule_targets(&rule.exporter, include_labels, ip, container, targets, None);
        }
    }

    /// Adds a target for every exporter this task exposes. Strategies run in
    /// a fixed order per container (service endpoint, docker label, task
    /// definition) and the first target stored under a key is kept.
    pub fn exporter_information(
        &self,
        config: &ServiceDiscoveryConfig,
        include_labels: &Regex,
        targets: &mut TargetMap,
    ) {
        let Some(ip) = self.private_ip().filter(|ip| !ip.is_empty()) else {
            debug!("Skipping task with no private ip: {}", self);
            return;
        };

        for container in &self.task_definition.container_definitions {
            self.export_service_endpoint_targets(config, include_labels, ip, container, targets);
            self.export_docker_label_targets(
                config.docker_label.as_ref(),
                include_labels,
                ip,
                container,
                targets,
            );
            self.export_task_definition_targets(config, include_labels, ip, container, targets);
        }
    }
}
