pub mod config;
pub mod ecs;
pub mod log_filter;
pub mod processors;
pub mod targets;
pub mod task;

use std::path::Path;

use log::info;
use metrics::{describe_counter, describe_gauge, gauge, increment_counter};

use config::ServiceDiscoveryConfig;
use ecs::Cluster;
use processors::{
    container_instance::ContainerInstanceProcessor, docker_label::DockerLabelDiscoveryProcessor,
    service_endpoint::ServiceEndpointDiscoveryProcessor,
    task_definition::TaskDefinitionDiscoveryProcessor, Pipeline, Processor,
};
use targets::TargetMap;

const DISCOVERY_CYCLES: &str = "ecs_sd_discovery_cycles_total";
const DISCOVERY_FAILURES: &str = "ecs_sd_discovery_failures_total";
const TARGETS: &str = "ecs_sd_targets";
const PROCESSOR_RUNS: &str = "ecs_sd_processor_runs_total";

pub fn init_metrics() {
    describe_counter!(DISCOVERY_CYCLES, "Number of discovery cycles run");
    describe_counter!(DISCOVERY_FAILURES, "Number of failed discovery cycles");
    describe_gauge!(TARGETS, "Number of targets in the last written result");
    describe_counter!(PROCESSOR_RUNS, "Number of successful processor runs");
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Snapshot(#[from] ecs::SnapshotError),
    #[error(transparent)]
    Process(#[from] processors::ProcessError),
    #[error(transparent)]
    Write(#[from] targets::file::WriteError),
}

/// Turns the tasks of a cluster into Prometheus scrape targets.
pub struct Discovery {
    config: ServiceDiscoveryConfig,
    pipeline: Pipeline,
}

impl Discovery {
    pub fn new(config: ServiceDiscoveryConfig) -> Self {
        let processors: Vec<Box<dyn Processor + Sync + Send>> = vec![
            Box::new(ContainerInstanceProcessor),
            Box::new(ServiceEndpointDiscoveryProcessor::new(
                config.service_names.clone(),
            )),
            Box::new(DockerLabelDiscoveryProcessor::new(
                config.docker_label.as_ref(),
            )),
            Box::new(TaskDefinitionDiscoveryProcessor::new(
                config.task_definitions.clone(),
            )),
        ];
        let pipeline = Pipeline::new(processors);

        Discovery { config, pipeline }
    }

    pub fn config(&self) -> &ServiceDiscoveryConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn discover(&self, cluster: &Cluster) -> Result<TargetMap, processors::ProcessError> {
        let mut tasks = cluster.decorated_tasks();
        self.pipeline.run(cluster, &mut tasks)?;

        let mut targets = TargetMap::new();
        for task in &tasks {
            task.exporter_information(
                &self.config,
                &self.config.label_include_pattern,
                &mut targets,
            );
        }

        info!(
            "Discovered {} targets from {} tasks in cluster {}",
            targets.len(),
            tasks.len(),
            cluster.name
        );
        Ok(targets)
    }

    /// Loads the cluster view at `snapshot`, discovers its targets and
    /// writes them to the configured result file.
    pub async fn run_cycle(&self, snapshot: &Path) -> Result<TargetMap, DiscoveryError> {
        increment_counter!(DISCOVERY_CYCLES);
        let result = self.try_run_cycle(snapshot).await;
        match &result {
            Ok(targets) => {
                gauge!(TARGETS, targets.len() as f64);
            }
            Err(_) => {
                increment_counter!(DISCOVERY_FAILURES);
            }
        }
        result
    }

    async fn try_run_cycle(&self, snapshot: &Path) -> Result<TargetMap, DiscoveryError> {
        let cluster = Cluster::load(snapshot, &self.config.target_cluster).await?;
        let targets = self.discover(&cluster)?;
        targets::file::write(&self.config.result_file, self.config.result_format, &targets)
            .await?;
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        let config = config::parse_str("sd_result_file: /tmp/out.json").unwrap();
        let discovery = Discovery::new(config);

        assert_eq!(
            discovery.pipeline().names(),
            vec![
                "ContainerInstanceProcessor",
                "ServiceEndpointDiscoveryProcessor",
                "DockerLabelDiscoveryProcessor",
                "TaskDefinitionDiscoveryProcessor",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_snapshot_fails_cycle() {
        let config = config::parse_str("sd_result_file: /tmp/out.json").unwrap();
        let discovery = Discovery::new(config);

        let err = discovery
            .run_cycle(Path::new("/nonexistent/cluster.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, DiscoveryError::Snapshot(ecs::SnapshotError::Io(_))));
    }
}
