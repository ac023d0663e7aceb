use log::debug;
use metrics::increment_counter;

use crate::ecs::Cluster;
use crate::task::DecoratedTask;

pub mod container_instance;
pub mod docker_label;
pub mod service_endpoint;
pub mod task_definition;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{processor} failed: {reason}")]
    Failed {
        processor: &'static str,
        reason: String,
    },
}

/// A step of a discovery cycle. Processors enrich the decorated tasks of a
/// cluster in place.
pub trait Processor {
    fn name(&self) -> &'static str;

    fn process(&self, cluster: &Cluster, tasks: &mut [DecoratedTask]) -> Result<(), ProcessError>;
}

/// Processors run front to back, stopping at the first failure.
#[derive(Default)]
pub struct Pipeline {
    processors: Vec<Box<dyn Processor + Sync + Send>>,
}

impl Pipeline {
    pub fn new(processors: Vec<Box<dyn Processor + Sync + Send>>) -> Self {
        Pipeline { processors }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, cluster: &Cluster, tasks: &mut [DecoratedTask]) -> Result<(), ProcessError> {
        for processor in &self.processors {
            debug!(
                "Running {} over {} tasks of cluster {}",
                processor.name(),
                tasks.len(),
                cluster.name
            );
            processor.process(cluster, tasks)?;
            increment_counter!(crate::PROCESSOR_RUNS, "processor" => processor.name());
        }
        Ok(())
    }
}
