use log::debug;

use super::{ProcessError, Processor};
use crate::config::TaskDefinitionConfig;
use crate::ecs::{Cluster, ContainerDefinition};
use crate::task::DecoratedTask;

/// Flags the tasks whose task definition ARN matches a configured rule.
pub struct TaskDefinitionDiscoveryProcessor {
    rules: Vec<TaskDefinitionConfig>,
}

impl TaskDefinitionDiscoveryProcessor {
    pub fn new(rules: Vec<TaskDefinitionConfig>) -> Self {
        TaskDefinitionDiscoveryProcessor { rules }
    }
}

fn any_container_matches(containers: &[ContainerDefinition], rule: &TaskDefinitionConfig) -> bool {
    containers.iter().any(|c| {
        let matched = rule.exporter.matches_container(c.name());
        if !matched {
            debug!("Container name pattern did not match {}", c.name());
        }
        matched
    })
}

impl Processor for TaskDefinitionDiscoveryProcessor {
    fn name(&self) -> &'static str {
        "TaskDefinitionDiscoveryProcessor"
    }

    fn process(&self, _: &Cluster, tasks: &mut [DecoratedTask]) -> Result<(), ProcessError> {
        if self.rules.is_empty() {
            return Ok(());
        }

        for task in tasks.iter_mut() {
            let Some(arn) = task.task_definition.task_definition_arn.as_deref() else {
                continue;
            };

            let matched = self.rules.iter().any(|rule| {
                if !rule.task_definition_arn_pattern.is_match(arn) {
                    debug!(
                        "Task definition {} does not match {}",
                        arn, rule.task_definition_arn_pattern
                    );
                    return false;
                }
                debug!("Task definition {} matches {}", arn, rule.task_definition_arn_pattern);
                rule.exporter.container_name_pattern.is_none()
                    || any_container_matches(&task.task_definition.container_definitions, rule)
            });
            if matched {
                task.task_definition_based = true;
            }
        }

        Ok(())
    }
}
