use std::collections::HashMap;

use log::debug;

use super::{ProcessError, Processor};
use crate::config::ServiceNameConfig;
use crate::ecs::Cluster;
use crate::task::DecoratedTask;

/// Associates tasks with the service that started them, for the services
/// named by a configured rule.
///
/// ECS sets a service task's `startedBy` to the id of the deployment that
/// launched it, so tasks are joined to services through their deployments.
pub struct ServiceEndpointDiscoveryProcessor {
    rules: Vec<ServiceNameConfig>,
}

impl ServiceEndpointDiscoveryProcessor {
    pub fn new(rules: Vec<ServiceNameConfig>) -> Self {
        ServiceEndpointDiscoveryProcessor { rules }
    }

    fn is_configured(&self, service_name: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.service_name_pattern.is_match(service_name))
    }
}

impl Processor for ServiceEndpointDiscoveryProcessor {
    fn name(&self) -> &'static str {
        "ServiceEndpointDiscoveryProcessor"
    }

    fn process(&self, cluster: &Cluster, tasks: &mut [DecoratedTask]) -> Result<(), ProcessError> {
        if self.rules.is_empty() {
            return Ok(());
        }

        let deployments: HashMap<&str, &str> = cluster
            .services
            .iter()
            .filter_map(|s| s.service_name.as_deref().map(|name| (name, s)))
            .filter(|(name, _)| self.is_configured(name))
            .flat_map(|(name, s)| {
                s.deployments
                    .iter()
                    .filter_map(move |d| d.id.as_deref().map(|id| (id, name)))
            })
            .collect();
        if deployments.is_empty() {
            debug!("No configured service found in cluster {}", cluster.name);
            return Ok(());
        }

        for task in tasks.iter_mut() {
            let Some(started_by) = task.task.started_by.as_deref() else {
                continue;
            };
            if let Some(service_name) = deployments.get(started_by) {
                debug!("Task started by {} belongs to service {}", started_by, service_name);
                task.service_name = service_name.to_string();
            }
        }

        Ok(())
    }
}
