use std::collections::HashMap;

use log::debug;

use super::{ProcessError, Processor};
use crate::ecs::{Cluster, Instance};
use crate::task::{DecoratedTask, EC2MetaData};

/// Attaches the EC2 host facts of the container instance a task runs on.
#[derive(Default)]
pub struct ContainerInstanceProcessor;

fn meta_data(container_instance_id: &str, instance: &Instance) -> EC2MetaData {
    EC2MetaData {
        container_instance_id: container_instance_id.to_owned(),
        instance_id: instance.instance_id.clone().unwrap_or_default(),
        private_ip: instance.private_ip_address.clone().unwrap_or_default(),
        instance_type: instance.instance_type.clone().unwrap_or_default(),
        vpc_id: instance.vpc_id.clone().unwrap_or_default(),
        subnet_id: instance.subnet_id.clone().unwrap_or_default(),
    }
}

impl Processor for ContainerInstanceProcessor {
    fn name(&self) -> &'static str {
        "ContainerInstanceProcessor"
    }

    fn process(&self, cluster: &Cluster, tasks: &mut [DecoratedTask]) -> Result<(), ProcessError> {
        let instances: HashMap<&str, &Instance> = cluster
            .instances
            .iter()
            .filter_map(|i| i.instance_id.as_deref().map(|id| (id, i)))
            .collect();
        let hosts: HashMap<&str, EC2MetaData> = cluster
            .container_instances
            .iter()
            .filter_map(|ci| {
                let arn = ci.container_instance_arn.as_deref()?;
                let instance = instances.get(ci.ec2_instance_id.as_deref()?)?;
                Some((arn, meta_data(arn, instance)))
            })
            .collect();

        for task in tasks.iter_mut() {
            let Some(arn) = task.task.container_instance_arn.as_deref() else {
                continue;
            };
            match hosts.get(arn) {
                Some(info) => task.ec2_info = Some(info.clone()),
                None => debug!("No EC2 instance found for container instance {}", arn),
            }
        }

        Ok(())
    }
}
