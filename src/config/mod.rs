use regex::Regex;
use serde::Deserialize;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_LABEL_INCLUDE_PATTERN: &str = "^[a-zA-Z_][a-zA-Z0-9_]*$";
const DEFAULT_FREQUENCY_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid pattern {pattern:?} in {field}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        source: regex::Error,
    },
    #[error("invalid port {value:?} in sd_metrics_ports")]
    InvalidPort { value: String },
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Deserialize)]
struct DockerLabel {
    sd_port_label: String,
    #[serde(default)]
    sd_metrics_path_label: String,
    #[serde(default)]
    sd_job_name_label: String,
}

#[derive(Deserialize)]
struct TaskDefinitionRule {
    sd_task_definition_arn_pattern: String,
    #[serde(default)]
    sd_container_name_pattern: String,
    sd_metrics_ports: String,
    #[serde(default)]
    sd_metrics_path: String,
    #[serde(default)]
    sd_job_name: String,
}

#[derive(Deserialize)]
struct ServiceNameRule {
    sd_service_name_pattern: String,
    #[serde(default)]
    sd_container_name_pattern: String,
    sd_metrics_ports: String,
    #[serde(default)]
    sd_metrics_path: String,
    #[serde(default)]
    sd_job_name: String,
}

#[derive(Deserialize)]
struct Config {
    #[serde(default)]
    sd_frequency: Option<u64>,
    #[serde(default)]
    sd_target_cluster: String,
    sd_result_file: PathBuf,
    #[serde(default)]
    sd_result_format: ResultFormat,
    #[serde(default)]
    sd_label_include_pattern: Option<String>,
    #[serde(default)]
    docker_label: Option<DockerLabel>,
    #[serde(default)]
    task_definition_list: Vec<TaskDefinitionRule>,
    #[serde(default)]
    service_name_list_for_tasks: Vec<ServiceNameRule>,
}

/// Docker label names used by label based discovery.
#[derive(Debug, Clone)]
pub struct DockerLabelConfig {
    pub port_label: String,
    pub metrics_path_label: String,
    pub job_name_label: String,
}

/// Scrape settings shared by the task definition and service name rules.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub container_name_pattern: Option<Regex>,
    pub metrics_ports: Vec<u16>,
    pub metrics_path: String,
    pub job_name: String,
}

impl ExporterConfig {
    /// True when no container name pattern is set or the name matches it.
    pub fn matches_container(&self, name: &str) -> bool {
        self.container_name_pattern
            .as_ref()
            .map_or(true, |re| re.is_match(name))
    }
}

#[derive(Debug, Clone)]
pub struct TaskDefinitionConfig {
    pub task_definition_arn_pattern: Regex,
    pub exporter: ExporterConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceNameConfig {
    pub service_name_pattern: Regex,
    pub exporter: ExporterConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceDiscoveryConfig {
    pub frequency: Duration,
    pub target_cluster: String,
    pub result_file: PathBuf,
    pub result_format: ResultFormat,
    pub label_include_pattern: Regex,
    pub docker_label: Option<DockerLabelConfig>,
    pub task_definitions: Vec<TaskDefinitionConfig>,
    pub service_names: Vec<ServiceNameConfig>,
}

pub fn parse(path: impl AsRef<Path>) -> Result<ServiceDiscoveryConfig, ConfigError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let config: Config = serde_yaml::from_reader(reader)?;
    config.compile()
}

pub fn parse_str(document: &str) -> Result<ServiceDiscoveryConfig, ConfigError> {
    let config: Config = serde_yaml::from_str(document)?;
    config.compile()
}

fn compile_pattern(field: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        field,
        pattern: pattern.to_owned(),
        source,
    })
}

fn compile_optional_pattern(
    field: &'static str,
    pattern: &str,
) -> Result<Option<Regex>, ConfigError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    compile_pattern(field, pattern).map(Some)
}

/// Parses a `;` separated port list such as `"9404;9406"`.
fn parse_ports(ports: &str) -> Result<Vec<u16>, ConfigError> {
    ports
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                value: p.to_owned(),
            })
        })
        .collect()
}

fn compile_exporter(
    container_name_pattern: &str,
    metrics_ports: &str,
    metrics_path: &str,
    job_name: &str,
) -> Result<ExporterConfig, ConfigError> {
    Ok(ExporterConfig {
        container_name_pattern: compile_optional_pattern(
            "sd_container_name_pattern",
            container_name_pattern,
        )?,
        metrics_ports: parse_ports(metrics_ports)?,
        metrics_path: metrics_path.to_owned(),
        job_name: job_name.to_owned(),
    })
}

impl Config {
    fn compile(self) -> Result<ServiceDiscoveryConfig, ConfigError> {
        let task_definitions = self
            .task_definition_list
            .iter()
            .map(|rule| -> Result<_, ConfigError> {
                Ok(TaskDefinitionConfig {
                    task_definition_arn_pattern: compile_pattern(
                        "sd_task_definition_arn_pattern",
                        &rule.sd_task_definition_arn_pattern,
                    )?,
                    exporter: compile_exporter(
                        &rule.sd_container_name_pattern,
                        &rule.sd_metrics_ports,
                        &rule.sd_metrics_path,
                        &rule.sd_job_name,
                    )?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let service_names = self
            .service_name_list_for_tasks
            .iter()
            .map(|rule| -> Result<_, ConfigError> {
                Ok(ServiceNameConfig {
                    service_name_pattern: compile_pattern(
                        "sd_service_name_pattern",
                        &rule.sd_service_name_pattern,
                    )?,
                    exporter: compile_exporter(
                        &rule.sd_container_name_pattern,
                        &rule.sd_metrics_ports,
                        &rule.sd_metrics_path,
                        &rule.sd_job_name,
                    )?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let label_include_pattern = compile_pattern(
            "sd_label_include_pattern",
            self.sd_label_include_pattern
                .as_deref()
                .unwrap_or(DEFAULT_LABEL_INCLUDE_PATTERN),
        )?;

        Ok(ServiceDiscoveryConfig {
            frequency: Duration::from_secs(self.sd_frequency.unwrap_or(DEFAULT_FREQUENCY_SECS)),
            target_cluster: self.sd_target_cluster,
            result_file: self.sd_result_file,
            result_format: self.sd_result_format,
            label_include_pattern,
            docker_label: self.docker_label.map(|d| DockerLabelConfig {
                port_label: d.sd_port_label,
                metrics_path_label: d.sd_metrics_path_label,
                job_name_label: d.sd_job_name_label,
            }),
            task_definitions,
            service_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
sd_frequency: 30
sd_target_cluster: production
sd_result_file: /tmp/ecs_sd_targets.yaml
sd_result_format: yaml
docker_label:
  sd_port_label: ECS_PROMETHEUS_EXPORTER_PORT
  sd_job_name_label: ECS_PROMETHEUS_JOB_NAME
task_definition_list:
  - sd_task_definition_arn_pattern: ".*:task-definition/nginx:[0-9]+"
    sd_container_name_pattern: "^nginx$"
    sd_metrics_ports: "9113; 9114;"
    sd_job_name: nginx
service_name_list_for_tasks:
  - sd_service_name_pattern: "^web-.*"
    sd_metrics_ports: "8080"
    sd_metrics_path: /stats
"#;

    #[test]
    fn test_parse_config() {
        let config = parse_str(CONFIG).unwrap();

        assert_eq!(config.frequency, Duration::from_secs(30));
        assert_eq!(config.target_cluster, "production");
        assert_eq!(config.result_format, ResultFormat::Yaml);
        assert_eq!(
            config.label_include_pattern.as_str(),
            DEFAULT_LABEL_INCLUDE_PATTERN
        );

        let docker_label = config.docker_label.unwrap();
        assert_eq!(docker_label.port_label, "ECS_PROMETHEUS_EXPORTER_PORT");
        assert_eq!(docker_label.metrics_path_label, "");
        assert_eq!(docker_label.job_name_label, "ECS_PROMETHEUS_JOB_NAME");

        let task_definition = &config.task_definitions[0];
        assert!(task_definition
            .task_definition_arn_pattern
            .is_match("arn:aws:ecs:us-east-1:123:task-definition/nginx:7"));
        assert_eq!(task_definition.exporter.metrics_ports, vec![9113, 9114]);
        assert!(task_definition.exporter.matches_container("nginx"));
        assert!(!task_definition.exporter.matches_container("sidecar"));

        let service = &config.service_names[0];
        assert!(service.exporter.container_name_pattern.is_none());
        assert!(service.exporter.matches_container("anything"));
        assert_eq!(service.exporter.metrics_path, "/stats");
    }

    #[test]
    fn test_defaults() {
        let config = parse_str("sd_result_file: /tmp/out.json").unwrap();

        assert_eq!(config.frequency, Duration::from_secs(60));
        assert_eq!(config.result_format, ResultFormat::Json);
        assert!(config.docker_label.is_none());
        assert!(config.task_definitions.is_empty());
        assert!(config.service_names.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let err = parse_str(
            r#"
sd_result_file: /tmp/out.json
task_definition_list:
  - sd_task_definition_arn_pattern: "task-definition/(nginx"
    sd_metrics_ports: "9113"
"#,
        )
        .unwrap_err();

        match err {
            ConfigError::InvalidPattern { field, pattern, .. } => {
                assert_eq!(field, "sd_task_definition_arn_pattern");
                assert_eq!(pattern, "task-definition/(nginx");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_port_is_fatal() {
        let err = parse_str(
            r#"
sd_result_file: /tmp/out.json
service_name_list_for_tasks:
  - sd_service_name_pattern: "web"
    sd_metrics_ports: "8080;http"
"#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidPort { value } if value == "http"));
    }
}
