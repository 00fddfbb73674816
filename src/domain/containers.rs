//! Container image extraction for workload resources
//!
//! - Kubernetes workloads: `container` and `init_container` blocks anywhere under `spec`
//! - `azurerm_container_group`: top-level `container` blocks
//! - `aws_ecs_task_definition`: `container_definitions` as a JSON string, or
//!   a `file("...")` call naming a JSON file next to the resource

use std::fs;
use std::path::Path;

use serde_json::Value;

use super::resource::ContainerImage;

const KUBERNETES_WORKLOADS: [&str; 7] = [
    "kubernetes_pod",
    "kubernetes_deployment",
    "kubernetes_stateful_set",
    "kubernetes_job",
    "kubernetes_cron_job",
    "kubernetes_daemonset",
    "kubernetes_replication_controller",
];

const AZURE_CONTAINER_GROUP: &str = "azurerm_container_group";
const AWS_TASK_DEFINITION: &str = "aws_ecs_task_definition";
const FILE_CALL_PREFIX: &str = "${file(\"";
const FILE_CALL_SUFFIX: &str = "\")}";

/// Whether resources of `kind` can declare containers
pub fn has_containers(kind: &str) -> bool {
    KUBERNETES_WORKLOADS.contains(&kind) || kind == AZURE_CONTAINER_GROUP || kind == AWS_TASK_DEFINITION
}

/// `(containers, init containers)` declared by a resource
pub fn extract(kind: &str, config: &Value, resource_file: &Path) -> (Vec<ContainerImage>, Vec<ContainerImage>) {
    if KUBERNETES_WORKLOADS.contains(&kind) {
        let mut containers = Vec::new();
        let mut init = Vec::new();
        if let Some(spec) = config.get("spec") {
            collect_kubernetes(spec, &mut containers, &mut init);
        }
        return (containers, init);
    }

    match kind {
        AZURE_CONTAINER_GROUP => (
            config.get("container").map(containers_of).unwrap_or_default(),
            Vec::new(),
        ),
        AWS_TASK_DEFINITION => (ecs_containers(config, resource_file), Vec::new()),
        _ => (Vec::new(), Vec::new()),
    }
}

fn collect_kubernetes(value: &Value, containers: &mut Vec<ContainerImage>, init: &mut Vec<ContainerImage>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_kubernetes(item, containers, init);
            }
        }
        Value::Object(fields) => {
            for (key, child) in fields {
                match key.as_str() {
                    "container" => containers.extend(containers_of(child)),
                    "init_container" => init.extend(containers_of(child)),
                    _ => collect_kubernetes(child, containers, init),
                }
            }
        }
        _ => {}
    }
}

fn containers_of(value: &Value) -> Vec<ContainerImage> {
    let items: &[Value] = match value {
        Value::Array(items) => items,
        single @ Value::Object(_) => std::slice::from_ref(single),
        _ => return Vec::new(),
    };
    items.iter().filter_map(container_of).collect()
}

fn container_of(value: &Value) -> Option<ContainerImage> {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let container = ContainerImage {
        name: field("name"),
        image: field("image"),
    };
    (!container.name.is_empty() || !container.image.is_empty()).then_some(container)
}

fn ecs_containers(config: &Value, resource_file: &Path) -> Vec<ContainerImage> {
    let Some(definitions) = config.get("container_definitions").and_then(Value::as_str) else {
        return Vec::new();
    };
    let definitions = definitions.trim();

    let json = if let Some(location) = definitions
        .strip_prefix(FILE_CALL_PREFIX)
        .and_then(|rest| rest.strip_suffix(FILE_CALL_SUFFIX))
    {
        let path = resource_file
            .parent()
            .map_or_else(|| Path::new(location).to_path_buf(), |dir| dir.join(location));
        match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read container definitions");
                return Vec::new();
            }
        }
    } else if definitions.starts_with("${") {
        tracing::debug!("container definitions are not a literal, skipping");
        return Vec::new();
    } else {
        definitions.to_string()
    };

    match serde_json::from_str::<Value>(&json) {
        Ok(parsed) => containers_of(&parsed),
        Err(e) => {
            tracing::warn!(error = %e, "container definitions are not valid JSON");
            Vec::new()
        }
    }
}
