//! Tolerant reading of the free-form requirements document.
//!
//! Requirements arrive as arbitrary JSON. Every lookup here tolerates absent
//! or mistyped keys and reads them as "no integration needed".

use serde::Serialize;
use serde_json::Value;

/// Facts about a project derived from its requirements.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectProfile {
    pub project_type: String,
    pub has_backend: bool,
    pub has_frontend: bool,
    pub backend_tech: Option<String>,
    pub frontend_tech: Option<String>,
    pub database_tech: String,
    pub auth_providers: Vec<String>,
    pub database_types: Vec<String>,
    pub backend_services: Vec<String>,
    pub deployment_targets: Vec<String>,
}

impl ProjectProfile {
    pub fn from_requirements(requirements: &Value) -> Self {
        let text = requirements_text(requirements);
        let tech_stack = requirements.get("tech_stack");
        let project_type = requirements
            .get("project")
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("fullstack")
            .to_string();

        let backend_label = truthy_label(tech_stack.and_then(|t| t.get("backend")));
        let has_backend = backend_label.is_some()
            || matches!(project_type.as_str(), "backend" | "fullstack")
            || text.contains("backend");
        let backend_tech = has_backend.then(|| backend_label.unwrap_or_else(|| detect_backend(&text)));

        let frontend_label = truthy_label(tech_stack.and_then(|t| t.get("frontend")));
        let has_frontend = frontend_label.is_some()
            || matches!(project_type.as_str(), "frontend" | "fullstack")
            || text.contains("frontend");
        let frontend_tech =
            has_frontend.then(|| frontend_label.unwrap_or_else(|| detect_frontend(&text)));

        let database_tech = truthy_label(tech_stack.and_then(|t| t.get("database")))
            .unwrap_or_else(|| detect_database(&text));

        let features = requirements
            .get("features")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let auth_providers = features
            .iter()
            .filter_map(|f| f.get("authentication")?.get("providers")?.as_array())
            .flatten()
            .filter_map(|p| truthy_label(Some(p)))
            .collect();
        let database_types = features
            .iter()
            .filter_map(|f| f.get("database")?.get("type"))
            .filter_map(|t| truthy_label(Some(t)))
            .collect();

        let backend_services = requirements
            .get("backend")
            .and_then(|b| b.get("services"))
            .and_then(Value::as_array)
            .map(|services| {
                services
                    .iter()
                    .filter_map(|s| match s {
                        Value::Object(map) => truthy_label(map.get("name")),
                        other => truthy_label(Some(other)),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let deployment_targets = match requirements.get("deployment") {
            Some(Value::Object(map)) => map
                .iter()
                .filter(|(_, v)| is_truthy(v))
                .map(|(k, _)| k.clone())
                .collect(),
            other => truthy_label(other).into_iter().collect(),
        };

        Self {
            project_type,
            has_backend,
            has_frontend,
            backend_tech,
            frontend_tech,
            database_tech,
            auth_providers,
            database_types,
            backend_services,
            deployment_targets,
        }
    }
}

/// Lowercased serialized form, used for keyword lookups.
pub fn requirements_text(requirements: &Value) -> String {
    requirements.to_string().to_lowercase()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn truthy_label(value: Option<&Value>) -> Option<String> {
    let value = value.filter(|v| is_truthy(v))?;
    Some(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn detect_backend(text: &str) -> String {
    let label = if text.contains("fastapi") {
        "FastAPI"
    } else if text.contains("django") {
        "Django"
    } else if text.contains("flask") {
        "Flask"
    } else if text.contains("express") || text.contains("node") {
        "Node.js/Express"
    } else if text.contains("python") {
        "Python"
    } else {
        "Python/FastAPI"
    };
    label.to_string()
}

fn detect_frontend(text: &str) -> String {
    let label = if text.contains("react") {
        "React"
    } else if text.contains("vue") {
        "Vue.js"
    } else if text.contains("angular") {
        "Angular"
    } else if text.contains("next") {
        "Next.js"
    } else if text.contains("svelte") {
        "Svelte"
    } else {
        "React"
    };
    label.to_string()
}

fn detect_database(text: &str) -> String {
    let label = if text.contains("postgres") {
        "PostgreSQL"
    } else if text.contains("mysql") {
        "MySQL"
    } else if text.contains("mongo") {
        "MongoDB"
    } else if text.contains("sqlite") {
        "SQLite"
    } else {
        "PostgreSQL"
    };
    label.to_string()
}
