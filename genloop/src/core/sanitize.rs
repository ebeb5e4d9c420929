//! Filesystem-safe project name tokens.

/// Used when a name has no safe characters left after cleaning.
pub const FALLBACK_PROJECT_NAME: &str = "generated-project";

/// Lowercase the name and keep only ASCII alphanumerics, `-` and `_`.
///
/// Never returns an empty string.
pub fn clean_project_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        FALLBACK_PROJECT_NAME.to_string()
    } else {
        cleaned
    }
}

/// Directory name of the canonical source tree for a project.
pub fn source_dir_name(project_name: &str) -> String {
    format!("project-{}", clean_project_name(project_name))
}
