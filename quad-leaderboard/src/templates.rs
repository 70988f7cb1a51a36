//! Challenge templates shipped as JSON next to the service.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::Cadence;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub points: i32,
}

/// Both template lists, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    pub daily: Vec<TaskTemplate>,
    pub weekly: Vec<TaskTemplate>,
}

impl TaskCatalog {
    pub fn load(daily_path: impl AsRef<Path>, weekly_path: impl AsRef<Path>) -> Self {
        let catalog = Self {
            daily: load_templates(daily_path.as_ref()),
            weekly: load_templates(weekly_path.as_ref()),
        };
        tracing::info!(daily = catalog.daily.len(), weekly = catalog.weekly.len(), "task templates loaded");
        catalog
    }

    pub fn for_cadence(&self, cadence: Cadence) -> &[TaskTemplate] {
        match cadence {
            Cadence::Daily => &self.daily,
            Cadence::Weekly => &self.weekly,
        }
    }
}

/// A missing or malformed file leaves the list empty.
pub fn load_templates(path: &Path) -> Vec<TaskTemplate> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "task template file unreadable");
            return Vec::new();
        }
    };
    parse_templates(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "task template file malformed");
        Vec::new()
    })
}

fn parse_templates(raw: &str) -> serde_json::Result<Vec<TaskTemplate>> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_zero_and_empty() {
        let templates = parse_templates(r#"[{"title": "Stairs"}]"#).unwrap();
        assert_eq!(
            templates,
            vec![TaskTemplate { title: "Stairs".into(), content: String::new(), points: 0 }]
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_templates("{not json").is_err());
    }

    #[test]
    fn missing_file_yields_empty_list() {
        assert!(load_templates(Path::new("/definitely/not/here.json")).is_empty());
    }

    #[test]
    fn bundled_templates_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tasks");
        let catalog = TaskCatalog::load(dir.join("daily_tasks.json"), dir.join("weekly_tasks.json"));
        assert!(!catalog.daily.is_empty());
        assert_eq!(catalog.for_cadence(Cadence::Weekly)[0].points, 30);
        assert_eq!(catalog.for_cadence(Cadence::Daily)[0].points, 5);
    }
}
