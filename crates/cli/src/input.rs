//! Task and proposal files accepted by the CLI.
//!
//! Files are TOML when the extension is `.toml` and JSON otherwise. A JSON
//! file may be a bare array or an object with a `tasks` / `proposals` key.

use std::path::Path;

use anyhow::{Context, Result};
use archon_core::{Proposal, Task};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    List(Vec<Task>),
    Table { tasks: Vec<Task> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProposalFile {
    List(Vec<Proposal>),
    Table { proposals: Vec<Proposal> },
}

/// Load tasks from a JSON or TOML file.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let file: TaskFile = load(path)?;
    Ok(match file {
        TaskFile::List(tasks) | TaskFile::Table { tasks } => tasks,
    })
}

/// Load proposals from a JSON or TOML file.
pub fn load_proposals(path: &Path) -> Result<Vec<Proposal>> {
    let file: ProposalFile = load(path)?;
    Ok(match file {
        ProposalFile::List(proposals) | ProposalFile::Table { proposals } => proposals,
    })
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(&raw, is_toml(path)).with_context(|| format!("failed to parse {}", path.display()))
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn parse<T: DeserializeOwned>(raw: &str, toml: bool) -> Result<T> {
    if toml {
        Ok(toml::from_str(raw)?)
    } else {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::TaskCategory;

    #[test]
    fn test_tasks_from_toml() {
        let raw = r#"
            [[tasks]]
            id = "schema"
            description = "Design the database schema"
            category = "database"
            context = { estimated_hours = 2.0 }

            [[tasks]]
            id = "api"
            description = "Implement the REST API"
            dependencies = ["schema"]
        "#;
        let file: TaskFile = parse(raw, true).unwrap();
        let TaskFile::Table { tasks } = file else {
            panic!("expected a table");
        };
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].category, TaskCategory::Database);
        assert_eq!(tasks[0].context.estimated_hours, Some(2.0));
        assert_eq!(tasks[1].dependencies[0].as_str(), "schema");
    }

    #[test]
    fn test_tasks_from_json_array() {
        let raw = r#"[{"id": "a", "description": "first"}, {"id": "b", "description": "second", "dependencies": ["a"]}]"#;
        let file: TaskFile = parse(raw, false).unwrap();
        assert!(matches!(file, TaskFile::List(ref tasks) if tasks.len() == 2));
    }

    #[test]
    fn test_proposals_from_json_object() {
        let raw = r#"{"proposals": [
            {"proposer": "claude-3-opus", "summary": "split the service", "risk": 0.3, "complexity": 0.6, "estimated_hours": 8.0}
        ]}"#;
        let file: ProposalFile = parse(raw, false).unwrap();
        let ProposalFile::Table { proposals } = file else {
            panic!("expected an object");
        };
        assert_eq!(proposals[0].proposer.as_str(), "claude-3-opus");
        assert!(proposals[0].reasoning.is_empty());
    }

    #[test]
    fn test_extension_selects_format() {
        assert!(is_toml(Path::new("plan.TOML")));
        assert!(!is_toml(Path::new("plan.json")));
        assert!(!is_toml(Path::new("plan")));
    }
}
