use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Task,
    Todo,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Todo => "todo",
        }
    }
}

/// A time-boxed work item mirrored from the remote authority. Tasks and
/// todos share this shape; `kind` is immutable after creation and todos
/// additionally carry the task they belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub kind: RecordKind,
    pub due_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub parent_project_id: Option<String>,
    pub parent_task_id: Option<String>,
    pub display_color: Option<String>,
}

impl Record {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "record.id")?;
        validate_non_empty(&self.title, "record.title")?;
        if self.kind == RecordKind::Task && self.parent_task_id.is_some() {
            return Err("record.parent_task_id is only valid for todos".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectSource {
    Personal,
    External,
}

impl ProjectSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::External => "external",
        }
    }
}

/// Read-only grouping for records; used to resolve a display label and
/// color, never mutated by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub course_code: Option<String>,
    pub color_hex: Option<String>,
    pub source: ProjectSource,
}

impl Project {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "project.id")?;
        validate_non_empty(&self.title, "project.title")?;
        Ok(())
    }

    /// Course code wins over the title for externally-sourced projects.
    pub fn display_label(&self) -> &str {
        if self.source == ProjectSource::External {
            if let Some(course_code) = self
                .course_code
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                return course_code;
            }
        }
        &self.title
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
