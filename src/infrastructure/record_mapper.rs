use crate::domain::models::{Project, ProjectSource, Record, RecordKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

// The backend has shipped records under both snake_case and camelCase
// field names; everything is normalized here, at the ingestion boundary,
// so nothing deeper in the pipeline branches on field-name variants.

const TITLE_FIELDS: &[&str] = &["title", "name"];
const DUE_FIELDS: &[&str] = &["due_date", "dueDate", "due_at", "dueAt"];
const COMPLETED_FIELDS: &[&str] = &["is_submitted", "isSubmitted", "completed"];
const PROJECT_FIELDS: &[&str] = &["project_id", "projectId"];
const TASK_FIELDS: &[&str] = &["task_id", "taskId"];
const COURSE_CODE_FIELDS: &[&str] = &["course_code", "courseCode"];
const COLOR_FIELDS: &[&str] = &["color_hex", "colorHex"];

/// Normalizes one raw wire object into the canonical record shape.
/// Returns `None` when the object has no usable id.
pub fn normalize_record(raw: &Value, kind: RecordKind) -> Option<Record> {
    let id = string_field(raw, &["id"])?;
    let title = string_field(raw, TITLE_FIELDS).unwrap_or_else(|| default_title(kind).to_string());
    let due_at = string_field(raw, DUE_FIELDS).and_then(|value| parse_due_instant(&value));

    Some(Record {
        id,
        title,
        kind,
        due_at,
        completed: bool_field(raw, COMPLETED_FIELDS).unwrap_or(false),
        parent_project_id: string_field(raw, PROJECT_FIELDS),
        parent_task_id: match kind {
            RecordKind::Todo => string_field(raw, TASK_FIELDS),
            RecordKind::Task => None,
        },
        display_color: None,
    })
}

pub fn normalize_project(raw: &Value) -> Option<Project> {
    let id = string_field(raw, &["id"])?;
    let title = string_field(raw, TITLE_FIELDS).unwrap_or_else(|| "General".to_string());
    let source = match string_field(raw, &["source"]) {
        Some(value) if value.eq_ignore_ascii_case("canvas") => ProjectSource::External,
        Some(value) if value.eq_ignore_ascii_case("external") => ProjectSource::External,
        _ => ProjectSource::Personal,
    };

    Some(Project {
        id,
        title,
        course_code: string_field(raw, COURSE_CODE_FIELDS),
        color_hex: string_field(raw, COLOR_FIELDS),
        source,
    })
}

fn default_title(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Task => "Untitled Task",
        RecordKind::Todo => "Untitled Todo",
    }
}

fn string_field(raw: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        raw.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    })
}

fn bool_field(raw: &Value, names: &[&str]) -> Option<bool> {
    names.iter().find_map(|name| raw.get(name).and_then(Value::as_bool))
}

/// Due times arrive as RFC 3339 instants, occasionally as bare datetimes or
/// dates (treated as UTC). Anything unparseable is dropped rather than
/// guessed at.
fn parse_due_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed.and_hms_opt(0, 0, 0).map(|value| value.and_utc());
    }
    log::warn!("dropping unparseable due time '{raw}'");
    None
}
