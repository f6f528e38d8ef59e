use crate::domain::models::{Project, ProjectSource, Record, RecordKind};
use crate::infrastructure::error::CacheError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Durable, keyed-by-id mirror of project/task/todo records. Reads are
/// point-in-time snapshots; there is no change feed, callers re-read after
/// a known mutation. Writes are last-write-wins per key.
pub trait RecordCache: Send + Sync {
    fn init(&self) -> Result<(), CacheError>;
    fn get_all(&self, kind: RecordKind) -> Result<Vec<Record>, CacheError>;
    fn get_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, CacheError>;
    fn upsert(&self, kind: RecordKind, record: &Record) -> Result<(), CacheError>;
    fn replace_all(&self, kind: RecordKind, records: &[Record]) -> Result<(), CacheError>;
    fn projects(&self) -> Result<Vec<Project>, CacheError>;
    fn replace_projects(&self, projects: &[Project]) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
pub struct SqliteRecordCache {
    db_path: PathBuf,
}

impl SqliteRecordCache {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CacheError> {
        Connection::open(&self.db_path).map_err(CacheError::from)
    }

    fn table(kind: RecordKind) -> &'static str {
        match kind {
            RecordKind::Task => "tasks",
            RecordKind::Todo => "todos",
        }
    }

    fn record_from_row(kind: RecordKind, row: &Row<'_>) -> Result<Record, rusqlite::Error> {
        let due_at_raw: Option<String> = row.get("due_at")?;
        let due_at = match due_at_raw {
            Some(raw) => Some(parse_stored_instant(&raw).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error)),
                )
            })?),
            None => None,
        };

        let parent_task_id = match kind {
            RecordKind::Todo => row.get("task_id")?,
            RecordKind::Task => None,
        };

        Ok(Record {
            id: row.get("id")?,
            title: row.get("title")?,
            kind,
            due_at,
            completed: row.get::<_, i64>("completed")? != 0,
            parent_project_id: row.get("project_id")?,
            parent_task_id,
            display_color: row.get("display_color")?,
        })
    }

    fn insert_record(
        connection: &Connection,
        kind: RecordKind,
        record: &Record,
    ) -> Result<(), CacheError> {
        let due_at = record.due_at.map(|value| value.to_rfc3339());
        match kind {
            RecordKind::Task => {
                connection.execute(
                    "INSERT INTO tasks (id, title, due_at, completed, project_id, display_color)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                       title = excluded.title,
                       due_at = excluded.due_at,
                       completed = excluded.completed,
                       project_id = excluded.project_id,
                       display_color = excluded.display_color",
                    params![
                        record.id,
                        record.title,
                        due_at,
                        record.completed as i64,
                        record.parent_project_id,
                        record.display_color,
                    ],
                )?;
            }
            RecordKind::Todo => {
                connection.execute(
                    "INSERT INTO todos (id, title, due_at, completed, project_id, task_id, display_color)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       title = excluded.title,
                       due_at = excluded.due_at,
                       completed = excluded.completed,
                       project_id = excluded.project_id,
                       task_id = excluded.task_id,
                       display_color = excluded.display_color",
                    params![
                        record.id,
                        record.title,
                        due_at,
                        record.completed as i64,
                        record.parent_project_id,
                        record.parent_task_id,
                        record.display_color,
                    ],
                )?;
            }
        }
        Ok(())
    }
}

fn parse_stored_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| format!("invalid stored due_at '{raw}': {error}"))
}

fn parse_stored_source(raw: &str) -> ProjectSource {
    if raw.eq_ignore_ascii_case("external") {
        ProjectSource::External
    } else {
        ProjectSource::Personal
    }
}

impl RecordCache for SqliteRecordCache {
    fn init(&self) -> Result<(), CacheError> {
        // CREATE TABLE IF NOT EXISTS throughout, so concurrent init calls
        // cannot duplicate schema objects.
        let connection = self.connect()?;
        connection.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn get_all(&self, kind: RecordKind) -> Result<Vec<Record>, CacheError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT * FROM {} ORDER BY due_at IS NULL, due_at, id",
            Self::table(kind)
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map([], |row| Self::record_from_row(kind, row))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn get_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, CacheError> {
        let connection = self.connect()?;
        let sql = format!("SELECT * FROM {} WHERE id = ?1", Self::table(kind));
        let record = connection
            .query_row(&sql, params![id], |row| Self::record_from_row(kind, row))
            .optional()?;
        Ok(record)
    }

    fn upsert(&self, kind: RecordKind, record: &Record) -> Result<(), CacheError> {
        let connection = self.connect()?;
        Self::insert_record(&connection, kind, record)
    }

    fn replace_all(&self, kind: RecordKind, records: &[Record]) -> Result<(), CacheError> {
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;
        tx.execute(&format!("DELETE FROM {}", Self::table(kind)), [])?;
        for record in records {
            Self::insert_record(&tx, kind, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn projects(&self) -> Result<Vec<Project>, CacheError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT id, title, course_code, color_hex, source FROM projects ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok(Project {
                id: row.get(0)?,
                title: row.get(1)?,
                course_code: row.get(2)?,
                color_hex: row.get(3)?,
                source: parse_stored_source(&row.get::<_, String>(4)?),
            })
        })?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    fn replace_projects(&self, projects: &[Project]) -> Result<(), CacheError> {
        let mut connection = self.connect()?;
        let tx = connection.transaction()?;
        tx.execute("DELETE FROM projects", [])?;
        for project in projects {
            tx.execute(
                "INSERT INTO projects (id, title, course_code, color_hex, source)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   title = excluded.title,
                   course_code = excluded.course_code,
                   color_hex = excluded.color_hex,
                   source = excluded.source",
                params![
                    project.id,
                    project.title,
                    project.course_code,
                    project.color_hex,
                    project.source.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRecordCache {
    records: Mutex<HashMap<(RecordKind, String), Record>>,
    projects: Mutex<Vec<Project>>,
}

impl InMemoryRecordCache {
    fn lock_records(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(RecordKind, String), Record>>, CacheError> {
        self.records
            .lock()
            .map_err(|error| CacheError::Unavailable(format!("record cache lock poisoned: {error}")))
    }
}

impl RecordCache for InMemoryRecordCache {
    fn init(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get_all(&self, kind: RecordKind) -> Result<Vec<Record>, CacheError> {
        let records = self.lock_records()?;
        let mut matching: Vec<Record> = records
            .iter()
            .filter(|((record_kind, _), _)| *record_kind == kind)
            .map(|(_, record)| record.clone())
            .collect();
        // Same ordering as the sqlite store: undated records last.
        matching.sort_by(|a, b| {
            a.due_at
                .is_none()
                .cmp(&b.due_at.is_none())
                .then(a.due_at.cmp(&b.due_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matching)
    }

    fn get_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, CacheError> {
        let records = self.lock_records()?;
        Ok(records.get(&(kind, id.to_string())).cloned())
    }

    fn upsert(&self, kind: RecordKind, record: &Record) -> Result<(), CacheError> {
        let mut records = self.lock_records()?;
        records.insert((kind, record.id.clone()), record.clone());
        Ok(())
    }

    fn replace_all(&self, kind: RecordKind, records: &[Record]) -> Result<(), CacheError> {
        let mut guard = self.lock_records()?;
        guard.retain(|(record_kind, _), _| *record_kind != kind);
        for record in records {
            guard.insert((kind, record.id.clone()), record.clone());
        }
        Ok(())
    }

    fn projects(&self) -> Result<Vec<Project>, CacheError> {
        let projects = self
            .projects
            .lock()
            .map_err(|error| CacheError::Unavailable(format!("project cache lock poisoned: {error}")))?;
        Ok(projects.clone())
    }

    fn replace_projects(&self, projects: &[Project]) -> Result<(), CacheError> {
        let mut guard = self
            .projects
            .lock()
            .map_err(|error| CacheError::Unavailable(format!("project cache lock poisoned: {error}")))?;
        *guard = projects.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_record(id: &str, kind: RecordKind) -> Record {
        Record {
            id: id.to_string(),
            title: format!("item {id}"),
            kind,
            due_at: Some(fixed_time("2026-08-07T09:00:00Z")),
            completed: false,
            parent_project_id: Some("prj-1".to_string()),
            parent_task_id: match kind {
                RecordKind::Todo => Some("tsk-1".to_string()),
                RecordKind::Task => None,
            },
            display_color: Some("#22c55e".to_string()),
        }
    }

    fn sample_project() -> Project {
        Project {
            id: "prj-1".to_string(),
            title: "Databases".to_string(),
            course_code: Some("COS 221".to_string()),
            color_hex: Some("#22c55e".to_string()),
            source: ProjectSource::External,
        }
    }

    fn sqlite_cache() -> (tempfile::TempDir, SqliteRecordCache) {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = SqliteRecordCache::new(dir.path().join("daybook.sqlite"));
        cache.init().expect("init cache");
        (dir, cache)
    }

    #[test]
    fn init_is_idempotent() {
        let (_dir, cache) = sqlite_cache();
        cache.init().expect("second init");
        cache.init().expect("third init");
    }

    #[test]
    fn upsert_is_idempotent_and_last_write_wins() {
        let (_dir, cache) = sqlite_cache();
        let mut record = sample_record("tsk-1", RecordKind::Task);

        cache.upsert(RecordKind::Task, &record).expect("first upsert");
        cache.upsert(RecordKind::Task, &record).expect("second upsert");
        record.completed = true;
        cache.upsert(RecordKind::Task, &record).expect("third upsert");

        let all = cache.get_all(RecordKind::Task).expect("get all");
        assert_eq!(all.len(), 1);
        assert!(all[0].completed);
    }

    #[test]
    fn records_survive_reopening_the_store() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("daybook.sqlite");

        {
            let cache = SqliteRecordCache::new(&path);
            cache.init().expect("init cache");
            cache
                .upsert(RecordKind::Todo, &sample_record("tdo-1", RecordKind::Todo))
                .expect("upsert");
        }

        let reopened = SqliteRecordCache::new(&path);
        reopened.init().expect("re-init");
        let fetched = reopened
            .get_by_id(RecordKind::Todo, "tdo-1")
            .expect("get by id")
            .expect("record present");
        assert_eq!(fetched, sample_record("tdo-1", RecordKind::Todo));
    }

    #[test]
    fn kinds_do_not_collide_on_shared_ids() {
        let (_dir, cache) = sqlite_cache();
        cache
            .upsert(RecordKind::Task, &sample_record("shared", RecordKind::Task))
            .expect("task upsert");
        cache
            .upsert(RecordKind::Todo, &sample_record("shared", RecordKind::Todo))
            .expect("todo upsert");

        assert_eq!(cache.get_all(RecordKind::Task).expect("tasks").len(), 1);
        assert_eq!(cache.get_all(RecordKind::Todo).expect("todos").len(), 1);
        let todo = cache
            .get_by_id(RecordKind::Todo, "shared")
            .expect("get todo")
            .expect("todo present");
        assert_eq!(todo.parent_task_id.as_deref(), Some("tsk-1"));
    }

    #[test]
    fn replace_all_has_replace_semantics_not_merge() {
        let (_dir, cache) = sqlite_cache();
        cache
            .upsert(RecordKind::Task, &sample_record("old", RecordKind::Task))
            .expect("seed");

        let fresh = vec![
            sample_record("new-1", RecordKind::Task),
            sample_record("new-2", RecordKind::Task),
        ];
        cache.replace_all(RecordKind::Task, &fresh).expect("replace");

        let ids: Vec<String> = cache
            .get_all(RecordKind::Task)
            .expect("get all")
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(ids, vec!["new-1".to_string(), "new-2".to_string()]);
    }

    #[test]
    fn projects_roundtrip_through_sqlite() {
        let (_dir, cache) = sqlite_cache();
        cache.replace_projects(&[sample_project()]).expect("replace projects");
        let projects = cache.projects().expect("projects");
        assert_eq!(projects, vec![sample_project()]);
    }

    #[test]
    fn in_memory_cache_matches_trait_contract() {
        let cache = InMemoryRecordCache::default();
        cache.init().expect("init");

        let record = sample_record("tsk-1", RecordKind::Task);
        cache.upsert(RecordKind::Task, &record).expect("upsert");
        cache.upsert(RecordKind::Task, &record).expect("upsert again");
        assert_eq!(cache.get_all(RecordKind::Task).expect("all").len(), 1);

        cache.replace_all(RecordKind::Task, &[]).expect("clear");
        assert!(cache.get_all(RecordKind::Task).expect("all").is_empty());
        assert!(cache
            .get_by_id(RecordKind::Task, "tsk-1")
            .expect("get")
            .is_none());
    }
}
