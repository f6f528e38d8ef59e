use crate::domain::models::{Project, Record, RecordKind};
use crate::infrastructure::error::SyncError;
use crate::infrastructure::gateway::PlannerApi;
use crate::infrastructure::record_cache::RecordCache;
use crate::infrastructure::record_mapper::{normalize_project, normalize_record};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub projects: usize,
    pub tasks: usize,
    pub todos: usize,
}

/// Populates the persistent cache from a bulk remote fetch with
/// replace-all-of-kind semantics. A failed fetch leaves the cache in its
/// last-known-good state so the view degrades to stale data, not to empty.
pub struct BulkLoader<A, C>
where
    A: PlannerApi,
    C: RecordCache,
{
    api: Arc<A>,
    cache: Arc<C>,
}

impl<A, C> BulkLoader<A, C>
where
    A: PlannerApi,
    C: RecordCache,
{
    pub fn new(api: Arc<A>, cache: Arc<C>) -> Self {
        Self { api, cache }
    }

    pub async fn refresh(&self) -> Result<LoadSummary, SyncError> {
        let data = self.api.fetch_all_user_data().await?;

        let projects: Vec<Project> = data
            .projects
            .iter()
            .filter_map(normalize_project)
            .collect();
        let mut tasks: Vec<Record> = data
            .tasks
            .iter()
            .filter_map(|raw| normalize_record(raw, RecordKind::Task))
            .collect();
        let mut todos: Vec<Record> = data
            .todos
            .iter()
            .filter_map(|raw| normalize_record(raw, RecordKind::Todo))
            .collect();

        let dropped = data.projects.len() + data.tasks.len() + data.todos.len()
            - projects.len()
            - tasks.len()
            - todos.len();
        if dropped > 0 {
            log::warn!("dropped {dropped} malformed objects during bulk ingestion");
        }

        resolve_display_fields(&projects, &mut tasks, &mut todos);

        self.cache.init()?;
        self.cache.replace_projects(&projects)?;
        self.cache.replace_all(RecordKind::Task, &tasks)?;
        self.cache.replace_all(RecordKind::Todo, &todos)?;

        Ok(LoadSummary {
            projects: projects.len(),
            tasks: tasks.len(),
            todos: todos.len(),
        })
    }
}

/// Resolves the display color on every record and the project parent on
/// todos (a todo reaches its project through its task). Done once here, at
/// the ingestion boundary, so downstream code never walks relations.
fn resolve_display_fields(projects: &[Project], tasks: &mut [Record], todos: &mut [Record]) {
    let color_by_project: HashMap<&str, Option<&str>> = projects
        .iter()
        .map(|project| (project.id.as_str(), project.color_hex.as_deref()))
        .collect();
    let project_by_task: HashMap<String, Option<String>> = tasks
        .iter()
        .map(|task| (task.id.clone(), task.parent_project_id.clone()))
        .collect();

    for task in tasks.iter_mut() {
        task.display_color = task
            .parent_project_id
            .as_deref()
            .and_then(|project_id| color_by_project.get(project_id).copied())
            .flatten()
            .map(ToOwned::to_owned);
    }

    for todo in todos.iter_mut() {
        if todo.parent_project_id.is_none() {
            todo.parent_project_id = todo
                .parent_task_id
                .as_deref()
                .and_then(|task_id| project_by_task.get(task_id).cloned())
                .flatten();
        }
        todo.display_color = todo
            .parent_project_id
            .as_deref()
            .and_then(|project_id| color_by_project.get(project_id).copied())
            .flatten()
            .map(ToOwned::to_owned);
    }
}
