use crate::domain::models::{Record, RecordKind};
use crate::domain::projection::{project, Projection};
use crate::infrastructure::error::SyncError;
use crate::infrastructure::gateway::PlannerApi;
use crate::infrastructure::record_cache::RecordCache;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(100);

/// Orchestrates optimistic completion toggles across the in-memory view,
/// the persistent cache and the remote authority. The view mirrors what an
/// interactive surface shows; it is refreshed from the cache after every
/// confirmed mutation.
pub struct SyncCoordinator<A, C>
where
    A: PlannerApi,
    C: RecordCache + 'static,
{
    api: Arc<A>,
    cache: Arc<C>,
    view: Arc<Mutex<Vec<Record>>>,
    generations: Arc<Mutex<HashMap<String, u64>>>,
    reconcile_delay: Duration,
}

impl<A, C> SyncCoordinator<A, C>
where
    A: PlannerApi,
    C: RecordCache + 'static,
{
    pub fn new(api: Arc<A>, cache: Arc<C>) -> Self {
        Self {
            api,
            cache,
            view: Arc::new(Mutex::new(Vec::new())),
            generations: Arc::new(Mutex::new(HashMap::new())),
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
        }
    }

    pub fn with_reconcile_delay(mut self, reconcile_delay: Duration) -> Self {
        self.reconcile_delay = reconcile_delay;
        self
    }

    pub fn view_snapshot(&self) -> Result<Vec<Record>, SyncError> {
        Ok(self.lock_view()?.clone())
    }

    /// Rebuilds the in-memory view from the cache snapshot.
    pub fn reload_from_cache(&self) -> Result<(), SyncError> {
        reload_view(self.cache.as_ref(), &self.view)
    }

    /// Derived agenda for the current view state.
    pub fn project_view(&self, today: NaiveDate, tz: Tz) -> Result<Projection, SyncError> {
        let snapshot = self.view_snapshot()?;
        Ok(project(&snapshot, today, tz))
    }

    /// Flips a record's completion state: view first, cache second, remote
    /// last. Remote failure rolls both local copies back before the error
    /// is returned, so callers never observe a half-applied toggle.
    pub async fn toggle_completion(&self, id: &str, kind: RecordKind) -> Result<(), SyncError> {
        let current = {
            let view = self.lock_view()?;
            view.iter()
                .find(|record| record.kind == kind && record.id == id)
                .cloned()
                .ok_or_else(|| SyncError::NotFound { id: id.to_string() })?
        };
        let was_completed = current.completed;
        let target = !was_completed;
        let generation = self.next_generation(id)?;

        self.apply_to_view(kind, id, target)?;
        if let Err(error) = self.apply_to_cache(kind, id, target, &current) {
            self.apply_to_view(kind, id, was_completed)?;
            return Err(error);
        }

        let remote = if target {
            match kind {
                RecordKind::Task => self.api.complete_task(id).await,
                RecordKind::Todo => self.api.complete_todo(id).await,
            }
        } else {
            let patch = json!({ "is_submitted": false });
            match kind {
                RecordKind::Task => self.api.update_task(id, patch).await,
                RecordKind::Todo => self.api.update_todos(&[id.to_string()], patch).await,
            }
        };

        match remote {
            Ok(_) => {
                self.schedule_reconcile(id.to_string(), generation);
                Ok(())
            }
            Err(error) => {
                if let Err(revert_error) = self.apply_to_cache(kind, id, was_completed, &current) {
                    log::warn!("cache revert after failed toggle of {id} also failed: {revert_error}");
                }
                self.apply_to_view(kind, id, was_completed)?;
                Err(SyncError::Gateway(error))
            }
        }
    }

    /// Reloads the view from the cache after a short delay, absorbing any
    /// server-computed fields without racing the optimistic write that was
    /// just applied. A reconciliation issued for a superseded generation is
    /// discarded instead of clobbering newer state.
    fn schedule_reconcile(&self, id: String, generation: u64) {
        let cache = Arc::clone(&self.cache);
        let view = Arc::clone(&self.view);
        let generations = Arc::clone(&self.generations);
        let delay = self.reconcile_delay;

        tokio::spawn(async move {
            sleep(delay).await;

            let latest = generations
                .lock()
                .ok()
                .and_then(|guard| guard.get(&id).copied())
                .unwrap_or(0);
            if latest != generation {
                log::debug!("discarding stale reconciliation for {id} (generation {generation}, latest {latest})");
                return;
            }

            if let Err(error) = reload_view(cache.as_ref(), &view) {
                log::warn!("background reconciliation failed: {error}");
            }
        });
    }

    fn next_generation(&self, id: &str) -> Result<u64, SyncError> {
        let mut generations = self
            .generations
            .lock()
            .map_err(|error| SyncError::Unknown(format!("generation lock poisoned: {error}")))?;
        let entry = generations.entry(id.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    fn apply_to_view(&self, kind: RecordKind, id: &str, completed: bool) -> Result<(), SyncError> {
        let mut view = self.lock_view()?;
        if let Some(record) = view
            .iter_mut()
            .find(|record| record.kind == kind && record.id == id)
        {
            record.completed = completed;
        }
        Ok(())
    }

    fn apply_to_cache(
        &self,
        kind: RecordKind,
        id: &str,
        completed: bool,
        fallback: &Record,
    ) -> Result<(), SyncError> {
        let mut record = match self.cache.get_by_id(kind, id)? {
            Some(record) => record,
            None => fallback.clone(),
        };
        record.completed = completed;
        self.cache.upsert(kind, &record)?;
        Ok(())
    }

    fn lock_view(&self) -> Result<std::sync::MutexGuard<'_, Vec<Record>>, SyncError> {
        self.view
            .lock()
            .map_err(|error| SyncError::Unknown(format!("view lock poisoned: {error}")))
    }
}

fn reload_view<C: RecordCache + ?Sized>(
    cache: &C,
    view: &Mutex<Vec<Record>>,
) -> Result<(), SyncError> {
    let tasks = cache.get_all(RecordKind::Task)?;
    let todos = cache.get_all(RecordKind::Todo)?;
    let mut guard = view
        .lock()
        .map_err(|error| SyncError::Unknown(format!("view lock poisoned: {error}")))?;
    *guard = tasks.into_iter().chain(todos).collect();
    Ok(())
}
