use std::sync::{Arc, Barrier};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use taskflow_scheduler_lib::commands::AppState;
use taskflow_scheduler_lib::db::memory::InMemoryTaskStore;
use taskflow_scheduler_lib::db::repositories::task_repository::SqliteTaskStore;
use taskflow_scheduler_lib::db::DbPool;
use taskflow_scheduler_lib::error::{AppError, AppResult};
use taskflow_scheduler_lib::models::calendar::CalendarEvent;
use taskflow_scheduler_lib::models::recurrence::{Frequency, RecurringRule, RecurringRuleInput};
use taskflow_scheduler_lib::models::settings::PendingMutationPolicy;
use taskflow_scheduler_lib::models::task::{Task, TaskPriority};
use taskflow_scheduler_lib::services::mutation_staging::{DeleteOutcome, MutationStaging};
use taskflow_scheduler_lib::services::providers::{CalendarAccessProvider, TaskStore};
use tempfile::TempDir;

const GRACE: Duration = Duration::from_secs(8);

fn dt(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(2 * 3600)
        .expect("offset")
        .with_ymd_and_hms(2025, 3, 3, hour, minute, 0)
        .single()
        .expect("timestamp")
}

fn project_family() -> AppResult<Vec<Task>> {
    let rule = RecurringRule::new(RecurringRuleInput::new(Frequency::Daily, dt(9, 0)))?;
    Ok(vec![
        Task::new("Launch site", dt(8, 0))
            .with_id("launch")
            .with_priority(TaskPriority::High)
            .with_due_at(Some(dt(17, 0)))
            .with_subtasks(vec!["copy".into(), "deploy".into()]),
        Task::new("Write copy", dt(8, 5))
            .with_id("copy")
            .with_parent(Some("launch".into()))
            .with_estimated_minutes(Some(90))
            .with_category("writing")
            .with_in_progress(true),
        Task::new("Deploy", dt(8, 10))
            .with_id("deploy")
            .with_parent(Some("launch".into()))
            .with_recurrence(Some(rule)),
        Task::new("Smoke test", dt(8, 15))
            .with_id("smoke")
            .with_parent(Some("deploy".into())),
        Task::new("Lunch order", dt(8, 20)).with_id("lunch"),
    ])
}

fn ids(store: &dyn TaskStore) -> AppResult<Vec<String>> {
    Ok(store.list_current()?.into_iter().map(|task| task.id).collect())
}

/// Widens the gap between reading the tasks and staging the delete.
struct SlowListingStore {
    inner: InMemoryTaskStore,
}

impl TaskStore for SlowListingStore {
    fn create(&self, task: &Task) -> AppResult<()> {
        self.inner.create(task)
    }

    fn update(&self, task: &Task) -> AppResult<()> {
        self.inner.update(task)
    }

    fn update_batch(&self, tasks: &[Task]) -> AppResult<()> {
        self.inner.update_batch(tasks)
    }

    fn delete(&self, ids: &[String]) -> AppResult<()> {
        self.inner.delete(ids)
    }

    fn list_current(&self) -> AppResult<Vec<Task>> {
        std::thread::sleep(Duration::from_millis(30));
        self.inner.list_current()
    }
}

struct EmptyCalendar;

#[async_trait]
impl CalendarAccessProvider for EmptyCalendar {
    async fn events_in_range(
        &self,
        _start: DateTime<FixedOffset>,
        _end: DateTime<FixedOffset>,
    ) -> AppResult<Vec<CalendarEvent>> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn grace_window_expiry_commits_the_delete() -> AppResult<()> {
    let store = Arc::new(InMemoryTaskStore::with_tasks(project_family()?));
    let staging = MutationStaging::new(store.clone(), GRACE, PendingMutationPolicy::ForceCommitPrior);

    assert_eq!(staging.delete_task("deploy", true)?, DeleteOutcome::Staged);

    tokio::time::sleep(GRACE - Duration::from_secs(1)).await;
    assert_eq!(ids(store.as_ref())?.len(), 5);
    assert!(staging.is_pending()?);

    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;

    assert_eq!(ids(store.as_ref())?, vec!["launch", "copy", "lunch"]);
    assert!(!staging.is_pending()?);
    assert!(matches!(
        staging.discard_pending_changes(),
        Err(AppError::NothingPending)
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_commit_wins_over_the_timer() -> AppResult<()> {
    let store = Arc::new(InMemoryTaskStore::with_tasks(project_family()?));
    let staging = MutationStaging::new(store.clone(), GRACE, PendingMutationPolicy::ForceCommitPrior);

    staging.delete_task("lunch", true)?;
    let committed = staging.commit_pending_changes()?;
    assert_eq!(committed.task_ids(), vec!["lunch".to_string()]);

    store.create(&Task::new("Lunch order", dt(12, 0)).with_id("lunch"))?;
    tokio::time::sleep(GRACE * 2).await;
    tokio::task::yield_now().await;

    assert!(ids(store.as_ref())?.contains(&"lunch".to_string()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn discard_restores_the_family_field_for_field() -> AppResult<()> {
    let temp_dir = TempDir::new()?;
    let pool = DbPool::new(temp_dir.path().join("staging.sqlite"))?;
    let store = Arc::new(SqliteTaskStore::new(pool));
    for task in project_family()? {
        store.create(&task)?;
    }
    let before = store.list_current()?;

    let staging = MutationStaging::new(store.clone(), GRACE, PendingMutationPolicy::ForceCommitPrior);
    staging.delete_task("launch", true)?;
    let hidden = staging.hidden_task_ids()?;
    assert_eq!(hidden.len(), 4);
    assert!(!hidden.contains("lunch"));

    let restored = staging.discard_pending_changes()?;
    assert_eq!(restored.root_task_id, "launch");

    tokio::time::sleep(GRACE * 2).await;
    tokio::task::yield_now().await;

    assert_eq!(store.list_current()?, before);
    assert!(staging.hidden_task_ids()?.is_empty());
    Ok(())
}

#[test]
fn second_delete_force_commits_the_first() -> AppResult<()> {
    let store = Arc::new(InMemoryTaskStore::with_tasks(project_family()?));
    let staging = MutationStaging::new(store.clone(), GRACE, PendingMutationPolicy::ForceCommitPrior);

    staging.delete_task("lunch", true)?;
    staging.delete_task("deploy", true)?;

    assert_eq!(ids(store.as_ref())?, vec!["launch", "copy", "deploy", "smoke"]);
    let pending = staging.pending()?.expect("second delete pending");
    assert_eq!(pending.root_task_id, "deploy");
    Ok(())
}

#[test]
fn concurrent_undoable_deletes_never_lose_one() -> AppResult<()> {
    let store = Arc::new(SlowListingStore {
        inner: InMemoryTaskStore::with_tasks(vec![
            Task::new("Water plants", dt(8, 0)).with_id("a"),
            Task::new("Call plumber", dt(8, 5)).with_id("b"),
        ]),
    });
    let staging = MutationStaging::new(store.clone(), GRACE, PendingMutationPolicy::ForceCommitPrior);
    let barrier = Barrier::new(2);

    let outcomes: Vec<AppResult<DeleteOutcome>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| {
                let staging = &staging;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    staging.delete_task(id, true)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("delete thread"))
            .collect()
    });

    for outcome in outcomes {
        assert_eq!(outcome?, DeleteOutcome::Staged);
    }

    let remaining = ids(store.as_ref())?;
    assert_eq!(remaining.len(), 1);
    let pending = staging.pending()?.expect("one delete still pending");
    assert_eq!(vec![pending.root_task_id], remaining);

    staging.commit_pending_changes()?;
    assert!(ids(store.as_ref())?.is_empty());
    assert!(!staging.is_pending()?);
    Ok(())
}

#[test]
fn staged_tasks_are_hidden_from_snapshots_until_discarded() -> AppResult<()> {
    let temp_dir = TempDir::new()?;
    let pool = DbPool::new(temp_dir.path().join("state.sqlite"))?;
    let state = AppState::new(pool, Arc::new(EmptyCalendar))?;
    for task in project_family()? {
        state.task_store().create(&task)?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()?;
    let now = dt(9, 0);

    let visible = |state: &AppState| -> AppResult<Vec<String>> {
        let snapshot = runtime.block_on(state.refresh(now))?;
        Ok(snapshot.tasks.into_iter().map(|task| task.id).collect())
    };

    assert_eq!(visible(&state)?.len(), 5);

    state.delete_task("deploy", true)?;
    assert_eq!(visible(&state)?, vec!["launch", "copy", "lunch"]);
    assert!(matches!(
        state.complete_task("smoke", now),
        Err(AppError::NotFound)
    ));

    state.discard_pending_changes()?;
    assert_eq!(visible(&state)?.len(), 5);
    assert!(matches!(
        state.commit_pending_changes(),
        Err(AppError::NothingPending)
    ));
    Ok(())
}
