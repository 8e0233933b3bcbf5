use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::settings::PendingMutationPolicy;
use crate::models::task::Task;
use crate::services::providers::TaskStore;

/// A delete that has been requested but not yet applied to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StagedMutation {
    pub id: String,
    pub root_task_id: String,
    pub snapshots: Vec<Task>,
    pub staged_at: DateTime<Utc>,
}

impl StagedMutation {
    pub fn task_ids(&self) -> Vec<String> {
        self.snapshots.iter().map(|task| task.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteOutcome {
    Deleted,
    Staged,
}

struct PendingEntry {
    mutation: StagedMutation,
    resolved: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

struct StagingInner {
    store: Arc<dyn TaskStore>,
    pending: Mutex<Option<PendingEntry>>,
}

impl StagingInner {
    fn lock(&self) -> AppResult<MutexGuard<'_, Option<PendingEntry>>> {
        self.pending
            .lock()
            .map_err(|_| AppError::other("mutation staging lock poisoned"))
    }

    /// Timer path: applies the delete only if nothing else resolved it first.
    fn auto_commit(&self, mutation_id: &str) {
        let mut guard = match self.lock() {
            Ok(guard) => guard,
            Err(err) => {
                error!(target: "app::staging", error = %err, "grace timer could not inspect pending change");
                return;
            }
        };

        let is_current = guard
            .as_ref()
            .map(|entry| entry.mutation.id == mutation_id)
            .unwrap_or(false);
        if !is_current {
            return;
        }

        let claimed = guard
            .as_ref()
            .map(|entry| {
                entry
                    .resolved
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
            .unwrap_or(false);
        if !claimed {
            return;
        }

        if let Some(mut entry) = guard.take() {
            entry.timer = None;
            let ids = entry.mutation.task_ids();
            match self.store.delete(&ids) {
                Ok(()) => info!(
                    target: "app::staging",
                    mutation_id,
                    tasks = ids.len(),
                    "grace window elapsed, delete committed"
                ),
                Err(err) => {
                    error!(target: "app::staging", error = %err, mutation_id, "auto-commit failed, change kept pending");
                    entry.resolved.store(false, Ordering::Release);
                    *guard = Some(entry);
                }
            }
        }
    }
}

/// Holds at most one undoable delete until it is committed, discarded or
/// its grace window runs out.
pub struct MutationStaging {
    inner: Arc<StagingInner>,
    config: RwLock<StagingConfig>,
}

#[derive(Debug, Clone, Copy)]
struct StagingConfig {
    grace: Duration,
    policy: PendingMutationPolicy,
}

impl MutationStaging {
    pub fn new(store: Arc<dyn TaskStore>, grace: Duration, policy: PendingMutationPolicy) -> Self {
        Self {
            inner: Arc::new(StagingInner {
                store,
                pending: Mutex::new(None),
            }),
            config: RwLock::new(StagingConfig { grace, policy }),
        }
    }

    pub fn grace(&self) -> Duration {
        self.config().grace
    }

    pub fn policy(&self) -> PendingMutationPolicy {
        self.config().policy
    }

    /// Applies to deletes staged from now on; a pending timer keeps its window.
    pub fn reconfigure(&self, grace: Duration, policy: PendingMutationPolicy) {
        match self.config.write() {
            Ok(mut config) => *config = StagingConfig { grace, policy },
            Err(poisoned) => *poisoned.into_inner() = StagingConfig { grace, policy },
        }
        debug!(target: "app::staging", grace_ms = grace.as_millis() as u64, %policy, "staging reconfigured");
    }

    fn config(&self) -> StagingConfig {
        match self.config.read() {
            Ok(config) => *config,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Removes `task_id` and every descendant. With `allow_undo` the removal
    /// is only staged and the store is left untouched until commit.
    ///
    /// The pending slot stays locked from the policy check until the new
    /// entry is stored, so concurrent deletes are applied one after another.
    pub fn delete_task(&self, task_id: &str, allow_undo: bool) -> AppResult<DeleteOutcome> {
        let mut guard = self.inner.lock()?;
        if guard.is_some() {
            match self.policy() {
                PendingMutationPolicy::Reject => {
                    return Err(AppError::conflict(
                        "another delete is waiting for its undo window to close",
                    ));
                }
                PendingMutationPolicy::ForceCommitPrior => {
                    debug!(target: "app::staging", "committing prior staged delete first");
                    self.commit_locked(&mut guard)?;
                }
            }
        }

        let tasks = self.inner.store.list_current()?;
        let snapshots = collect_family(&tasks, task_id)?;
        let ids: Vec<String> = snapshots.iter().map(|task| task.id.clone()).collect();

        if !allow_undo {
            self.inner.store.delete(&ids)?;
            info!(target: "app::staging", task_id, tasks = ids.len(), "tasks deleted");
            return Ok(DeleteOutcome::Deleted);
        }

        let mutation = StagedMutation {
            id: uuid::Uuid::new_v4().to_string(),
            root_task_id: task_id.to_string(),
            snapshots,
            staged_at: Utc::now(),
        };

        info!(
            target: "app::staging",
            task_id,
            mutation_id = %mutation.id,
            tasks = ids.len(),
            grace_ms = self.grace().as_millis() as u64,
            "delete staged"
        );

        let timer = self.spawn_timer(mutation.id.clone());
        *guard = Some(PendingEntry {
            mutation,
            resolved: Arc::new(AtomicBool::new(false)),
            timer,
        });

        Ok(DeleteOutcome::Staged)
    }

    /// Writes every snapshot back, leaving the store as it was before the delete.
    pub fn discard_pending_changes(&self) -> AppResult<StagedMutation> {
        let mut guard = self.inner.lock()?;
        let entry = claim(&mut guard)?;
        match self.inner.store.update_batch(&entry.mutation.snapshots) {
            Ok(()) => {
                info!(
                    target: "app::staging",
                    mutation_id = %entry.mutation.id,
                    tasks = entry.mutation.snapshots.len(),
                    "staged delete discarded"
                );
                Ok(entry.mutation)
            }
            Err(err) => {
                self.restore(&mut guard, entry);
                Err(err)
            }
        }
    }

    pub fn commit_pending_changes(&self) -> AppResult<StagedMutation> {
        let mut guard = self.inner.lock()?;
        self.commit_locked(&mut guard)
    }

    pub fn is_pending(&self) -> AppResult<bool> {
        Ok(self.inner.lock()?.is_some())
    }

    pub fn pending(&self) -> AppResult<Option<StagedMutation>> {
        Ok(self
            .inner
            .lock()?
            .as_ref()
            .map(|entry| entry.mutation.clone()))
    }

    /// Ids that callers should treat as already gone.
    pub fn hidden_task_ids(&self) -> AppResult<HashSet<String>> {
        Ok(self
            .inner
            .lock()?
            .as_ref()
            .map(|entry| entry.mutation.task_ids().into_iter().collect())
            .unwrap_or_default())
    }

    fn commit_locked(&self, slot: &mut Option<PendingEntry>) -> AppResult<StagedMutation> {
        let entry = claim(slot)?;
        let ids = entry.mutation.task_ids();
        match self.inner.store.delete(&ids) {
            Ok(()) => {
                info!(
                    target: "app::staging",
                    mutation_id = %entry.mutation.id,
                    tasks = ids.len(),
                    "staged delete committed"
                );
                Ok(entry.mutation)
            }
            Err(err) => {
                self.restore(slot, entry);
                Err(err)
            }
        }
    }

    /// Puts a claimed entry back after the store refused it. The caller still
    /// holds the slot, so nothing can have been staged in between.
    fn restore(&self, slot: &mut Option<PendingEntry>, mut entry: PendingEntry) {
        warn!(
            target: "app::staging",
            mutation_id = %entry.mutation.id,
            "store rejected the change, keeping it pending"
        );
        entry.resolved.store(false, Ordering::Release);
        entry.timer = self.spawn_timer(entry.mutation.id.clone());
        *slot = Some(entry);
    }

    fn spawn_timer(&self, mutation_id: String) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!(target: "app::staging", "no async runtime, staged delete waits for an explicit decision");
                return None;
            }
        };

        let inner = Arc::clone(&self.inner);
        let grace = self.grace();
        Some(handle.spawn(async move {
            tokio::time::sleep(grace).await;
            inner.auto_commit(&mutation_id);
        }))
    }
}

impl Drop for MutationStaging {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.inner.pending.lock() {
            if let Some(entry) = guard.as_mut() {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
            }
        }
    }
}

/// Takes the pending entry for an explicit commit or discard, beating the
/// timer through the shared `resolved` flag.
fn claim(slot: &mut Option<PendingEntry>) -> AppResult<PendingEntry> {
    let Some(mut entry) = slot.take() else {
        return Err(AppError::nothing_pending());
    };

    if entry
        .resolved
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(AppError::nothing_pending());
    }

    if let Some(timer) = entry.timer.take() {
        timer.abort();
    }
    Ok(entry)
}

/// The task with `root_id` followed by all of its descendants, found through
/// both `subtask_ids` and `parent_id` links.
fn collect_family(tasks: &[Task], root_id: &str) -> AppResult<Vec<Task>> {
    let root = tasks
        .iter()
        .find(|task| task.id == root_id)
        .ok_or_else(AppError::not_found)?;

    let mut family = vec![root.clone()];
    let mut seen: HashSet<String> = HashSet::from([root.id.clone()]);
    let mut queue: VecDeque<&Task> = VecDeque::from([root]);

    while let Some(current) = queue.pop_front() {
        let children = tasks.iter().filter(|candidate| {
            candidate.parent_id.as_deref() == Some(current.id.as_str())
                || current.subtask_ids.contains(&candidate.id)
        });
        for child in children {
            if seen.insert(child.id.clone()) {
                family.push(child.clone());
                queue.push_back(child);
            }
        }
    }

    Ok(family)
}
