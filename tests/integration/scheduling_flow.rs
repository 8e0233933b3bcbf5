use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use taskflow_scheduler_lib::commands::{AppState, AppStateParts};
use taskflow_scheduler_lib::db::memory::{InMemoryBiasRepository, InMemoryTaskStore};
use taskflow_scheduler_lib::db::DbPool;
use taskflow_scheduler_lib::error::{AppError, AppResult};
use taskflow_scheduler_lib::models::calendar::CalendarEvent;
use taskflow_scheduler_lib::models::conflict::ConflictSeverity;
use taskflow_scheduler_lib::models::feedback::SuggestionAction;
use taskflow_scheduler_lib::models::recurrence::{Frequency, RecurringRule, RecurringRuleInput};
use taskflow_scheduler_lib::models::reschedule::RescheduleKind;
use taskflow_scheduler_lib::models::settings::{PendingMutationPolicy, SchedulingSettings};
use taskflow_scheduler_lib::models::task::{Task, TaskPriority};
use taskflow_scheduler_lib::services::providers::{AiInsightProvider, CalendarAccessProvider};
use taskflow_scheduler_lib::services::settings_service::SettingsUpdateInput;
use tempfile::TempDir;

fn dt(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .expect("offset")
        .with_ymd_and_hms(2025, 4, day, hour, minute, 0)
        .single()
        .expect("timestamp")
}

fn scheduled(id: &str, start: DateTime<FixedOffset>, minutes: i64, priority: TaskPriority) -> Task {
    Task::new(format!("Task {id}"), dt(13, 18, 0))
        .with_id(id)
        .with_due_at(Some(start))
        .with_estimated_minutes(Some(minutes))
        .with_priority(priority)
}

struct StaticCalendar {
    events: Vec<CalendarEvent>,
}

#[async_trait]
impl CalendarAccessProvider for StaticCalendar {
    async fn events_in_range(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> AppResult<Vec<CalendarEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|event| event.start_at < end && event.end_at > start)
            .cloned()
            .collect())
    }
}

struct DeniedCalendar;

#[async_trait]
impl CalendarAccessProvider for DeniedCalendar {
    async fn events_in_range(
        &self,
        _start: DateTime<FixedOffset>,
        _end: DateTime<FixedOffset>,
    ) -> AppResult<Vec<CalendarEvent>> {
        Err(AppError::calendar_unavailable("calendar permission denied"))
    }
}

struct CannedInsights;

#[async_trait]
impl AiInsightProvider for CannedInsights {
    async fn insight(&self, task: &Task) -> Option<String> {
        Some(format!("{} is a good warm-up", task.title))
    }
}

fn in_memory_state(tasks: Vec<Task>, events: Vec<CalendarEvent>) -> AppState {
    AppState::from_parts(AppStateParts {
        task_store: Arc::new(InMemoryTaskStore::with_tasks(tasks)),
        bias_repository: Arc::new(InMemoryBiasRepository::new()),
        calendar: Arc::new(StaticCalendar { events }),
        insight_provider: None,
        settings: SchedulingSettings::default(),
    })
}

#[tokio::test]
async fn half_overlapping_meeting_is_high_and_moves_after_it() -> AppResult<()> {
    let temp_dir = TempDir::new()?;
    let pool = DbPool::new(temp_dir.path().join("scheduling.sqlite"))?;
    let calendar = Arc::new(StaticCalendar {
        events: vec![CalendarEvent::new("sync", "Team sync", dt(14, 14, 30), dt(14, 15, 0))],
    });
    let state = AppState::new(pool, calendar)?;
    state
        .task_store()
        .create(&scheduled("report", dt(14, 14, 0), 60, TaskPriority::Medium))?;

    let now = dt(14, 8, 0);
    let conflicts = state.scan_for_conflicts(now).await?;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].severity, ConflictSeverity::High);
    assert_eq!(conflicts[0].overlap.duration_minutes(), 30);

    let suggestion = state.suggest_reschedule(&conflicts[0], now).await?;
    let best = suggestion.recommended_option.expect("a recommended option");
    assert_eq!(best.kind, RescheduleKind::AfterCounterpart);
    assert_eq!(best.start_at, dt(14, 15, 0));
    assert!(suggestion.options.iter().all(|option| option.start_at >= now));
    Ok(())
}

#[tokio::test]
async fn auto_resolvable_batch_leaves_no_conflicts_behind() -> AppResult<()> {
    let state = in_memory_state(
        vec![
            scheduled("draft", dt(14, 10, 0), 60, TaskPriority::Medium),
            scheduled("email", dt(14, 10, 15), 30, TaskPriority::Low),
        ],
        vec![CalendarEvent::new("standup", "Standup", dt(14, 10, 0), dt(14, 10, 30))],
    );
    let now = dt(14, 8, 0);

    let conflicts = state.scan_for_conflicts(now).await?;
    assert_eq!(conflicts.len(), 3);

    let batch = state.suggest_batch_reschedule(now).await?;
    assert!(batch.can_auto_resolve);
    assert!(batch.unresolved_task_ids.is_empty());
    assert_eq!(batch.accepted.len(), 2);

    let first = batch.accepted[0].option.interval()?;
    let second = batch.accepted[1].option.interval()?;
    assert!(!first.overlaps(&second));

    let moved = state.apply_batch_reschedule(&batch, now)?;
    assert_eq!(moved.len(), 2);
    assert!(state.scan_for_conflicts(now).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn denied_calendar_still_reports_task_overlaps() -> AppResult<()> {
    let state = AppState::from_parts(AppStateParts {
        task_store: Arc::new(InMemoryTaskStore::with_tasks(vec![
            scheduled("a", dt(14, 9, 0), 60, TaskPriority::Medium),
            scheduled("b", dt(14, 9, 30), 60, TaskPriority::Medium),
        ])),
        bias_repository: Arc::new(InMemoryBiasRepository::new()),
        calendar: Arc::new(DeniedCalendar),
        insight_provider: None,
        settings: SchedulingSettings::default(),
    });

    let snapshot = state.refresh(dt(14, 8, 0)).await?;
    assert!(!snapshot.calendar_available);
    assert!(snapshot.events.is_empty());
    assert_eq!(snapshot.conflicts.len(), 1);
    Ok(())
}

#[tokio::test]
async fn skipping_for_wrong_time_lowers_the_score_at_that_hour() -> AppResult<()> {
    let writing = Task::new("Write chapter", dt(13, 18, 0))
        .with_id("writing")
        .with_category("writing")
        .with_priority(TaskPriority::Medium)
        .with_estimated_minutes(Some(30));
    let state = in_memory_state(vec![writing], Vec::new());
    let now = dt(14, 8, 0);

    let before = state
        .get_next_task_suggestion(now)
        .await?
        .expect("a suggestion");
    state.record_suggestion_feedback("writing", SuggestionAction::SkippedWrongTime, before.score, now)?;
    let after = state
        .get_next_task_suggestion(now)
        .await?
        .expect("a suggestion");

    assert!(after.score < before.score);
    Ok(())
}

#[tokio::test]
async fn suggestions_follow_tasks_removed_outside_the_state() -> AppResult<()> {
    let state = in_memory_state(
        vec![
            Task::new("Renew passport", dt(13, 18, 0))
                .with_id("gone")
                .with_priority(TaskPriority::High),
            Task::new("Water plants", dt(13, 18, 0)).with_id("stays"),
        ],
        Vec::new(),
    );
    let now = dt(14, 8, 0);

    let first = state.get_next_task_suggestion(now).await?.expect("a suggestion");
    assert_eq!(first.task.id, "gone");

    state.task_store().delete(&["gone".to_string()])?;

    let next = state.get_next_task_suggestion(now).await?.expect("a suggestion");
    assert_eq!(next.task.id, "stays");
    assert!(matches!(
        state.record_suggestion_feedback("gone", SuggestionAction::StartedImmediately, first.score, now),
        Err(AppError::NotFound)
    ));
    state.record_suggestion_feedback("stays", SuggestionAction::StartedImmediately, next.score, now)?;
    Ok(())
}

#[tokio::test]
async fn snoozed_task_drops_out_until_the_snooze_ends() -> AppResult<()> {
    let state = in_memory_state(
        vec![
            Task::new("Pay rent", dt(13, 18, 0))
                .with_id("rent")
                .with_priority(TaskPriority::High),
            Task::new("Tidy desk", dt(13, 18, 0)).with_id("desk"),
        ],
        Vec::new(),
    );
    let now = dt(14, 8, 0);

    let top = state.get_top_three_suggestions(now).await?;
    assert_eq!(top[0].task.id, "rent");

    state.record_suggestion_feedback("rent", SuggestionAction::Snoozed1Hour, top[0].score, now)?;

    let snoozed: Vec<String> = state
        .get_top_three_suggestions(now)
        .await?
        .into_iter()
        .map(|suggestion| suggestion.task.id)
        .collect();
    assert_eq!(snoozed, vec!["desk".to_string()]);

    let later: Vec<String> = state
        .get_top_three_suggestions(dt(14, 9, 30))
        .await?
        .into_iter()
        .map(|suggestion| suggestion.task.id)
        .collect();
    assert!(later.contains(&"rent".to_string()));
    Ok(())
}

#[tokio::test]
async fn insights_never_reorder_suggestions() -> AppResult<()> {
    let tasks = vec![
        Task::new("Quarterly review", dt(13, 18, 0))
            .with_id("review")
            .with_priority(TaskPriority::High),
        Task::new("Water plants", dt(13, 18, 0))
            .with_id("plants")
            .with_priority(TaskPriority::Low),
    ];
    let state = in_memory_state(tasks, Vec::new()).with_insight_provider(Arc::new(CannedInsights));
    let now = dt(14, 8, 0);

    let plain = state.get_top_three_suggestions(now).await?;
    let enriched = state.get_top_three_with_insights(now).await?;

    assert_eq!(plain.len(), enriched.len());
    for (left, right) in plain.iter().zip(&enriched) {
        assert_eq!(left.task.id, right.task.id);
        assert_eq!(left.score, right.score);
        assert_eq!(left.reasons, right.reasons);
    }
    assert_eq!(
        enriched[0].insight.as_deref(),
        Some("Quarterly review is a good warm-up")
    );
    Ok(())
}

#[test]
fn completing_a_recurring_task_creates_the_next_instance() -> AppResult<()> {
    let temp_dir = TempDir::new()?;
    let pool = DbPool::new(temp_dir.path().join("recurring.sqlite"))?;
    let state = AppState::new(pool, Arc::new(StaticCalendar { events: Vec::new() }))?;

    let rule = RecurringRule::new(RecurringRuleInput::new(Frequency::Daily, dt(14, 7, 30)))?;
    let task = Task::new("Stretch", dt(13, 18, 0))
        .with_id("stretch")
        .with_due_at(Some(dt(14, 7, 30)))
        .with_estimated_minutes(Some(15))
        .with_recurrence(Some(rule));
    state.task_store().create(&task)?;

    let completion = state.complete_task("stretch", dt(14, 8, 0))?;
    assert!(completion.completed.is_completed);
    let follow_up = completion.follow_up.expect("next instance");
    assert_eq!(follow_up.due_at, Some(dt(15, 7, 30)));

    let stored = state.task_store().list_current()?;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|t| t.id == "stretch" && t.is_completed));
    assert!(stored.iter().any(|t| t.id == follow_up.id && !t.is_completed));

    let again = state.complete_task("stretch", dt(14, 8, 5));
    assert!(matches!(again, Err(AppError::Conflict { .. })));
    Ok(())
}

#[test]
fn bootstrapped_state_applies_settings_changes() -> AppResult<()> {
    let temp_dir = TempDir::new()?;
    let data_dir = temp_dir.path().join("data");
    let state = taskflow_scheduler_lib::bootstrap(&data_dir, Arc::new(StaticCalendar { events: Vec::new() }))?;

    assert!(state.db().is_some());
    assert!(data_dir.join("logs").is_dir());
    assert_eq!(state.settings()?.undo_grace_seconds, 8);

    let updated = state.update_settings(SettingsUpdateInput {
        workday_start_minute: Some(7 * 60),
        undo_grace_seconds: Some(20),
        pending_mutation_policy: Some(PendingMutationPolicy::Reject),
        ..SettingsUpdateInput::default()
    })?;

    assert_eq!(updated.workday_start_minute, 420);
    assert_eq!(state.settings()?, updated);
    assert_eq!(state.staging().grace(), std::time::Duration::from_secs(20));
    assert_eq!(state.staging().policy(), PendingMutationPolicy::Reject);
    Ok(())
}

#[test]
fn in_memory_state_refuses_to_persist_settings() {
    let state = in_memory_state(Vec::new(), Vec::new());
    let result = state.update_settings(SettingsUpdateInput {
        undo_grace_seconds: Some(5),
        ..SettingsUpdateInput::default()
    });
    assert!(matches!(result, Err(AppError::Other(_))));
}
