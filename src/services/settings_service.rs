use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::repositories::settings_repository::{AppSettingRow, SettingsRepository};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::{PendingMutationPolicy, SchedulingSettings};

const KEY_PREFIX: &str = "scheduling.";
const KEY_WORKDAY_START: &str = "scheduling.workday_start_minute";
const KEY_WORKDAY_END: &str = "scheduling.workday_end_minute";
const KEY_UNDO_GRACE: &str = "scheduling.undo_grace_seconds";
const KEY_INSIGHT_TIMEOUT: &str = "scheduling.insight_timeout_ms";
const KEY_PENDING_POLICY: &str = "scheduling.pending_mutation_policy";

const DEFAULT_WORKDAY_START: i16 = 9 * 60;
const DEFAULT_WORKDAY_END: i16 = 18 * 60;
const DEFAULT_UNDO_GRACE_SECONDS: u32 = 8;
const DEFAULT_INSIGHT_TIMEOUT_MS: u64 = 3_000;

const MAX_UNDO_GRACE_SECONDS: u32 = 300;
const MAX_INSIGHT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Default, Clone)]
pub struct SettingsUpdateInput {
    pub workday_start_minute: Option<i16>,
    pub workday_end_minute: Option<i16>,
    pub undo_grace_seconds: Option<u32>,
    pub insight_timeout_ms: Option<u64>,
    pub pending_mutation_policy: Option<PendingMutationPolicy>,
}

impl SchedulingSettings {
    pub fn undo_grace(&self) -> Duration {
        Duration::from_secs(u64::from(self.undo_grace_seconds))
    }

    pub fn insight_timeout(&self) -> Duration {
        Duration::from_millis(self.insight_timeout_ms)
    }
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            workday_start_minute: DEFAULT_WORKDAY_START,
            workday_end_minute: DEFAULT_WORKDAY_END,
            undo_grace_seconds: DEFAULT_UNDO_GRACE_SECONDS,
            insight_timeout_ms: DEFAULT_INSIGHT_TIMEOUT_MS,
            pending_mutation_policy: PendingMutationPolicy::default(),
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

pub struct SettingsService {
    db: DbPool,
    cache: RwLock<Option<SchedulingSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
        }
    }

    pub fn get(&self) -> AppResult<SchedulingSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_settings_from_db()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }

    pub fn update(&self, input: SettingsUpdateInput) -> AppResult<SchedulingSettings> {
        let mut current = self.get()?;

        if let Some(workday_start) = input.workday_start_minute {
            ensure_valid_minute(workday_start)?;
            current.workday_start_minute = workday_start;
        }

        if let Some(workday_end) = input.workday_end_minute {
            ensure_valid_minute(workday_end)?;
            current.workday_end_minute = workday_end;
        }

        if current.workday_start_minute >= current.workday_end_minute {
            return Err(AppError::validation(
                "workday must start before it ends",
            ));
        }

        if let Some(grace) = input.undo_grace_seconds {
            if grace == 0 || grace > MAX_UNDO_GRACE_SECONDS {
                return Err(AppError::validation(format!(
                    "undo grace window must be between 1 and {MAX_UNDO_GRACE_SECONDS} seconds"
                )));
            }
            current.undo_grace_seconds = grace;
        }

        if let Some(timeout) = input.insight_timeout_ms {
            if timeout == 0 || timeout > MAX_INSIGHT_TIMEOUT_MS {
                return Err(AppError::validation(format!(
                    "insight timeout must be between 1 and {MAX_INSIGHT_TIMEOUT_MS} ms"
                )));
            }
            current.insight_timeout_ms = timeout;
        }

        if let Some(policy) = input.pending_mutation_policy {
            current.pending_mutation_policy = policy;
        }

        let mut entries: Vec<(&str, String)> = Vec::new();
        if input.workday_start_minute.is_some() {
            entries.push((KEY_WORKDAY_START, current.workday_start_minute.to_string()));
        }
        if input.workday_end_minute.is_some() {
            entries.push((KEY_WORKDAY_END, current.workday_end_minute.to_string()));
        }
        if input.undo_grace_seconds.is_some() {
            entries.push((KEY_UNDO_GRACE, current.undo_grace_seconds.to_string()));
        }
        if input.insight_timeout_ms.is_some() {
            entries.push((KEY_INSIGHT_TIMEOUT, current.insight_timeout_ms.to_string()));
        }
        if input.pending_mutation_policy.is_some() {
            entries.push((KEY_PENDING_POLICY, current.pending_mutation_policy.to_string()));
        }

        self.db
            .with_transaction(|conn| SettingsRepository::upsert_many(conn, &entries))?;
        current.updated_at = Utc::now().to_rfc3339();

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(current.clone());
        }

        info!(
            target: "app::settings",
            changed = entries.len(),
            "scheduling settings updated"
        );

        Ok(current)
    }

    fn load_settings_from_db(&self) -> AppResult<SchedulingSettings> {
        self.db.with_connection(|conn| {
            let rows = SettingsRepository::list_with_prefix(conn, KEY_PREFIX)?;
            let mut map: HashMap<String, AppSettingRow> = HashMap::new();
            let mut latest_updated_at: Option<String> = None;

            for row in rows {
                latest_updated_at = match latest_updated_at {
                    Some(ref current) if current >= &row.updated_at => Some(current.clone()),
                    _ => Some(row.updated_at.clone()),
                };
                map.insert(row.key.clone(), row);
            }

            let workday_start = map
                .get(KEY_WORKDAY_START)
                .and_then(|row| row.value.parse::<i16>().ok())
                .unwrap_or(DEFAULT_WORKDAY_START);

            let workday_end = map
                .get(KEY_WORKDAY_END)
                .and_then(|row| row.value.parse::<i16>().ok())
                .unwrap_or(DEFAULT_WORKDAY_END);

            let workday_valid = workday_start < workday_end
                && ensure_valid_minute(workday_start).is_ok()
                && ensure_valid_minute(workday_end).is_ok();
            if !workday_valid {
                warn!(
                    target: "app::settings",
                    start = workday_start,
                    end = workday_end,
                    "stored workday range invalid, falling back to defaults"
                );
            }

            let undo_grace_seconds = map
                .get(KEY_UNDO_GRACE)
                .and_then(|row| row.value.parse::<u32>().ok())
                .filter(|value| (1..=MAX_UNDO_GRACE_SECONDS).contains(value))
                .unwrap_or(DEFAULT_UNDO_GRACE_SECONDS);

            let insight_timeout_ms = map
                .get(KEY_INSIGHT_TIMEOUT)
                .and_then(|row| row.value.parse::<u64>().ok())
                .filter(|value| (1..=MAX_INSIGHT_TIMEOUT_MS).contains(value))
                .unwrap_or(DEFAULT_INSIGHT_TIMEOUT_MS);

            let pending_mutation_policy = match map.get(KEY_PENDING_POLICY) {
                Some(row) => row.value.parse::<PendingMutationPolicy>().unwrap_or_else(|reason| {
                    warn!(target: "app::settings", %reason, "stored pending mutation policy unreadable");
                    PendingMutationPolicy::default()
                }),
                None => PendingMutationPolicy::default(),
            };

            let updated_at = latest_updated_at.unwrap_or_else(|| Utc::now().to_rfc3339());

            Ok(SchedulingSettings {
                workday_start_minute: if workday_valid {
                    workday_start
                } else {
                    DEFAULT_WORKDAY_START
                },
                workday_end_minute: if workday_valid {
                    workday_end
                } else {
                    DEFAULT_WORKDAY_END
                },
                undo_grace_seconds,
                insight_timeout_ms,
                pending_mutation_policy,
                updated_at,
            })
        })
    }
}

fn ensure_valid_minute(value: i16) -> AppResult<()> {
    if !(0..=1440).contains(&value) {
        return Err(AppError::validation(
            "workday minutes must be between 0 and 1440",
        ));
    }
    Ok(())
}
