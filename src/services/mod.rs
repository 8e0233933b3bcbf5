pub mod conflict_detector;
pub mod feedback_learner;
pub mod insight_service;
pub mod mutation_staging;
pub mod prioritization_engine;
pub mod providers;
pub mod recurrence_expander;
pub mod reschedule_suggester;
pub mod schedule_utils;
pub mod settings_service;
