pub mod calendar;
pub mod conflict;
pub mod feedback;
pub mod interval;
pub mod recurrence;
pub mod reschedule;
pub mod settings;
pub mod suggestion;
pub mod task;
