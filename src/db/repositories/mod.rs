pub mod feedback_bias_repository;
pub mod settings_repository;
pub mod task_repository;
