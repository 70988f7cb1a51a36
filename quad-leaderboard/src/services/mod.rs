pub mod ranking;
pub mod task_service;
pub mod windows;
