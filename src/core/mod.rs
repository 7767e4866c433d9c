//! Cross-cutting infrastructure shared by all components

pub mod logging;

pub use logging::{init_logging, init_structured_logging, log_task_error, LogFormat};
