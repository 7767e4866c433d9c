//! Task execution lifecycle

pub mod result_fetcher;
pub mod serializer;
pub mod task_executor;

pub use result_fetcher::ResultFetcher;
pub use serializer::{JsonTaskSerializer, TaskSerializer, WorkerCodec};
pub use task_executor::{ExecutorComponents, TaskExecutor};
