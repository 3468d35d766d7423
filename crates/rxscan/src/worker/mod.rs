pub mod pool;
pub mod queue;
pub mod task;

pub use pool::{CoordinatorFactory, PoolQueue, Recovery, WorkerPool};
pub use queue::{DeferredQueue, InlineQueue, TaskQueue};
pub use task::{TaskHandler, TaskOutcome, TaskReport};
