//! Execution layer - dependency graph, level scheduling, and the engine
//! that routes tasks to executors.

#![warn(missing_docs)]

pub mod graph;
pub mod scheduler;
pub mod status;
pub mod executor;
pub mod selector;
pub mod engine;
pub mod error;

pub use graph::{build_graph, GraphError, TaskGraph};
pub use scheduler::{
    blocked_by_failure, critical_path, estimate_completion_hours, failed_ancestry, get_executable_tasks,
    get_levels, graph_stats, CriticalPath, GraphStats, DEFAULT_TASK_HOURS,
};
pub use status::{StatusBoard, StatusError};
pub use executor::{ExecutorRegistry, TaskExecutor};
pub use selector::{ExecutorSelector, RoutingSelector};
pub use engine::{Budget, EngineConfig, ExecutionEngine, RunReport, TaskRun};
pub use error::{ExecutionError, Result};
