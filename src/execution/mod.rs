//! Matrix execution: sessions, command runners, job executor and engine

pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod session;
pub mod shell;
pub mod tools;

pub use engine::{EngineError, EventBus, ExecutionEngine, ExecutionEvent};
pub use executor::{JobExecutor, JobPlan};
pub use scheduler::SchedulingStrategy;
pub use shell::{CommandOutput, CommandRequest, CommandRunner, RunError, SystemShell};
