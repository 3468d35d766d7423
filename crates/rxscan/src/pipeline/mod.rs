pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::RunContext;
pub use error::{ImageWarning, PipelineError};
pub use progress::{
    progress_channel, BroadcastProgress, JobPhase, JobProgressEvent, NoopProgress, ProgressEvent,
    ProgressReporter,
};
pub use runner::{Coordinator, RunOutcome};
