//! The buffering and pacing pipeline: reader thread -> CPU buffer -> GPU slots -> display.

pub mod buffer;
pub mod movie;
pub mod progress;
pub mod scheduler;

pub use buffer::{BoundedBuffer, PushError};
pub use movie::Movie;
pub use progress::ProgressTracker;
pub use scheduler::{ReadScheduler, ReadShared, SampleSource, StepOutcome};
