//! The job execution engine.
//!
//! Jobs are pushed onto an in-process FIFO queue and drained by a fixed pool
//! of workers. Each running job gets a runtime handle carrying a cancellation
//! flag and a broadcast channel for live output; slow observers lag and drop
//! chunks rather than stalling the deploy.

pub mod engine;
pub mod queue;
mod worker;

pub use engine::{EngineSettings, JobEngine, JobTransition, LiveChunk};
pub use queue::JobQueue;
