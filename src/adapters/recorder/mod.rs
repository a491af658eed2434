//! Durable interaction recorder adapters.

mod file_recorder;

pub use file_recorder::{FileInteractionRecorder, FileRecorderConfig, SweepReport};
