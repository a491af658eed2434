//! Interaction audit trail types.

mod record;

pub use record::{
    latest_by_id, InteractionRecord, InteractionStage, PerformanceMetrics, RetentionClass,
};
