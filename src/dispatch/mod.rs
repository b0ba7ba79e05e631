//! Event dispatch: gating, concurrent platform fan-out and analytics persistence

mod orchestrator;
mod outcome;

pub use orchestrator::DispatchOrchestrator;
pub use outcome::{
    AnalyticsRecord, AppendReceipt, DeliveryStatus, DispatchOutcome, EventStage, PlatformResult,
};
