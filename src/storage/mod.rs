//! Storage-backed collaborators: analytics sink, prediction lookup and the
//! rate-limit counter, in Postgres and in-memory flavors

mod memory;
mod postgres;

pub use memory::{InMemoryAnalyticsSink, InMemoryPredictionSource, InMemoryRateLimitStore};
pub use postgres::{
    connect, ensure_schema, PostgresAnalyticsSink, PostgresPredictionSource,
    PostgresRateLimitStore,
};
