//! Postgres-backed collaborators

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::bidding::PredictionSignals;
use crate::common::errors::{GatewayError, Result};
use crate::common::traits::{AnalyticsSink, PredictionSource, RateLimitStore};
use crate::common::types::PlatformId;
use crate::config::types::DatabaseConfig;
use crate::dispatch::{AnalyticsRecord, AppendReceipt, PlatformResult};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Open a connection pool
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect(&config.url)
        .await?;
    info!(max_connections = config.max_connections, "Connected to database");
    Ok(pool)
}

/// Create the gateway's tables if they are missing
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in schema_statements() {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("Database schema ensured");
    Ok(())
}

fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA.split(';').map(str::trim).filter(|s| {
        s.lines()
            .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
    })
}

/// Analytics sink writing one row per event_id
#[derive(Debug, Clone)]
pub struct PostgresAnalyticsSink {
    pool: PgPool,
}

impl PostgresAnalyticsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsSink for PostgresAnalyticsSink {
    #[instrument(skip_all, fields(event_id = %record.event.event_id))]
    async fn append(&self, record: &AnalyticsRecord) -> Result<AppendReceipt> {
        let body = serde_json::to_string(record)?;
        let event = &record.event;
        let recommendation = record.recommendation.as_ref();

        let result = sqlx::query(
            r#"
            INSERT INTO tracking_events (
                event_id, subject_id, event_name, occurred_at, value, currency,
                trust_score, trust_action, strategy, multiplier, record, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::jsonb, $12)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.subject_id)
        .bind(event.event_name.as_str())
        .bind(event.occurred_at)
        .bind(event.value)
        .bind(&event.currency)
        .bind(record.assessment.score)
        .bind(record.assessment.action.to_string())
        .bind(recommendation.map(|r| r.strategy.as_str()))
        .bind(recommendation.map(|r| r.multiplier))
        .bind(body)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::persistence(&event.event_id, e.to_string()))?;

        Ok(AppendReceipt {
            duplicate: result.rows_affected() == 0,
        })
    }

    async fn record_delivery(
        &self,
        event_id: &str,
        results: &BTreeMap<PlatformId, PlatformResult>,
    ) -> Result<()> {
        let body = serde_json::to_string(results)?;
        sqlx::query("UPDATE tracking_events SET delivery = $2::jsonb WHERE event_id = $1")
            .bind(event_id)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Reads the batch pipeline's `subject_predictions` table
#[derive(Debug, Clone)]
pub struct PostgresPredictionSource {
    pool: PgPool,
}

impl PostgresPredictionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PredictionSource for PostgresPredictionSource {
    async fn get(&self, subject_id: &str) -> Result<Option<PredictionSignals>> {
        let row = sqlx::query(
            r#"
            SELECT ltv_percentile, propensity_score, churn_probability,
                   recency_days, engagement_score, computed_at
            FROM subject_predictions
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(PredictionSignals {
            ltv_percentile: row.try_get("ltv_percentile")?,
            propensity_score: row.try_get("propensity_score")?,
            churn_probability: row.try_get("churn_probability")?,
            recency_days: row.try_get("recency_days")?,
            engagement_score: row.try_get("engagement_score")?,
            computed_at: row.try_get("computed_at")?,
        }))
    }
}

/// Rate-limit counter kept in a single upserted row per key
#[derive(Debug, Clone)]
pub struct PostgresRateLimitStore {
    pool: PgPool,
}

impl PostgresRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PostgresRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        // One statement, so concurrent increments serialize on the row lock
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_counters (key, count, expires_at)
            VALUES ($1, 1, now() + make_interval(secs => $2))
            ON CONFLICT (key) DO UPDATE SET
                count = CASE
                    WHEN rate_limit_counters.expires_at <= now() THEN 1
                    ELSE rate_limit_counters.count + 1
                END,
                expires_at = CASE
                    WHEN rate_limit_counters.expires_at <= now() THEN EXCLUDED.expires_at
                    ELSE rate_limit_counters.expires_at
                END
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(window.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let purged = sqlx::query("DELETE FROM rate_limit_counters WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(purged)
    }
}
