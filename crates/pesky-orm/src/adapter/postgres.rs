//! PostgreSQL adapter over a sqlx pool.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as _, Executor, Postgres, Row, Type, TypeInfo};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{session_statements, sql_preview, Adapter, DbRow, ExecResult};
use crate::config::{ConnectionConfig, ExecutorConfig, PoolConfig};
use crate::dialect::Dialect;
use crate::value::Value;
use crate::{OrmError, Result};

/// PostgreSQL connection pool running rendered statements.
#[derive(Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
    executor: ExecutorConfig,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresAdapter {
    /// Creates a pool with retry logic and per-connection session settings.
    #[instrument(skip(config), fields(
        host = %config.host,
        database = %config.database,
        max_connections = config.pool.max_connections,
        max_retries = config.pool.retry.max_retries
    ))]
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        if config.driver != Dialect::Postgres {
            return Err(OrmError::Configuration(format!(
                "PostgresAdapter cannot connect with driver '{}'",
                config.driver
            )));
        }
        let url = config.to_url()?;
        info!("Initializing connection pool");

        let connect_options = PgConnectOptions::from_str(url.as_str())
            .map_err(|e| OrmError::Connection(format!("Invalid connection URI: {}", e)))?;

        let statements = session_statements(config);
        let pool_options = pool_options(&config.pool).after_connect(move |conn, _meta| {
            let statements = statements.clone();
            Box::pin(async move {
                for statement in &statements {
                    (&mut *conn).execute(statement.as_str()).await?;
                }
                Ok(())
            })
        });

        let pool = connect_with_retry(pool_options, connect_options, &config.pool).await?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to verify connection: {}", e)))?;

        info!("Connection pool initialized successfully");
        Ok(Self {
            pool,
            executor: config.executor.clone(),
        })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            executor: ExecutorConfig::default(),
        }
    }

    pub fn with_executor_config(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the pool, waiting for checked-out connections.
    pub async fn close(&self) {
        info!("Closing connection pool");
        self.pool.close().await;
    }

    fn log_completion(&self, sql: &str, elapsed: Duration) {
        if elapsed > self.executor.slow_query_threshold() {
            warn!(
                sql = %sql_preview(sql),
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.executor.slow_query_threshold_ms,
                "Slow statement detected"
            );
        } else {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Statement completed");
        }
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    #[instrument(skip(self, sql), fields(sql_preview = %sql_preview(sql)))]
    async fn execute(&self, sql: &str) -> Result<ExecResult> {
        let start = Instant::now();
        let result = sqlx::query(sql).persistent(false).execute(&self.pool).await?;
        self.log_completion(sql, start.elapsed());
        Ok(ExecResult::affected(result.rows_affected()))
    }

    #[instrument(skip(self, sql), fields(sql_preview = %sql_preview(sql)))]
    async fn query(&self, sql: &str) -> Result<Vec<DbRow>> {
        let start = Instant::now();
        let rows = sqlx::query(sql).persistent(false).fetch_all(&self.pool).await?;
        self.log_completion(sql, start.elapsed());
        rows.iter().map(row_to_values).collect()
    }
}

fn pool_options(config: &PoolConfig) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout));
    if let Some(max_lifetime_secs) = config.max_lifetime {
        options = options.max_lifetime(Duration::from_secs(max_lifetime_secs));
    }
    if let Some(idle_timeout_secs) = config.idle_timeout {
        options = options.idle_timeout(Duration::from_secs(idle_timeout_secs));
    }
    options
}

/// Attempts to connect with exponential backoff retry.
async fn connect_with_retry(
    pool_options: PgPoolOptions,
    connect_options: PgConnectOptions,
    config: &PoolConfig,
) -> Result<PgPool> {
    let retry = &config.retry;
    let mut last_error = None;

    for attempt in 0..=retry.max_retries {
        match pool_options.clone().connect_with(connect_options.clone()).await {
            Ok(pool) => {
                if attempt > 0 {
                    info!(attempt = attempt, "Connection established after retry");
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt < retry.max_retries {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(OrmError::Connection(format!(
        "Failed to connect after {} attempts: {}",
        retry.max_retries + 1,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Converts a PostgreSQL row into ordered column values.
pub(crate) fn row_to_values(row: &PgRow) -> Result<DbRow> {
    let mut values = DbRow::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOL" => decode::<bool>(row, idx, name, Value::Bool)?,
            "INT2" => decode::<i16>(row, idx, name, |v| Value::Int(v.into()))?,
            "INT4" => decode::<i32>(row, idx, name, |v| Value::Int(v.into()))?,
            "INT8" => decode::<i64>(row, idx, name, Value::Int)?,
            "OID" => decode::<sqlx::postgres::types::Oid>(row, idx, name, |v| Value::Int(v.0.into()))?,
            "FLOAT4" => decode::<f32>(row, idx, name, |v| Value::Float(v.into()))?,
            "FLOAT8" => decode::<f64>(row, idx, name, Value::Float)?,
            "NUMERIC" => decode::<Decimal>(row, idx, name, Value::Decimal)?,
            "VARCHAR" | "TEXT" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
                decode::<String>(row, idx, name, Value::String)?
            }
            "BYTEA" => decode::<Vec<u8>>(row, idx, name, Value::Bytes)?,
            "UUID" => decode::<Uuid>(row, idx, name, Value::Uuid)?,
            "DATE" => decode::<NaiveDate>(row, idx, name, Value::Date)?,
            "TIME" => decode::<NaiveTime>(row, idx, name, Value::Time)?,
            "TIMESTAMP" => decode::<NaiveDateTime>(row, idx, name, Value::Timestamp)?,
            "TIMESTAMPTZ" => decode::<DateTime<Utc>>(row, idx, name, |v| Value::TimestampTz(v.fixed_offset()))?,
            "JSON" | "JSONB" => decode::<JsonValue>(row, idx, name, Value::Json)?,
            "_BOOL" => decode::<Vec<bool>>(row, idx, name, |v| array(v, Value::Bool))?,
            "_INT2" => decode::<Vec<i16>>(row, idx, name, |v| array(v, |i| Value::Int(i.into())))?,
            "_INT4" => decode::<Vec<i32>>(row, idx, name, |v| array(v, |i| Value::Int(i.into())))?,
            "_INT8" => decode::<Vec<i64>>(row, idx, name, |v| array(v, Value::Int))?,
            "_FLOAT8" => decode::<Vec<f64>>(row, idx, name, |v| array(v, Value::Float))?,
            "_TEXT" | "_VARCHAR" => decode::<Vec<String>>(row, idx, name, |v| array(v, Value::String))?,
            "_UUID" => decode::<Vec<Uuid>>(row, idx, name, |v| array(v, Value::Uuid))?,
            unknown => {
                warn!(
                    column = %name,
                    pg_type = %unknown,
                    "Unknown PostgreSQL type, attempting string extraction"
                );
                decode::<String>(row, idx, name, Value::String)?
            }
        };

        values.insert(name.to_string(), value);
    }

    Ok(values)
}

fn decode<'r, T>(row: &'r PgRow, idx: usize, column: &str, convert: impl FnOnce(T) -> Value) -> Result<Value>
where
    T: sqlx::Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Ok(convert(v)),
        Ok(None) => Ok(Value::Null),
        Err(e) => Err(OrmError::Serialization(format!(
            "Failed to extract column '{}': {}",
            column, e
        ))),
    }
}

fn array<T>(items: Vec<T>, convert: impl Fn(T) -> Value) -> Value {
    Value::Array(items.into_iter().map(convert).collect())
}
