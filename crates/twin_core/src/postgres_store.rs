//! Store PostgreSQL com pool de conexões (r2d2).
//!
//! Tabela `<schema>.sensor_data`; `aud_insert_ts` vem do default do banco e
//! volta via `RETURNING`, então o timestamp de ingestão é sempre hora do
//! servidor.

use crate::config::DatabaseConfig;
use crate::store::{ReadingStore, StoreError};
use crate::types::{Reading, Sample, TEMPERATURE_UNIT};
use chrono::{DateTime, Utc};
use postgres::{NoTls, Row};
use r2d2_postgres::PostgresConnectionManager;
use std::time::Duration;
use tracing::info;

/// Pool compartilhado entre ingestão e relatórios.
pub type PgPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;

/// Nome da tabela de leituras.
pub const TABLE_NAME: &str = "sensor_data";

const COLUMNS: &str = "temperature, humidity, uptime, payload, aud_insert_ts";

/// Aceita só identificadores simples (`[a-z_][a-z0-9_]*`, até 63 bytes).
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// SQL montado uma vez por schema.
#[derive(Debug, Clone)]
struct Statements {
    create: String,
    insert: String,
    latest: String,
    range: String,
    recent: String,
}

impl Statements {
    fn for_schema(schema: &str) -> Result<Self, StoreError> {
        if !is_valid_identifier(schema) {
            return Err(StoreError::InvalidIdentifier(schema.to_string()));
        }
        let table = format!("{schema}.{TABLE_NAME}");

        Ok(Self {
            create: format!(
                "CREATE SCHEMA IF NOT EXISTS {schema};
                 CREATE TABLE IF NOT EXISTS {table} (
                     id            BIGSERIAL PRIMARY KEY,
                     temperature   DOUBLE PRECISION NOT NULL,
                     unit          TEXT NOT NULL DEFAULT '{TEMPERATURE_UNIT}',
                     humidity      DOUBLE PRECISION,
                     uptime        BIGINT,
                     payload       JSONB,
                     aud_insert_ts TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
                 );
                 CREATE INDEX IF NOT EXISTS {TABLE_NAME}_aud_insert_ts_idx
                     ON {table} (aud_insert_ts DESC);"
            ),
            insert: format!(
                "INSERT INTO {table} (temperature, unit, humidity, uptime, payload) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING aud_insert_ts"
            ),
            latest: format!(
                "SELECT {COLUMNS} FROM {table} ORDER BY aud_insert_ts DESC LIMIT 1"
            ),
            range: format!(
                "SELECT {COLUMNS} FROM {table} WHERE aud_insert_ts >= $1 \
                 ORDER BY aud_insert_ts DESC"
            ),
            recent: format!(
                "SELECT {COLUMNS} FROM {table} ORDER BY aud_insert_ts DESC LIMIT $1"
            ),
        })
    }
}

/// [`ReadingStore`] sobre PostgreSQL.
///
/// `ingested_at` vem de `clock_timestamp()` no servidor: só é
/// não-decrescente enquanto o relógio do banco não andar para trás.
pub struct PostgresStore {
    pool: PgPool,
    sql: Statements,
}

impl PostgresStore {
    /// Cria o pool a partir da configuração.
    ///
    /// O pool é lazy: nenhuma conexão é aberta aqui, então um banco fora do
    /// ar não impede o bridge de subir (os appends falham e são logados).
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pg_config: postgres::Config = config.connection_string().parse()?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = r2d2::Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(0))
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build_unchecked(manager);

        info!(
            "Pool PostgreSQL configurado: {}:{}/{} (schema {}, até {} conexões)",
            config.host, config.port, config.dbname, config.schema, config.pool_size
        );
        Self::with_pool(pool, &config.schema)
    }

    /// Usa um pool já existente (compartilhado com outro componente).
    pub fn with_pool(pool: PgPool, schema: &str) -> Result<Self, StoreError> {
        Ok(Self {
            pool,
            sql: Statements::for_schema(schema)?,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cria schema, tabela e índice se ainda não existirem.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        conn.batch_execute(&self.sql.create)?;
        info!("Schema verificado ({TABLE_NAME})");
        Ok(())
    }

    fn query_readings(
        &self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Reading>, StoreError> {
        let mut conn = self.pool.get()?;
        conn.query(sql, params)?.iter().map(row_to_reading).collect()
    }
}

fn row_to_reading(row: &Row) -> Result<Reading, StoreError> {
    let uptime: Option<i64> = row.try_get("uptime")?;
    let uptime = uptime
        .map(u64::try_from)
        .transpose()
        .map_err(|_| StoreError::OutOfRange("uptime negativo no banco".into()))?;

    Ok(Reading {
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
        uptime,
        payload: row.try_get("payload")?,
        ingested_at: row.try_get("aud_insert_ts")?,
    })
}

impl ReadingStore for PostgresStore {
    fn append(&self, sample: Sample) -> Result<Reading, StoreError> {
        let uptime = sample
            .uptime
            .map(i64::try_from)
            .transpose()
            .map_err(|_| StoreError::OutOfRange(format!("uptime {:?}", sample.uptime)))?;

        let mut conn = self.pool.get()?;
        let row = conn.query_one(
            &self.sql.insert,
            &[
                &sample.temperature,
                &TEMPERATURE_UNIT,
                &sample.humidity,
                &uptime,
                &sample.payload,
            ],
        )?;
        let ingested_at: DateTime<Utc> = row.try_get(0)?;
        Ok(Reading::from_sample(sample, ingested_at))
    }

    fn latest(&self) -> Result<Option<Reading>, StoreError> {
        Ok(self.query_readings(&self.sql.latest, &[])?.into_iter().next())
    }

    fn range(&self, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        self.query_readings(&self.sql.range, &[&since])
    }

    fn recent(&self, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_readings(&self.sql.recent, &[&limit])
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(is_valid_identifier("edu_iot_digital_twin_lab"));
        assert!(is_valid_identifier("_lab2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2lab"));
        assert!(!is_valid_identifier("Lab"));
        assert!(!is_valid_identifier("lab; DROP TABLE x"));
        assert!(!is_valid_identifier("a.b"));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn statements_target_schema_table() {
        let sql = Statements::for_schema("curriculum_iot_digital_twin_lab").unwrap();
        assert!(sql.insert.contains("INSERT INTO curriculum_iot_digital_twin_lab.sensor_data"));
        assert!(sql.insert.contains("RETURNING aud_insert_ts"));
        assert!(sql.range.contains("aud_insert_ts >= $1"));
        assert!(sql.range.contains("ORDER BY aud_insert_ts DESC"));
        assert!(sql.recent.ends_with("LIMIT $1"));
        assert!(sql.create.contains("DEFAULT clock_timestamp()"));
    }

    #[test]
    fn rejects_unsafe_schema() {
        assert!(matches!(
            Statements::for_schema("x; --"),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }
}
