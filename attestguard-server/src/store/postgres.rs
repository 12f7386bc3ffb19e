//! PostgreSQL storage for device records

use std::collections::BTreeMap;

use async_trait::async_trait;
use attestguard_core::{DeviceRecord, RiskScore, TrustLevel};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{DeviceRecordStore, DeviceUpdate, StoreError};

const SELECT_RECORD: &str = r#"
    SELECT id, key_id, public_key_base64, trust_level, attestation_verified,
           assertion_counter, verification_count, risk_score, flags,
           created_at, updated_at, last_seen, version
    FROM device_records
    WHERE key_id = $1
"#;

/// PostgreSQL-backed device record storage
pub struct PostgresDeviceStore {
    pool: PgPool,
}

impl PostgresDeviceStore {
    /// Create a new PostgreSQL device store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(max_connections, "Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn insert(&self, record: &DeviceRecord, flags: &serde_json::Value) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO device_records
                (id, key_id, public_key_base64, trust_level, attestation_verified,
                 assertion_counter, verification_count, risk_score, flags,
                 created_at, updated_at, last_seen, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (key_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.key_id)
        .bind(record.public_key_base64.as_deref())
        .bind(record.trust_level.as_str())
        .bind(record.attestation_verified)
        .bind(i64::from(record.assertion_counter))
        .bind(i64::from(record.verification_count))
        .bind(i16::from(record.risk_score.value()))
        .bind(flags)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.last_seen)
        .bind(version_column(record.version)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn update(
        &self,
        record: &DeviceRecord,
        flags: &serde_json::Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        // The stored key is never replaced once set
        let result = sqlx::query(
            r#"
            UPDATE device_records
            SET public_key_base64 = COALESCE(public_key_base64, $2),
                trust_level = $3,
                attestation_verified = $4,
                assertion_counter = $5,
                verification_count = $6,
                risk_score = $7,
                flags = $8,
                updated_at = $9,
                last_seen = $10,
                version = $11
            WHERE key_id = $1 AND version = $12
            "#,
        )
        .bind(&record.key_id)
        .bind(record.public_key_base64.as_deref())
        .bind(record.trust_level.as_str())
        .bind(record.attestation_verified)
        .bind(i64::from(record.assertion_counter))
        .bind(i64::from(record.verification_count))
        .bind(i16::from(record.risk_score.value()))
        .bind(flags)
        .bind(record.updated_at)
        .bind(record.last_seen)
        .bind(version_column(record.version)?)
        .bind(version_column(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DeviceRecordStore for PostgresDeviceStore {
    async fn get(&self, key_id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let row = sqlx::query_as::<_, DeviceRow>(SELECT_RECORD)
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        row.map(DeviceRow::into_record).transpose()
    }

    async fn upsert(&self, update: DeviceUpdate) -> Result<DeviceRecord, StoreError> {
        let flags = serde_json::to_value(&update.record.flags)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let affected = match update.expected_version {
            None => self.insert(&update.record, &flags).await?,
            Some(expected) => self.update(&update.record, &flags, expected).await?,
        };
        if affected == 0 {
            tracing::debug!(key_id = %update.record.key_id, "Device record write lost a version race");
            return Err(update.conflict());
        }

        tracing::debug!(key_id = %update.record.key_id, "Device record stored in database");
        self.get(&update.record.key_id)
            .await?
            .ok_or_else(|| StoreError::Query("Record missing after write".into()))
    }

    /// Check database connection health
    async fn check_health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

/// Database row for device records
#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: Uuid,
    key_id: String,
    public_key_base64: Option<String>,
    trust_level: String,
    attestation_verified: bool,
    assertion_counter: i64,
    verification_count: i64,
    risk_score: i16,
    flags: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    version: i64,
}

fn version_column(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Serialization(format!("version out of range: {version}")))
}

impl DeviceRow {
    fn into_record(self) -> Result<DeviceRecord, StoreError> {
        let trust_level: TrustLevel = self.trust_level.parse().map_err(StoreError::Serialization)?;
        let flags: BTreeMap<String, bool> =
            serde_json::from_value(self.flags).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let counter = |value: i64, column: &str| {
            u32::try_from(value).map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
        };
        let risk = u8::try_from(self.risk_score)
            .map_err(|_| StoreError::Serialization(format!("risk_score out of range: {}", self.risk_score)))?;

        Ok(DeviceRecord {
            id: self.id,
            key_id: self.key_id,
            public_key_base64: self.public_key_base64,
            trust_level,
            attestation_verified: self.attestation_verified,
            assertion_counter: counter(self.assertion_counter, "assertion_counter")?,
            verification_count: counter(self.verification_count, "verification_count")?,
            risk_score: RiskScore::new(risk),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_seen: self.last_seen,
            flags,
            version: u64::try_from(self.version)
                .map_err(|_| StoreError::Serialization(format!("version out of range: {}", self.version)))?,
        })
    }
}

impl std::fmt::Debug for PostgresDeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDeviceStore")
            .field("pool", &"<PgPool>")
            .finish()
    }
}
