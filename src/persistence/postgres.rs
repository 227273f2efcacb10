//! PostgreSQL implementation of the command and device stores.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{CommandRow, DeviceRow};
use super::{CommandStore, DeviceStore};
use crate::config::GatewayConfig;
use crate::domain::{Command, CommandId, Device, DeviceId, DeviceStatus};
use crate::error::GatewayError;

const UNIQUE_VIOLATION: &str = "23505";

/// Opens a connection pool from the gateway configuration and applies
/// the embedded migrations.
///
/// # Errors
///
/// Returns [`GatewayError::PersistenceError`] if the database is
/// unreachable or a migration fails.
pub async fn connect(config: &GatewayConfig) -> Result<PgPool, GatewayError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database_connect_timeout_secs,
        ))
        .connect(&config.database_url)
        .await
        .map_err(db_error)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

    tracing::info!("database migrations applied");
    Ok(pool)
}

fn db_error(e: sqlx::Error) -> GatewayError {
    GatewayError::PersistenceError(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

/// PostgreSQL-backed [`CommandStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresCommandStore {
    pool: PgPool,
}

impl PostgresCommandStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommandStore for PostgresCommandStore {
    async fn get(&self, id: CommandId) -> Result<Command, GatewayError> {
        let row = sqlx::query_as::<_, CommandRow>(
            "SELECT id, raybot_id, command_type, status, inputs, created_at, completed_at \
             FROM commands WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(GatewayError::CommandNotFound(id))?;

        Command::try_from(row)
    }

    async fn list_by_device(&self, device_id: DeviceId) -> Result<Vec<Command>, GatewayError> {
        let rows = sqlx::query_as::<_, CommandRow>(
            "SELECT id, raybot_id, command_type, status, inputs, created_at, completed_at \
             FROM commands WHERE raybot_id = $1 ORDER BY created_at ASC",
        )
        .bind(*device_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Command::try_from).collect()
    }

    async fn create(&self, command: &Command) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO commands (id, raybot_id, command_type, status, inputs, created_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*command.id.as_uuid())
        .bind(*command.device_id.as_uuid())
        .bind(command.command_type.as_str())
        .bind(command.status.as_str())
        .bind(&command.inputs)
        .bind(command.created_at)
        .bind(command.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn update(&self, command: &Command) -> Result<(), GatewayError> {
        let result = sqlx::query("UPDATE commands SET status = $2, completed_at = $3 WHERE id = $1")
            .bind(*command.id.as_uuid())
            .bind(command.status.as_str())
            .bind(command.completed_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::CommandNotFound(command.id));
        }
        Ok(())
    }

    async fn delete(&self, id: CommandId) -> Result<(), GatewayError> {
        let result = sqlx::query("DELETE FROM commands WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::CommandNotFound(id));
        }
        Ok(())
    }
}

/// PostgreSQL-backed [`DeviceStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresDeviceStore {
    pool: PgPool,
}

impl PostgresDeviceStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceStore for PostgresDeviceStore {
    async fn get(&self, id: DeviceId) -> Result<Device, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT id, name, token, status, created_at, updated_at FROM raybots WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(GatewayError::DeviceNotFound(id))?;

        Device::try_from(row)
    }

    async fn list(&self) -> Result<Vec<Device>, GatewayError> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            "SELECT id, name, token, status, created_at, updated_at FROM raybots \
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Device::try_from).collect()
    }

    async fn create(&self, device: &Device) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO raybots (id, name, token, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*device.id.as_uuid())
        .bind(&device.name)
        .bind(&device.token)
        .bind(device.status.as_str())
        .bind(device.created_at)
        .bind(device.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatewayError::DeviceAlreadyExists(device.id)
            } else {
                db_error(e)
            }
        })?;

        Ok(())
    }

    async fn delete(&self, id: DeviceId) -> Result<(), GatewayError> {
        let result = sqlx::query("DELETE FROM raybots WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::DeviceNotFound(id));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: DeviceId,
        status: DeviceStatus,
    ) -> Result<Device, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "UPDATE raybots SET status = $2, updated_at = $3 WHERE id = $1 \
             RETURNING id, name, token, status, created_at, updated_at",
        )
        .bind(*id.as_uuid())
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(GatewayError::DeviceNotFound(id))?;

        Device::try_from(row)
    }
}
