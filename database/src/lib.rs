use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use weather_core::{CoreError, DatabaseError, LogEntry, LogKind, StateStore};

const LAST_POST_URI_KEY: &str = "last_post_uri";

pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    /// Opens the pool, creating the database file if it does not exist yet.
    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    /// Connect and migrate in one go.
    pub async fn open(connection_string: impl Into<String>) -> Result<Self, CoreError> {
        let mut db = Self::new(connection_string.into());
        db.connect().await?;
        db.run_migrations().await?;
        Ok(db)
    }

    fn pool(&self) -> Result<&SqlitePool, DatabaseError> {
        self.pool.as_ref().ok_or(DatabaseError::NotConnected)
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool()?)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, CoreError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;
        Ok(value)
    }

    pub async fn delete_setting(&self, key: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

impl StateStore for Database {
    async fn last_post_uri(&self) -> Result<Option<String>, CoreError> {
        Ok(self
            .get_setting(LAST_POST_URI_KEY)
            .await?
            .filter(|uri| !uri.is_empty()))
    }

    async fn set_last_post_uri(&self, uri: &str) -> Result<(), CoreError> {
        self.save_setting(LAST_POST_URI_KEY, uri).await
    }

    async fn load_log(&self, kind: LogKind) -> Result<Vec<LogEntry>, CoreError> {
        match self.get_setting(kind.key()).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_log(&self, kind: LogKind, entries: &[LogEntry]) -> Result<(), CoreError> {
        let raw = serde_json::to_string(entries)?;
        self.save_setting(kind.key(), &raw).await
    }
}

#[cfg(test)]
mod tests;
