use std::collections::HashMap;

use async_trait::async_trait;
use r2d2_sqlite::rusqlite::{self, params};
use serde_json::json;
use time::OffsetDateTime;
use tokio::task::spawn_blocking;

use crate::db::DbPool;
use crate::errors::Result;
use crate::logging::log_event;

/// Flat string key/value persistence used by the settings store.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn get_all(&self) -> Result<HashMap<String, String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Settings persisted in the `app_settings` table.
#[derive(Clone)]
pub struct SqliteSettingsBackend {
    pool: DbPool,
}

impl SqliteSettingsBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }
}

#[async_trait]
impl SettingsBackend for SqliteSettingsBackend {
    async fn get_all(&self) -> Result<HashMap<String, String>> {
        let pool = self.pool.clone();
        spawn_blocking(move || {
            let conn = pool.get()?;
            read_all(&conn)
        })
        .await?
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let value = value.to_string();
        spawn_blocking(move || {
            let conn = pool.get()?;
            upsert_setting(&conn, &key, &value)?;
            if let Err(err) = log_event(
                &conn,
                "info",
                Some("SET-0001"),
                "settings",
                "setting updated",
                None,
                Some(json!({ "key": key })),
            ) {
                log::warn!("could not record settings audit event: {err}");
            }
            Ok(())
        })
        .await?
    }
}

fn read_all(conn: &rusqlite::Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    let mut settings = HashMap::new();
    for row in rows {
        let (key, value) = row?;
        settings.insert(key, value);
    }
    Ok(settings)
}

fn upsert_setting(conn: &rusqlite::Connection, key: &str, value: &str) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )?;
    Ok(())
}
