//! Postgres-backed record store.
//!
//! ## Schema
//!
//! `policy_records` keeps one row per user. `ports`, `domains` and
//! `subdomains` are stored as JSON text so mixed number/string port entries
//! survive unchanged. `upstream_servers` holds the server directory keyed by
//! name. [`PostgresRecordStore::ensure_schema`] creates both tables if missing.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Unexpected` |
//! | PoolClosed / Io / other | N/A | `Unexpected` |

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use portgate_core::{PolicyRecord, UpstreamServer};

use super::{RecordStore, StoreError, StoreResult};

/// Postgres-backed record store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect with a small pool. The URL is never logged.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS policy_records (
                username    TEXT PRIMARY KEY,
                token       TEXT NOT NULL,
                comment     TEXT NOT NULL DEFAULT '',
                ports       TEXT NOT NULL DEFAULT '[]',
                domains     TEXT NOT NULL DEFAULT '[]',
                subdomains  TEXT NOT NULL DEFAULT '[]',
                enable      BOOLEAN NOT NULL DEFAULT TRUE,
                server      TEXT NOT NULL DEFAULT '',
                create_date TEXT NOT NULL DEFAULT '',
                expire_date TEXT NOT NULL DEFAULT '',
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upstream_servers (
                name           TEXT PRIMARY KEY,
                dashboard_addr TEXT NOT NULL,
                dashboard_port INTEGER NOT NULL DEFAULT 0,
                dashboard_user TEXT NOT NULL DEFAULT '',
                dashboard_pwd  TEXT NOT NULL DEFAULT '',
                dashboard_tls  BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }
}

/// Column values of a record, with the list fields encoded as JSON text.
struct RecordRow {
    ports: String,
    domains: String,
    subdomains: String,
}

impl RecordRow {
    fn encode(record: &PolicyRecord) -> StoreResult<Self> {
        let json = |value: serde_json::Result<String>| {
            value.map_err(|e| StoreError::Unexpected(anyhow!("encode {}: {e}", record.user)))
        };
        Ok(Self {
            ports: json(serde_json::to_string(&record.ports))?,
            domains: json(serde_json::to_string(&record.domains))?,
            subdomains: json(serde_json::to_string(&record.subdomains))?,
        })
    }
}

fn decode_record(row: &PgRow) -> anyhow::Result<PolicyRecord> {
    let user: String = row.try_get("username")?;
    let list = |column: &str| -> anyhow::Result<String> {
        let text: String = row.try_get(column)?;
        Ok(if text.trim().is_empty() { "[]".to_string() } else { text })
    };

    let ports = serde_json::from_str(&list("ports")?)
        .map_err(|e| anyhow!("user [{user}] ports column: {e}"))?;
    let domains = serde_json::from_str(&list("domains")?)
        .map_err(|e| anyhow!("user [{user}] domains column: {e}"))?;
    let subdomains = serde_json::from_str(&list("subdomains")?)
        .map_err(|e| anyhow!("user [{user}] subdomains column: {e}"))?;
    let server: String = row.try_get("server")?;

    Ok(PolicyRecord {
        token: row.try_get("token")?,
        comment: row.try_get("comment")?,
        ports,
        domains,
        subdomains,
        enabled: row.try_get("enable")?,
        server: Some(server).filter(|s| !s.trim().is_empty()),
        create_date: row.try_get("create_date")?,
        expire_date: row.try_get("expire_date")?,
        user,
    })
}

fn decode_server(row: &PgRow) -> Result<UpstreamServer, sqlx::Error> {
    let port: i32 = row.try_get("dashboard_port")?;
    Ok(UpstreamServer {
        name: row.try_get("name")?,
        dashboard_addr: row.try_get("dashboard_addr")?,
        dashboard_port: u16::try_from(port).unwrap_or_default(),
        dashboard_user: row.try_get("dashboard_user")?,
        dashboard_pwd: row.try_get("dashboard_pwd")?,
        dashboard_tls: row.try_get("dashboard_tls")?,
    })
}

const RECORD_COLUMNS: &str = "username, token, comment, ports, domains, subdomains, enable, server, create_date, expire_date";

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self), err)]
    async fn load_all(&self) -> StoreResult<Vec<PolicyRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM policy_records ORDER BY username ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_record(row) {
                Ok(record) => records.push(record),
                Err(err) => warn!(error = %err, "skipping undecodable policy record row"),
            }
        }
        Ok(records)
    }

    #[instrument(skip(self), err)]
    async fn find(&self, user: &str) -> StoreResult<Option<PolicyRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM policy_records WHERE username = $1"
        ))
        .bind(user)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find", e))?;

        row.map(|row| decode_record(&row))
            .transpose()
            .map_err(StoreError::Unexpected)
    }

    #[instrument(skip(self, record), fields(user = %record.user), err)]
    async fn create(&self, record: &PolicyRecord) -> StoreResult<()> {
        let encoded = RecordRow::encode(record)?;
        sqlx::query(
            r#"
            INSERT INTO policy_records (
                username, token, comment, ports, domains, subdomains,
                enable, server, create_date, expire_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&record.user)
        .bind(&record.token)
        .bind(&record.comment)
        .bind(&encoded.ports)
        .bind(&encoded.domains)
        .bind(&encoded.subdomains)
        .bind(record.enabled)
        .bind(record.server.as_deref().unwrap_or(""))
        .bind(&record.create_date)
        .bind(&record.expire_date)
        .execute(&*self.pool)
        .await
        .map_err(|e| match map_sqlx_error("create", e) {
            StoreError::Conflict(_) => StoreError::Conflict(record.user.clone()),
            other => other,
        })?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(user = %record.user), err)]
    async fn update(&self, record: &PolicyRecord) -> StoreResult<()> {
        let encoded = RecordRow::encode(record)?;
        let result = sqlx::query(
            r#"
            UPDATE policy_records SET
                token = $2,
                comment = $3,
                ports = $4,
                domains = $5,
                subdomains = $6,
                enable = $7,
                server = $8,
                create_date = $9,
                expire_date = $10,
                updated_at = NOW()
            WHERE username = $1
            "#,
        )
        .bind(&record.user)
        .bind(&record.token)
        .bind(&record.comment)
        .bind(&encoded.ports)
        .bind(&encoded.domains)
        .bind(&encoded.subdomains)
        .bind(record.enabled)
        .bind(record.server.as_deref().unwrap_or(""))
        .bind(&record.create_date)
        .bind(&record.expire_date)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.user.clone()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, user: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM policy_records WHERE username = $1")
            .bind(user)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn set_enabled(&self, user: &str, enabled: bool) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE policy_records SET enable = $2, updated_at = NOW() WHERE username = $1",
        )
        .bind(user)
        .bind(enabled)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_enabled", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_servers(&self) -> StoreResult<Vec<UpstreamServer>> {
        let rows = sqlx::query(
            r#"
            SELECT name, dashboard_addr, dashboard_port, dashboard_user, dashboard_pwd, dashboard_tls
            FROM upstream_servers
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_servers", e))?;

        rows.iter()
            .map(decode_server)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_servers", e))
    }

    #[instrument(skip(self), err)]
    async fn find_server(&self, name: &str) -> StoreResult<Option<UpstreamServer>> {
        let row = sqlx::query(
            r#"
            SELECT name, dashboard_addr, dashboard_port, dashboard_user, dashboard_pwd, dashboard_tls
            FROM upstream_servers
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_server", e))?;

        row.map(|row| decode_server(&row))
            .transpose()
            .map_err(|e| map_sqlx_error("find_server", e))
    }

    #[instrument(skip(self, server), fields(server = %server.name), err)]
    async fn upsert_server(&self, server: &UpstreamServer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upstream_servers (
                name, dashboard_addr, dashboard_port, dashboard_user, dashboard_pwd, dashboard_tls
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name)
            DO UPDATE SET
                dashboard_addr = EXCLUDED.dashboard_addr,
                dashboard_port = EXCLUDED.dashboard_port,
                dashboard_user = EXCLUDED.dashboard_user,
                dashboard_pwd = EXCLUDED.dashboard_pwd,
                dashboard_tls = EXCLUDED.dashboard_tls
            "#,
        )
        .bind(&server.name)
        .bind(&server.dashboard_addr)
        .bind(i32::from(server.dashboard_port))
        .bind(&server.dashboard_user)
        .bind(&server.dashboard_pwd)
        .bind(server.dashboard_tls)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_server", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Unexpected(anyhow!(msg)),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unexpected(anyhow!("connection pool closed in {}", operation))
        }
        other => StoreError::Unexpected(anyhow!("{} failed: {}", operation, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_columns_encode_as_json_text() {
        let mut record = PolicyRecord::new("u", "t");
        record.ports = serde_json::from_str(r#"[22, "8000-9000", ""]"#).unwrap();
        record.domains = vec!["a.example.com".into()];

        let row = RecordRow::encode(&record).unwrap();
        assert_eq!(row.ports, r#"[22,"8000-9000",""]"#);
        assert_eq!(row.domains, r#"["a.example.com"]"#);
        assert_eq!(row.subdomains, "[]");
    }

    #[test]
    fn pool_closed_is_unexpected() {
        let err = map_sqlx_error("find", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Unexpected(_)));
        assert!(err.to_string().contains("find"));
    }
}
