use crate::dsn::Dsn;
use crate::error::ConsoleError;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Row};
use std::collections::HashSet;
use std::time::Duration;

const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

fn connect_options(dsn: &Dsn) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&dsn.host)
        .port(dsn.port)
        .username(&dsn.user)
        .password(&dsn.password)
        .charset("utf8mb4")
}

/// Open a single connection, bounded by `timeout`. Errors never carry the password.
async fn connect(raw: &str, timeout: Duration) -> Result<MySqlConnection, ConsoleError> {
    let dsn = Dsn::parse(raw).map_err(|e| ConsoleError::Connection(e.to_string()))?;
    let opts = connect_options(&dsn);
    let mut conn = tokio::time::timeout(timeout, MySqlConnection::connect_with(&opts))
        .await
        .map_err(|_| {
            ConsoleError::Connection(format!(
                "timed out after {} connecting to {}:{}",
                humantime::format_duration(timeout),
                dsn.host,
                dsn.port
            ))
        })?
        .map_err(|e| ConsoleError::Connection(format!("{}:{}: {e}", dsn.host, dsn.port)))?;
    conn.ping()
        .await
        .map_err(|e| ConsoleError::Connection(format!("ping failed: {e}")))?;
    Ok(conn)
}

pub(super) async fn list_databases(raw: &str, timeout: Duration) -> Result<Vec<String>, ConsoleError> {
    let mut conn = connect(raw, timeout).await?;
    let rows = sqlx::query("SHOW DATABASES")
        .fetch_all(&mut conn)
        .await
        .map_err(|e| ConsoleError::Connection(format!("failed to list databases: {e}")))?;
    let _ = conn.close().await;

    // Rows that fail to decode are skipped rather than failing the probe.
    let databases = rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>(0).ok())
        .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
        .collect();
    Ok(databases)
}

pub(super) async fn list_tables(
    raw: &str,
    schemas: &[String],
    timeout: Duration,
) -> Result<Vec<String>, ConsoleError> {
    if schemas.is_empty() {
        return Ok(Vec::new());
    }
    let mut conn = connect(raw, timeout).await?;

    let placeholders = vec!["?"; schemas.len()].join(",");
    let sql = format!(
        "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA IN ({placeholders}) ORDER BY TABLE_NAME"
    );
    let mut query = sqlx::query(&sql);
    for schema in schemas {
        query = query.bind(schema.as_str());
    }
    let rows = query
        .fetch_all(&mut conn)
        .await
        .map_err(|e| ConsoleError::Connection(format!("failed to list tables: {e}")))?;
    let _ = conn.close().await;

    let mut seen = HashSet::new();
    let tables = rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>(0).ok())
        .filter(|name| seen.insert(name.clone()))
        .collect();
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_descriptor_fails_before_connecting() {
        let err = list_databases("bad-host", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::Connection(_)));
    }

    #[tokio::test]
    async fn no_schemas_means_no_tables() {
        let tables = list_tables("bad-host", &[], Duration::from_millis(50))
            .await
            .unwrap();
        assert!(tables.is_empty());
    }
}
