use crate::{
    credentials::LegacyConnection,
    error::DbError,
    source::{ExtractQuery, Extracted, LegacySource},
    sql::mysql::{params::MySqlParamStore, row::legacy_row},
};
use async_trait::async_trait;
use mysql_async::{Conn, Row, prelude::*};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const QUERY_TABLE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_name = ?";

/// Legacy MySQL reader that opens a fresh connection per extraction.
#[derive(Debug, Clone)]
pub struct MySqlLegacySource {
    connect_timeout: Duration,
}

impl Default for MySqlLegacySource {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl MySqlLegacySource {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect(&self, conn: &LegacyConnection) -> Result<Conn, DbError> {
        debug!(endpoint = %conn.endpoint(), "Connecting to legacy source");
        timeout(self.connect_timeout, Conn::new(conn.opts()))
            .await
            .map_err(|_| DbError::ConnectTimeout(self.connect_timeout))?
            .map_err(DbError::from)
    }

    async fn release(conn: Conn) {
        if let Err(err) = conn.disconnect().await {
            warn!("Failed to close legacy connection cleanly: {}", err);
        }
    }

    async fn read(conn: &mut Conn, query: &ExtractQuery) -> Result<Extracted, DbError> {
        let found: Option<u64> = conn.exec_first(QUERY_TABLE_EXISTS_SQL, (query.table,)).await?;
        if found.unwrap_or(0) == 0 {
            return Ok(Extracted::TableMissing);
        }

        let params = MySqlParamStore::from_values(&query.params).into_params();
        let rows: Vec<Row> = conn.exec(query.sql.as_str(), params).await?;
        Ok(Extracted::Rows(rows.iter().map(legacy_row).collect()))
    }
}

#[async_trait]
impl LegacySource for MySqlLegacySource {
    async fn extract(
        &self,
        conn: &LegacyConnection,
        query: &ExtractQuery,
    ) -> Result<Extracted, DbError> {
        let started = Instant::now();
        let mut handle = self.connect(conn).await?;
        let result = Self::read(&mut handle, query).await;
        Self::release(handle).await;

        if let Ok(Extracted::Rows(rows)) = &result {
            info!(
                table = query.table,
                rows = rows.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Extracted legacy rows"
            );
        }
        result
    }

    async fn ping(&self, conn: &LegacyConnection) -> Result<(), DbError> {
        let mut handle = self.connect(conn).await?;
        let result: Result<Option<u8>, _> = handle.query_first("SELECT 1").await;
        Self::release(handle).await;
        result.map(|_| ()).map_err(DbError::from)
    }
}
