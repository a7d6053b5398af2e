use crate::{
    error::DbError,
    sql::upsert::UpsertStatement,
    target::{BulkExecutor, ExecOutcome, SessionTimeouts},
};
use async_trait::async_trait;
use mysql_async::{Opts, OptsBuilder, Pool, prelude::*};
use tracing::{debug, warn};

/// Target store handle. Every pooled connection starts with the extended
/// session timeouts applied.
#[derive(Clone)]
pub struct MySqlTarget {
    pool: Pool,
}

impl MySqlTarget {
    pub fn connect(url: &str, timeouts: SessionTimeouts) -> Result<Self, DbError> {
        let opts = Opts::from_url(url)?;
        let opts = OptsBuilder::from_opts(opts).init(vec![timeouts.statement()]);
        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    /// Shared pool, for other tables living in the target store.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn disconnect(self) -> Result<(), DbError> {
        self.pool.disconnect().await.map_err(DbError::from)
    }
}

#[async_trait]
impl BulkExecutor for MySqlTarget {
    async fn prepare_session(&self, timeouts: &SessionTimeouts) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(timeouts.statement()).await?;

        let applied: Option<(u32, u32, u32)> = conn
            .query_first(
                "SELECT @@SESSION.net_read_timeout, @@SESSION.net_write_timeout, @@SESSION.wait_timeout",
            )
            .await?;
        match applied {
            Some((read, write, wait))
                if read >= timeouts.net_read_timeout
                    && write >= timeouts.net_write_timeout
                    && wait >= timeouts.wait_timeout =>
            {
                debug!(read, write, wait, "Session timeouts applied");
            }
            other => warn!(?other, wanted = ?timeouts, "Session timeouts not applied as requested"),
        }
        Ok(())
    }

    async fn execute(&self, statement: &UpsertStatement) -> Result<ExecOutcome, DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(statement.sql()).await?;
        let info = conn.info();
        Ok(ExecOutcome {
            affected_rows: conn.affected_rows(),
            info: (!info.is_empty()).then(|| info.into_owned()),
        })
    }
}
